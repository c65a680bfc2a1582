use std::{sync::Arc, time::Duration};

use tokio::sync::Semaphore;
use tracing::{event, Level};

use crate::{Error, Result};

/// Gates CPU-bound image work. At most `size` jobs run at once, each on the
/// blocking thread pool; the rest wait for a permit.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    timeout: Option<Duration>,
}

impl WorkerPool {
    pub fn new(size: usize, timeout: Option<Duration>) -> Self {
        let size = size.max(1);
        WorkerPool {
            permits: Arc::new(Semaphore::new(size)),
            size,
            timeout,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently running.
    pub fn busy(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Run `job` once a worker is free. With a timeout configured, the caller
    /// gets [Error::Timeout] when it expires, but the job itself keeps its
    /// worker until it finishes; there is no way to stop it part way.
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ShuttingDown)?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined?,
                Err(_) => {
                    event!(Level::WARN, timeout_secs = limit.as_secs(), "image job timed out");
                    Err(Error::Timeout(limit.as_secs()))
                }
            },
            None => handle.await?,
        }
    }
}
