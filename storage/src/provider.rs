use std::{path::PathBuf, str::FromStr, sync::Arc};

use object_store::{local::LocalFileSystem, memory::InMemory};
use tracing::{event, Level};

use crate::{
    error::{Error, Result},
    operator::Operator,
    s3::{create_store, S3ProviderConfig},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Memory,
    Local,
    S3,
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(ProviderKind::Memory),
            "local" => Ok(ProviderKind::Local),
            "s3" => Ok(ProviderKind::S3),
            _ => Err(Error::UnknownProvider(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    /// Process-local storage, lost on restart.
    Memory,
    /// A directory on the local filesystem.
    Local { base: PathBuf },
    /// An S3-compatible bucket. `base_location` is `bucket[/prefix]`.
    S3 {
        config: S3ProviderConfig,
        base_location: String,
    },
}

impl ProviderConfig {
    pub async fn create_operator(&self) -> Result<Operator> {
        let operator = match self {
            ProviderConfig::Memory => Operator::new(Arc::new(InMemory::new())),
            ProviderConfig::Local { base } => {
                tokio::fs::create_dir_all(base).await?;
                let store = LocalFileSystem::new_with_prefix(base)?;
                Operator::new(Arc::new(store))
            }
            ProviderConfig::S3 {
                config,
                base_location,
            } => {
                let (store, prefix) = create_store(config, base_location).map_err(Error::Config)?;
                let store = Arc::new(store);
                Operator {
                    store: store.clone(),
                    signer: Some(store),
                    path_prefix: prefix,
                }
            }
        };

        event!(Level::INFO, ?operator, "asset store ready");
        Ok(operator)
    }
}
