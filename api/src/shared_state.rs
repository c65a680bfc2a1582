use std::sync::Arc;

use visuasort_auth::Authenticator;
use visuasort_convert::PipelineConfig;
use visuasort_db::ImageRepository;
use visuasort_storage::AssetStore;

use crate::{tagging::TaggingService, worker_pool::WorkerPool};

#[derive(Debug)]
pub struct InnerState {
    pub production: bool,
    pub repository: ImageRepository,
    pub assets: Arc<dyn AssetStore>,
    pub authenticator: Arc<Authenticator>,
    pub workers: WorkerPool,
    pub tagger: Arc<TaggingService>,
    pub pipeline: PipelineConfig,
    /// Reject unknown filter names instead of falling back to no filter.
    pub strict_filters: bool,
    pub max_upload_bytes: usize,
}

pub type AppState = Arc<InnerState>;
