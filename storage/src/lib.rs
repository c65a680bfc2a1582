mod asset_store;
mod error;
mod key;
mod operator;
mod presigned_url;
mod provider;
mod s3;

pub use asset_store::*;
pub use error::*;
pub use key::*;
pub use operator::*;
pub use presigned_url::*;
pub use provider::*;
pub use s3::S3ProviderConfig;
