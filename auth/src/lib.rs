mod authenticator;
mod error;
mod extract_token;
mod identity;
pub mod managed_identity;
pub mod password;
mod request;
pub mod static_credential;

pub use authenticator::*;
pub use error::*;
pub use extract_token::extract_bearer_auth_value;
pub use identity::*;
pub use managed_identity::ManagedIdentity;
pub use request::*;
pub use static_credential::{IssuedToken, StaticCredentials, StaticUser};
