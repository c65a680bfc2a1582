use jsonwebtoken::decode_header;

use crate::{
    identity::Identity,
    managed_identity::ManagedIdentity,
    static_credential::{IssuedToken, StaticCredentials},
    Error,
};

/// Turns a bearer token into an [Identity]. The rest of the service only
/// sees the identity, never which scheme produced it.
#[derive(Debug)]
pub enum Authenticator {
    /// Users from configuration, with tokens issued by this service.
    StaticCredential(StaticCredentials),
    /// Tokens issued by an external identity provider.
    ManagedIdentity(ManagedIdentity),
    /// Both at once. Tokens carrying a `kid` header go to the identity
    /// provider; all others are treated as locally issued.
    Hybrid {
        static_credential: StaticCredentials,
        managed_identity: ManagedIdentity,
    },
}

fn has_key_id(token: &str) -> bool {
    decode_header(token)
        .map(|header| header.kid.is_some())
        .unwrap_or(false)
}

impl Authenticator {
    pub fn mode(&self) -> &'static str {
        match self {
            Authenticator::StaticCredential(_) => "static_credential",
            Authenticator::ManagedIdentity(_) => "managed_identity",
            Authenticator::Hybrid { .. } => "hybrid",
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, Error> {
        match self {
            Authenticator::StaticCredential(creds) => creds.verify(token),
            Authenticator::ManagedIdentity(provider) => provider.verify(token),
            Authenticator::Hybrid {
                static_credential,
                managed_identity,
            } => {
                if has_key_id(token) {
                    managed_identity.verify(token)
                } else {
                    static_credential.verify(token)
                }
            }
        }
    }

    /// Password login. Only available when static credentials are configured;
    /// managed identities log in with their provider.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken, Error> {
        match self {
            Authenticator::StaticCredential(creds)
            | Authenticator::Hybrid {
                static_credential: creds,
                ..
            } => creds.login(username, password),
            Authenticator::ManagedIdentity(_) => Err(Error::NotConfigured("Password")),
        }
    }

    pub fn static_credentials(&self) -> Option<&StaticCredentials> {
        match self {
            Authenticator::StaticCredential(creds)
            | Authenticator::Hybrid {
                static_credential: creds,
                ..
            } => Some(creds),
            Authenticator::ManagedIdentity(_) => None,
        }
    }
}
