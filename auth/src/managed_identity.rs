use std::path::Path;

use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::{
    identity::{Identity, Role},
    Error,
};

/// Members of this group are administrators.
pub const ADMIN_GROUP: &str = "Administrators";

#[derive(Debug, Deserialize)]
struct ManagedClaims {
    sub: String,
    #[serde(rename = "cognito:username")]
    username: Option<String>,
    #[serde(rename = "cognito:groups", default)]
    groups: Vec<String>,
}

/// Verifies RS256 tokens issued by an external identity provider against the
/// provider's published key set. Tokens are matched to keys by `kid`.
#[derive(Clone, Debug)]
pub struct ManagedIdentity {
    keys: JwkSet,
    issuer: Option<String>,
    audience: Option<String>,
}

impl ManagedIdentity {
    pub fn new(keys: JwkSet, issuer: Option<String>, audience: Option<String>) -> Self {
        ManagedIdentity {
            keys,
            issuer,
            audience,
        }
    }

    pub fn from_jwks_json(
        json: &str,
        issuer: Option<String>,
        audience: Option<String>,
    ) -> Result<Self, Error> {
        let keys: JwkSet =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("JWKS: {e}")))?;
        Ok(Self::new(keys, issuer, audience))
    }

    pub fn from_jwks_file(
        path: &Path,
        issuer: Option<String>,
        audience: Option<String>,
    ) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_jwks_json(&json, issuer, audience)
    }

    pub fn verify(&self, token: &str) -> Result<Identity, Error> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| Error::UnknownKey("(none)".to_string()))?;
        let jwk = self
            .keys
            .find(&kid)
            .ok_or_else(|| Error::UnknownKey(kid.clone()))?;
        let key = DecodingKey::from_jwk(jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let claims = decode::<ManagedClaims>(token, &key, &validation)?.claims;
        let role = if claims.groups.iter().any(|g| g == ADMIN_GROUP) {
            Role::Admin
        } else {
            Role::User
        };

        Ok(Identity::new(claims.username.unwrap_or(claims.sub), role))
    }
}
