use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use crate::{
    identity::{Identity, Role},
    password::verify_password,
    Error,
};

/// How long a token issued at login stays valid.
pub fn default_token_lifetime() -> Duration {
    Duration::hours(24)
}

/// A user configured at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StaticUser {
    pub username: String,
    /// argon2 PHC string
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    iat: i64,
    exp: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

/// Users from configuration, authenticated by password and then by HS256
/// tokens signed with a shared secret.
pub struct StaticCredentials {
    users: Vec<StaticUser>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("users", &self.users.len())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl StaticCredentials {
    pub fn new(secret: &[u8], users: Vec<StaticUser>) -> Result<Self, Error> {
        if secret.is_empty() {
            return Err(Error::Config("JWT secret must not be empty".to_string()));
        }

        Ok(StaticCredentials {
            users,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime: default_token_lifetime(),
        })
    }

    /// Parse the user list from its JSON configuration form.
    pub fn users_from_json(json: &str) -> Result<Vec<StaticUser>, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("static users: {e}")))
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken, Error> {
        let user = self
            .users
            .iter()
            .find(|u| u.username == username)
            .ok_or(Error::InvalidPassword)?;

        verify_password(password, &user.password_hash)?;
        event!(Level::INFO, %username, "user logged in");
        self.issue(&Identity::new(&user.username, user.role))
    }

    pub fn issue(&self, identity: &Identity) -> Result<IssuedToken, Error> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let claims = Claims {
            sub: identity.subject.clone(),
            role: identity.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(IssuedToken {
            token,
            expires_at,
            user: identity.clone(),
        })
    }

    pub fn verify(&self, token: &str) -> Result<Identity, Error> {
        let data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )?;

        Ok(Identity::new(data.claims.sub, data.claims.role))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn credentials() -> StaticCredentials {
        StaticCredentials::new(b"test secret", vec![]).unwrap()
    }

    #[test]
    fn issue_and_verify() {
        let creds = credentials();
        let identity = Identity::new("alice", Role::Admin);
        let issued = creds.issue(&identity).unwrap();
        assert_eq!(creds.verify(&issued.token).unwrap(), identity);
        assert!(issued.expires_at > Utc::now() + Duration::hours(23));
    }

    #[test]
    fn wrong_secret() {
        let issued = credentials()
            .issue(&Identity::new("alice", Role::User))
            .unwrap();
        let other = StaticCredentials::new(b"another secret", vec![]).unwrap();
        assert_matches!(other.verify(&issued.token), Err(Error::InvalidToken(_)));
    }

    #[test]
    fn expired_token() {
        let creds = credentials().with_lifetime(Duration::hours(-2));
        let issued = creds.issue(&Identity::new("alice", Role::User)).unwrap();
        assert_matches!(creds.verify(&issued.token), Err(Error::InvalidToken(_)));
    }

    #[test]
    fn garbage_token() {
        assert_matches!(credentials().verify("not.a.token"), Err(Error::InvalidToken(_)));
    }

    #[test]
    fn unknown_user() {
        assert_matches!(credentials().login("nobody", "pw"), Err(Error::InvalidPassword));
    }

    #[test]
    fn parse_users() {
        let users = StaticCredentials::users_from_json(
            r#"[{"username": "admin", "password_hash": "$argon2id$x", "role": "admin"},
                {"username": "user", "password_hash": "$argon2id$y"}]"#,
        )
        .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].role, Role::Admin);
        assert_eq!(users[1].role, Role::User);

        assert_matches!(
            StaticCredentials::users_from_json("{}"),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn empty_secret() {
        assert_matches!(StaticCredentials::new(b"", vec![]), Err(Error::Config(_)));
    }

    #[cfg(any(feature = "test-slow", feature = "test-password"))]
    #[test]
    fn login_with_password() {
        let hash = crate::password::new_hash("hunter2").unwrap();
        let creds = StaticCredentials::new(
            b"test secret",
            vec![StaticUser {
                username: "alice".to_string(),
                password_hash: hash,
                role: Role::User,
            }],
        )
        .unwrap();

        let issued = creds.login("alice", "hunter2").unwrap();
        assert_eq!(issued.user.subject, "alice");
        assert_matches!(creds.login("alice", "wrong"), Err(Error::InvalidPassword));
    }
}
