//! Argon2 hashing for the static user list. Hashes are PHC strings, so the
//! parameters travel with each hash and can be raised without invalidating
//! existing users.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::Error;

fn hasher_error(e: argon2::password_hash::Error) -> Error {
    Error::PasswordHasherError(e.to_string())
}

/// Hash a password for storage in the static user list.
pub fn new_hash(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(hasher_error)
}

/// Check `password` against a stored hash. A hash that can't be parsed is a
/// configuration problem rather than a failed login.
pub fn verify_password(password: &str, stored: &str) -> Result<(), Error> {
    let stored = PasswordHash::new(stored).map_err(hasher_error)?;
    match Argon2::default().verify_password(password.as_bytes(), &stored) {
        Ok(()) => Ok(()),
        Err(argon2::password_hash::Error::Password) => Err(Error::InvalidPassword),
        Err(e) => Err(hasher_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn verifies() {
        let hash = new_hash("tr0ub4dor").unwrap();
        assert!(hash.starts_with("$argon2"));
        verify_password("tr0ub4dor", &hash).unwrap();
        assert_matches!(
            verify_password("tr0ub4dor&3", &hash),
            Err(Error::InvalidPassword)
        );
    }

    #[test]
    fn salted() {
        assert_ne!(new_hash("same").unwrap(), new_hash("same").unwrap());
    }

    #[test]
    fn garbage_hash() {
        assert_matches!(
            verify_password("anything", "not a phc string"),
            Err(Error::PasswordHasherError(_))
        );
    }
}
