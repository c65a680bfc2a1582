use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::Error;

/// The token from an `Authorization: Bearer <token>` header, if there is one.
pub fn extract_bearer_auth_value(headers: &HeaderMap) -> Result<Option<&str>, Error> {
    match headers.get(AUTHORIZATION) {
        None => Ok(None),
        Some(value) => {
            let (auth_type, token) = value
                .to_str()
                .map_err(|_| Error::MalformedHeader)?
                .split_once(' ')
                .ok_or(Error::MalformedHeader)?;

            if !auth_type.eq_ignore_ascii_case("Bearer") {
                return Err(Error::MalformedHeader);
            }

            let token = token.trim();
            if token.is_empty() {
                return Err(Error::MissingCredentials);
            }

            Ok(Some(token))
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer() {
        let h = headers("Bearer abc.def.ghi");
        assert_eq!(extract_bearer_auth_value(&h).unwrap(), Some("abc.def.ghi"));
    }

    #[test]
    fn no_header() {
        assert_eq!(extract_bearer_auth_value(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn wrong_scheme() {
        assert_matches!(
            extract_bearer_auth_value(&headers("Basic dXNlcjpwdw==")),
            Err(Error::MalformedHeader)
        );
        assert_matches!(
            extract_bearer_auth_value(&headers("Bearer")),
            Err(Error::MalformedHeader)
        );
        assert_matches!(
            extract_bearer_auth_value(&headers("Bearer  ")),
            Err(Error::MissingCredentials)
        );
    }
}
