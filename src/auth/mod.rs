use axum::http::Method;
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or invalid api secret")]
    Unauthorized,
}

/// Shared-secret gate for the mutating and aggregate-read endpoints.
///
/// `POST` requests carry the secret in the JSON body (`api-secret`), `GET`
/// requests in the query string. Every other method is refused.
pub struct ApiSecretGuard {
    secret: String,
}

impl ApiSecretGuard {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn authorize(
        &self,
        method: &Method,
        query_secret: Option<&str>,
        body_secret: Option<&str>,
    ) -> Result<(), AuthError> {
        let provided = match *method {
            Method::POST => body_secret,
            Method::GET => query_secret,
            _ => return Err(AuthError::Unauthorized),
        };

        match provided {
            Some(candidate) if self.matches(candidate) => Ok(()),
            _ => Err(AuthError::Unauthorized),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        // An empty configured secret never authorizes anything
        if self.secret.is_empty() {
            return false;
        }
        self.secret.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_uses_query_secret() {
        let guard = ApiSecretGuard::new("s3cret");
        assert_eq!(guard.authorize(&Method::GET, Some("s3cret"), None), Ok(()));
        assert_eq!(
            guard.authorize(&Method::GET, None, Some("s3cret")),
            Err(AuthError::Unauthorized)
        );
    }

    #[test]
    fn test_post_uses_body_secret() {
        let guard = ApiSecretGuard::new("s3cret");
        assert_eq!(guard.authorize(&Method::POST, None, Some("s3cret")), Ok(()));
        assert_eq!(
            guard.authorize(&Method::POST, Some("s3cret"), None),
            Err(AuthError::Unauthorized)
        );
    }

    #[test]
    fn test_wrong_or_missing_secret() {
        let guard = ApiSecretGuard::new("s3cret");
        assert!(guard.authorize(&Method::GET, Some("nope"), None).is_err());
        assert!(guard.authorize(&Method::GET, Some("s3cret2"), None).is_err());
        assert!(guard.authorize(&Method::GET, Some(""), None).is_err());
        assert!(guard.authorize(&Method::GET, None, None).is_err());
    }

    #[test]
    fn test_other_methods_always_refused() {
        let guard = ApiSecretGuard::new("s3cret");
        for method in [Method::PUT, Method::DELETE, Method::PATCH, Method::HEAD] {
            assert!(guard
                .authorize(&method, Some("s3cret"), Some("s3cret"))
                .is_err());
        }
    }

    #[test]
    fn test_empty_configured_secret_refuses_everything() {
        let guard = ApiSecretGuard::new("");
        assert!(guard.authorize(&Method::GET, Some(""), None).is_err());
        assert!(guard.authorize(&Method::POST, None, Some("")).is_err());
    }
}
