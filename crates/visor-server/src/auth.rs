//! Caller authentication.
//!
//! An [`Authenticator`] turns request headers into a [`Principal`]. It never
//! rejects a request itself: a request without a principal reaches the
//! handlers, which decide whether identity is required.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderName, AUTHORIZATION};
use http::HeaderMap;
use tracing::debug;

use crate::config::AuthSettings;

/// Subject type assumed when an identity header carries a bare id.
pub const DEFAULT_SUBJECT_TYPE: &str = "user";

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    /// Subject in permission-store form, e.g. `user:alice`.
    pub subject: String,
}

impl Principal {
    /// Builds a principal, prefixing bare ids with `user:`.
    pub fn new(subject: impl Into<String>) -> Self {
        let subject = subject.into();
        if subject.contains(':') {
            Self { subject }
        } else {
            Self {
                subject: format!("{DEFAULT_SUBJECT_TYPE}:{subject}"),
            }
        }
    }
}

/// Errors building an authenticator from configuration.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid auth configuration: {message}")]
    InvalidConfig { message: String },
}

/// Resolves the caller identity of a request.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// `None` when the request carries no usable credentials.
    async fn authenticate(&self, headers: &HeaderMap) -> Option<Principal>;
}

/// Trusts an identity header set by a fronting proxy.
#[derive(Debug, Clone)]
pub struct HeaderAuthenticator {
    header: HeaderName,
}

impl HeaderAuthenticator {
    pub fn new(header: &str) -> Result<Self, AuthError> {
        let header =
            HeaderName::from_bytes(header.as_bytes()).map_err(|e| AuthError::InvalidConfig {
                message: format!("invalid header name '{header}': {e}"),
            })?;
        Ok(Self { header })
    }
}

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<Principal> {
        let value = headers.get(&self.header)?.to_str().ok()?.trim();
        if value.is_empty() {
            return None;
        }
        Some(Principal::new(value))
    }
}

/// Maps static bearer tokens to subjects.
#[derive(Clone)]
pub struct BearerTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl std::fmt::Debug for BearerTokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuthenticator")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl BearerTokenAuthenticator {
    pub fn new<I, K, V>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(token, subject)| (token.into(), Principal::new(subject)))
                .collect(),
        }
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<Principal> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))?
            .trim();
        let principal = self.tokens.get(token).cloned();
        if principal.is_none() {
            debug!("Unknown bearer token");
        }
        principal
    }
}

/// Builds the authenticator selected by `settings.mode`.
pub fn from_settings(settings: &AuthSettings) -> Result<Arc<dyn Authenticator>, AuthError> {
    match settings.mode.as_str() {
        "header" => Ok(Arc::new(HeaderAuthenticator::new(&settings.header)?)),
        "bearer" => Ok(Arc::new(BearerTokenAuthenticator::new(
            settings
                .tokens
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        ))),
        other => Err(AuthError::InvalidConfig {
            message: format!("unknown auth mode '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_principal_prefixes_bare_ids() {
        assert_eq!(Principal::new("alice").subject, "user:alice");
        assert_eq!(Principal::new("service:ci").subject, "service:ci");
    }

    #[tokio::test]
    async fn test_header_authenticator() {
        let auth = HeaderAuthenticator::new("x-user-id").unwrap();

        let principal = auth
            .authenticate(&headers(&[("x-user-id", "alice")]))
            .await
            .unwrap();
        assert_eq!(principal.subject, "user:alice");

        assert!(auth.authenticate(&HeaderMap::new()).await.is_none());
        assert!(auth
            .authenticate(&headers(&[("x-user-id", "   ")]))
            .await
            .is_none());
    }

    #[test]
    fn test_header_authenticator_rejects_bad_header_name() {
        assert!(HeaderAuthenticator::new("not a header").is_err());
    }

    #[tokio::test]
    async fn test_bearer_authenticator() {
        let auth = BearerTokenAuthenticator::new([("s3cret", "user:alice")]);

        let principal = auth
            .authenticate(&headers(&[("authorization", "Bearer s3cret")]))
            .await
            .unwrap();
        assert_eq!(principal.subject, "user:alice");

        assert!(auth
            .authenticate(&headers(&[("authorization", "Bearer wrong")]))
            .await
            .is_none());
        assert!(auth
            .authenticate(&headers(&[("authorization", "Basic czNjcmV0")]))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_from_settings_selects_mode() {
        let mut settings = AuthSettings::default();
        let auth = from_settings(&settings).unwrap();
        assert!(auth
            .authenticate(&headers(&[("x-user-id", "bob")]))
            .await
            .is_some());

        settings.mode = "bearer".to_string();
        settings
            .tokens
            .insert("t0k".to_string(), "user:carol".to_string());
        let auth = from_settings(&settings).unwrap();
        assert_eq!(
            auth.authenticate(&headers(&[("authorization", "Bearer t0k")]))
                .await
                .unwrap()
                .subject,
            "user:carol"
        );

        settings.mode = "kerberos".to_string();
        assert!(from_settings(&settings).is_err());
    }
}
