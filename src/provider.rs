use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{io, path::PathBuf, time::SystemTimeError};
use thiserror::Error;

/// The claim name marking a user as an administrator.
pub const ADMIN_CLAIM: &str = "isAdmin";

/// Custom claims as stored by the identity provider.
pub type Claims = Map<String, Value>;

/// A user account as the identity provider reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    /// Provider-assigned unique identifier.
    pub uid: String,
    pub email: Option<String>,
    pub custom_claims: Claims,
}

impl UserRecord {
    pub fn is_admin(&self) -> bool {
        self.custom_claims.get(ADMIN_CLAIM).and_then(Value::as_bool) == Some(true)
    }
}

/// The claims currently stored for a user, as read back from the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimSnapshot(Claims);

impl ClaimSnapshot {
    /// The `isAdmin` value, if present and boolean.
    pub fn is_admin(&self) -> Option<bool> {
        self.0.get(ADMIN_CLAIM).and_then(Value::as_bool)
    }

    pub fn claims(&self) -> &Claims {
        &self.0
    }

    pub fn into_claims(self) -> Claims {
        self.0
    }
}

impl From<Claims> for ClaimSnapshot {
    fn from(claims: Claims) -> Self {
        Self(claims)
    }
}

/// Failures reported by, or while talking to, the identity provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("a user with email `{0}` already exists")]
    DuplicateUser(String),
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    /// The provider answered, but with an outage or an unrecognised failure.
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The provider could not be reached at all (connect, timeout, TLS).
    #[error("identity provider unavailable: {context}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("no user matching `{0}`")]
    UserNotFound(String),
    #[error("invalid custom claims: {0}")]
    InvalidClaims(String),
    #[error("malformed provider response: {context}")]
    MalformedResponse {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("bad endpoint `{url}`")]
    Endpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("service account credential: {0}")]
    Credential(String),
    #[error("unable to read service account key `{}`", path.display())]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed service account key")]
    CredentialFormat(#[source] serde_json::Error),
    #[error("unable to sign with the service account key")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("system clock is set before the Unix epoch")]
    Clock(#[from] SystemTimeError),
}

impl ProviderError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::ProviderUnavailable(_) | ProviderError::Transport { .. }
        )
    }
}

/// The operations the bootstrapper needs from an identity provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_user(&self, email: &str, password: &str) -> Result<UserRecord, ProviderError>;

    /// Replaces the user's custom claims with `claims`.
    async fn set_custom_claims(&self, uid: &str, claims: &Claims) -> Result<(), ProviderError>;

    async fn get_user(&self, uid: &str) -> Result<UserRecord, ProviderError>;

    async fn get_user_by_email(&self, email: &str) -> Result<UserRecord, ProviderError>;

    async fn delete_user(&self, uid: &str) -> Result<(), ProviderError>;
}
