use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use super::{http_client, oauth_client::TokenSource, service_account::ServiceAccountKey};
use crate::provider::{Claims, IdentityProvider, ProviderError, UserRecord};

/// The production Identity Toolkit host.
pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/";

/// The serialized claims may not exceed this many bytes.
const MAX_CLAIMS_PAYLOAD: usize = 1000;

/// Claim names the ID token already uses.
const RESERVED_CLAIMS: &[&str] = &[
    "acr", "amr", "at_hash", "aud", "auth_time", "azp", "cnf", "c_hash", "exp", "firebase", "iat",
    "iss", "jti", "nbf", "nonce", "sub",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetClaimsRequest<'a> {
    local_id: &'a str,
    /// Identity Toolkit takes the claims as a JSON-encoded string.
    custom_attributes: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    local_id: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    email: Vec<&'a str>,
}

#[derive(Deserialize)]
struct LookupResponse {
    /// Absent entirely when nothing matched.
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    custom_attributes: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteUserRequest<'a> {
    local_id: &'a str,
}

impl LookupUser {
    fn into_record(self) -> Result<UserRecord, ProviderError> {
        let custom_claims = match self.custom_attributes.as_deref() {
            None | Some("") => Claims::new(),
            Some(raw) => {
                serde_json::from_str(raw).map_err(|source| ProviderError::MalformedResponse {
                    context: format!("custom attributes of user `{}`", self.local_id),
                    source,
                })?
            }
        };
        Ok(UserRecord {
            uid: self.local_id,
            email: self.email,
            custom_claims,
        })
    }
}

/// Checks claims against the limits Identity Toolkit enforces,
/// so a bad payload fails before any request is made.
pub fn validate_claims(claims: &Claims) -> Result<String, ProviderError> {
    if let Some(reserved) = claims.keys().find(|k| RESERVED_CLAIMS.contains(&k.as_str())) {
        return Err(ProviderError::InvalidClaims(format!(
            "`{reserved}` is a reserved claim name"
        )));
    }
    let payload = Value::Object(claims.clone()).to_string();
    if payload.len() > MAX_CLAIMS_PAYLOAD {
        return Err(ProviderError::InvalidClaims(format!(
            "claims payload is {} bytes, limit is {MAX_CLAIMS_PAYLOAD}",
            payload.len()
        )));
    }
    Ok(payload)
}

/// A Firebase Authentication project, reached through Identity Toolkit.
pub struct FirebaseAuth {
    client: reqwest::Client,
    base_url: Url,
    project_id: String,
    tokens: TokenSource,
    access_token: OnceCell<String>,
}

impl FirebaseAuth {
    /// Connects to the production service with a service account key.
    pub fn new(key: ServiceAccountKey, project_id: Option<String>) -> Result<Self, ProviderError> {
        let project_id = project_id.unwrap_or_else(|| key.project_id.clone());
        let base_url =
            Url::parse(IDENTITY_TOOLKIT_URL).map_err(|source| ProviderError::Endpoint {
                url: IDENTITY_TOOLKIT_URL.to_string(),
                source,
            })?;
        Ok(Self::with_endpoint(
            reqwest::Client::new(),
            base_url,
            project_id,
            TokenSource::ServiceAccount(key),
        ))
    }

    /// Connects to a local Auth emulator at `host` (`host:port`).
    pub fn emulator(host: &str, project_id: String) -> Result<Self, ProviderError> {
        let url = format!("http://{host}/identitytoolkit.googleapis.com/");
        let base_url =
            Url::parse(&url).map_err(|source| ProviderError::Endpoint { url, source })?;
        Ok(Self::with_endpoint(
            reqwest::Client::new(),
            base_url,
            project_id,
            TokenSource::Emulator,
        ))
    }

    /// `base_url` must end in `/` so endpoint paths resolve beneath it.
    pub fn with_endpoint(
        client: reqwest::Client,
        base_url: Url,
        project_id: String,
        tokens: TokenSource,
    ) -> Self {
        Self {
            client,
            base_url,
            project_id,
            tokens,
            access_token: OnceCell::new(),
        }
    }

    /// Rebuilds the HTTP client with an overall per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ProviderError> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ProviderError::Transport {
                context: "unable to build http client",
                source,
            })?;
        Ok(self)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// `action` is appended to the accounts collection, e.g. `:lookup`.
    pub(super) fn accounts_endpoint(&self, action: &str) -> Result<Url, ProviderError> {
        let path = format!("v1/projects/{}/accounts{action}", self.project_id);
        self.base_url
            .join(&path)
            .map_err(|source| ProviderError::Endpoint { url: path, source })
    }

    /// Tokens are fetched once and reused; a bootstrap run is far
    /// shorter than their hour-long lifetime.
    async fn token(&self) -> Result<&str, ProviderError> {
        self.access_token
            .get_or_try_init(|| self.tokens.access_token(&self.client))
            .await
            .map(String::as_str)
    }

    async fn lookup(
        &self,
        request: LookupRequest<'_>,
        subject: &str,
    ) -> Result<UserRecord, ProviderError> {
        let endpoint = self.accounts_endpoint(":lookup")?;
        let token = self.token().await?;
        let response: LookupResponse =
            http_client::post_json(&self.client, endpoint, token, &request, subject).await?;

        match response.users.into_iter().next() {
            Some(user) => user.into_record(),
            None => Err(ProviderError::UserNotFound(subject.to_string())),
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn create_user(&self, email: &str, password: &str) -> Result<UserRecord, ProviderError> {
        let endpoint = self.accounts_endpoint("")?;
        let token = self.token().await?;
        let request = CreateUserRequest { email, password };

        let response: CreateUserResponse =
            http_client::post_json(&self.client, endpoint, token, &request, email).await?;
        info!(uid = %response.local_id, %email, "created user");

        Ok(UserRecord {
            uid: response.local_id,
            email: response.email.or_else(|| Some(email.to_string())),
            custom_claims: Claims::new(),
        })
    }

    async fn set_custom_claims(&self, uid: &str, claims: &Claims) -> Result<(), ProviderError> {
        let custom_attributes = validate_claims(claims)?;
        let endpoint = self.accounts_endpoint(":update")?;
        let token = self.token().await?;
        let request = SetClaimsRequest {
            local_id: uid,
            custom_attributes,
        };

        let _: Value = http_client::post_json(&self.client, endpoint, token, &request, uid).await?;
        debug!(%uid, claims = claims.len(), "set custom claims");
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> Result<UserRecord, ProviderError> {
        let request = LookupRequest {
            local_id: vec![uid],
            ..Default::default()
        };
        self.lookup(request, uid).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<UserRecord, ProviderError> {
        let request = LookupRequest {
            email: vec![email],
            ..Default::default()
        };
        self.lookup(request, email).await
    }

    async fn delete_user(&self, uid: &str) -> Result<(), ProviderError> {
        let endpoint = self.accounts_endpoint(":delete")?;
        let token = self.token().await?;
        let request = DeleteUserRequest { local_id: uid };

        let _: Value = http_client::post_json(&self.client, endpoint, token, &request, uid).await?;
        info!(%uid, "deleted user");
        Ok(())
    }
}
