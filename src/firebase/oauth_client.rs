use serde::Deserialize;
use tracing::debug;

use super::{jwt, service_account::ServiceAccountKey};
use crate::provider::ProviderError;

/// The grant type for exchanging a signed assertion (RFC 7523).
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// The emulator accepts this fixed token in place of a real one.
pub const EMULATOR_TOKEN: &str = "owner";

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Where access tokens for Identity Toolkit requests come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Exchange a signed assertion for a short-lived token.
    ServiceAccount(ServiceAccountKey),
    /// The Auth emulator, which trusts a fixed token.
    Emulator,
}

impl TokenSource {
    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String, ProviderError> {
        match self {
            TokenSource::ServiceAccount(key) => obtain_access_token(client, key).await,
            TokenSource::Emulator => Ok(EMULATOR_TOKEN.to_string()),
        }
    }
}

/// Attempt to obtain an access token via OAuth2.
/// We authenticate with an assertion signed by the service account's key.
pub async fn obtain_access_token(
    client: &reqwest::Client,
    key: &ServiceAccountKey,
) -> Result<String, ProviderError> {
    let assertion = jwt::sign_assertion(key)?;

    let result = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
        .send()
        .await
        .map_err(|source| ProviderError::Transport {
            context: "token request failed",
            source,
        })?;

    // A rejected key (revoked, wrong account) surfaces here as 400/401.
    let status = result.status();
    if !status.is_success() {
        let body = result.text().await.unwrap_or_default();
        return Err(ProviderError::ProviderUnavailable(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let response: AccessTokenResponse =
        result.json().await.map_err(|source| ProviderError::Transport {
            context: "malformed token response",
            source,
        })?;
    debug!(
        client_email = %key.client_email,
        expires_in = ?response.expires_in,
        "obtained access token"
    );

    Ok(response.access_token)
}
