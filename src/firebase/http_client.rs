use reqwest::header;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::provider::ProviderError;

/// The error envelope Identity Toolkit wraps failures in.
#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    code: u16,
    message: String,
}

/// Identity Toolkit reports what went wrong as an upper-case code,
/// sometimes followed by ` : ` and a human-readable detail, e.g.
/// `WEAK_PASSWORD : Password should be at least 6 characters`.
pub fn classify_error(message: &str, subject: &str) -> ProviderError {
    let (code, detail) = match message.split_once(':') {
        Some((code, detail)) => (code.trim(), detail.trim()),
        None => (message.trim(), ""),
    };
    let described = if detail.is_empty() {
        code.to_string()
    } else {
        format!("{code}: {detail}")
    };

    match code {
        "EMAIL_EXISTS" | "DUPLICATE_EMAIL" => ProviderError::DuplicateUser(subject.to_string()),
        "INVALID_EMAIL" | "MISSING_EMAIL" | "WEAK_PASSWORD" | "INVALID_PASSWORD"
        | "MISSING_PASSWORD" => ProviderError::InvalidCredential(described),
        "USER_NOT_FOUND" => ProviderError::UserNotFound(subject.to_string()),
        "INVALID_CLAIMS" | "CLAIMS_TOO_LARGE" | "FORBIDDEN_CLAIM" => {
            ProviderError::InvalidClaims(described)
        }
        _ => ProviderError::ProviderUnavailable(described),
    }
}

/// Creates and executes an authenticated JSON request against Identity Toolkit.
///
/// `subject` is the email or uid the request concerns, used to fill in
/// errors that refer to it.
pub async fn post_json<T: Serialize, R: DeserializeOwned>(
    client: &reqwest::Client,
    endpoint: Url,
    access_token: &str,
    body: &T,
    subject: &str,
) -> Result<R, ProviderError> {
    debug!(%endpoint, "posting Identity Toolkit request");

    let result = client
        .post(endpoint.clone())
        .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
        .json(body)
        .send()
        .await
        .map_err(|source| ProviderError::Transport {
            context: "request failed",
            source,
        })?;

    let status = result.status();
    if !status.is_success() {
        // An unreadable body still leaves the status worth reporting.
        let text = result.text().await.unwrap_or_default();
        return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => {
                warn!(
                    %endpoint,
                    code = envelope.error.code,
                    message = %envelope.error.message,
                    "Identity Toolkit rejected request"
                );
                classify_error(&envelope.error.message, subject)
            }
            // Gateways and outages don't always answer in the API's format.
            Err(_) => ProviderError::ProviderUnavailable(format!("{status}: {text}")),
        });
    }

    // A 2xx we cannot decode usually means a proxy answered, not the API.
    result.json().await.map_err(|source| ProviderError::Transport {
        context: "malformed response",
        source,
    })
}
