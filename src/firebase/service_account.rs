use serde::Deserialize;
use std::{fmt, fs, path::Path};

use crate::provider::ProviderError;

/// The token endpoint used when a key file does not name one.
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields we need from a Google service account key file.
///
/// The file carries more (client ID, certificate URLs), none of which
/// matter for minting an access token.
#[derive(Deserialize, Clone)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(contents: &str) -> Result<Self, ProviderError> {
        let key: ServiceAccountKey =
            serde_json::from_str(contents).map_err(ProviderError::CredentialFormat)?;

        if key.key_type != "service_account" {
            return Err(ProviderError::Credential(format!(
                "expected a `service_account` key, found `{}`",
                key.key_type
            )));
        }
        if key.client_email.is_empty() || key.private_key.is_empty() {
            return Err(ProviderError::Credential(
                "key file is missing `client_email` or `private_key`".to_string(),
            ));
        }
        Ok(key)
    }

    /// Reads and parses the key file at `path`.
    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ProviderError::CredentialFile {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&contents)
    }
}

// Keep the private key out of logs.
impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}
