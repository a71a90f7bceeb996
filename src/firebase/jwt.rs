use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use super::service_account::ServiceAccountKey;
use crate::provider::ProviderError;

/// Scopes the Admin SDKs request for user management.
const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/firebase",
    "https://www.googleapis.com/auth/identitytoolkit",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// Assertions are valid for an hour, the maximum Google accepts.
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// The payload of the self-signed assertion exchanged for an access token.
#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Signs an RS256 assertion for the given service account.
///
/// Google verifies the signature against the public half of
/// `private_key_id`, so it travels in the header as `kid`.
pub fn sign_assertion(key: &ServiceAccountKey) -> Result<String, ProviderError> {
    let issued_at = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SCOPES.join(" "),
        aud: &key.token_uri,
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };

    let header = Header {
        kid: Some(key.private_key_id.clone()),
        ..Header::new(Algorithm::RS256)
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(ProviderError::Signing)?;

    encode(&header, &claims, &encoding_key).map_err(ProviderError::Signing)
}
