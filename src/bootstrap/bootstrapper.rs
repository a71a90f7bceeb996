use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::provider::{
    ClaimSnapshot, Claims, IdentityProvider, ProviderError, UserRecord, ADMIN_CLAIM,
};

/// The provider's minimum password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Failures of a bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("user `{uid}` does not carry `isAdmin: true` after assignment")]
    ClaimNotApplied { uid: String },
}

/// How the admin user came to exist, for `ensure_admin_user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The user was created during this run.
    Created,
    /// The user existed and was granted the claim.
    Promoted,
    /// The user existed and already had the claim; nothing was written.
    AlreadyAdmin,
}

/// Retry behaviour for claim assignment in `ensure_admin_user`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubled on each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Options for the hardened bootstrap path.
#[derive(Debug, Clone)]
pub struct EnsureOptions {
    pub retry: RetryPolicy,
    /// Delete a user created in this run if it cannot be made an admin.
    pub rollback: bool,
    /// Read the user back and confirm the claim before returning.
    pub verify: bool,
}

impl Default for EnsureOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            rollback: true,
            verify: true,
        }
    }
}

/// Rejects input the provider would refuse, before contacting it.
///
/// This mirrors the provider's own check (one `@` with something on either
/// side) rather than a full RFC 5322 parser.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), ProviderError> {
    let valid_email = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid_email {
        return Err(ProviderError::InvalidCredential(format!(
            "`{email}` is not a valid email address"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ProviderError::InvalidCredential(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Creates administrator accounts against an identity provider.
pub struct AdminBootstrapper<P> {
    provider: P,
}

impl<P: IdentityProvider> AdminBootstrapper<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Creates a user and marks it as an administrator.
    ///
    /// Exactly one creation and one claim assignment are attempted. If the
    /// assignment fails, the user is left behind without the claim.
    pub async fn create_admin_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, BootstrapError> {
        validate_credentials(email, password)?;

        let mut user = self.provider.create_user(email, password).await?;
        let claims = with_admin_claim(Claims::new());
        self.provider.set_custom_claims(&user.uid, &claims).await?;
        info!(uid = %user.uid, %email, "granted admin claim");

        user.custom_claims = claims;
        Ok(user)
    }

    /// Reads back the claims the provider currently stores for `uid`.
    pub async fn verify_admin_claim(&self, uid: &str) -> Result<ClaimSnapshot, BootstrapError> {
        let user = self.provider.get_user(uid).await?;
        Ok(ClaimSnapshot::from(user.custom_claims))
    }

    /// Makes sure an administrator with this email exists, whatever state
    /// a previous run left behind.
    pub async fn ensure_admin_user(
        &self,
        email: &str,
        password: &str,
        options: &EnsureOptions,
    ) -> Result<(UserRecord, BootstrapOutcome), BootstrapError> {
        validate_credentials(email, password)?;

        let (mut user, created) = match self.provider.create_user(email, password).await {
            Ok(user) => (user, true),
            // A previous run got this far; pick up its user instead.
            Err(ProviderError::DuplicateUser(_)) => {
                info!(%email, "user already exists, reusing it");
                (self.provider.get_user_by_email(email).await?, false)
            }
            Err(err) => return Err(err.into()),
        };

        // Nothing to write, and nothing to verify beyond what lookup returned.
        if !created && user.is_admin() {
            info!(uid = %user.uid, "user is already an admin");
            return Ok((user, BootstrapOutcome::AlreadyAdmin));
        }

        // Assignment replaces every claim, so carry over what is there.
        let claims = with_admin_claim(user.custom_claims.clone());
        if let Err(err) = self.assign_with_retry(&user.uid, &claims, &options.retry).await {
            // Only undo our own creation. A failed delete is logged, and
            // the claim failure is what the caller sees.
            if created && options.rollback {
                warn!(uid = %user.uid, error = %err, "claim assignment failed, deleting user");
                if let Err(cleanup) = self.provider.delete_user(&user.uid).await {
                    warn!(uid = %user.uid, error = %cleanup, "unable to delete user");
                }
            }
            return Err(err.into());
        }
        user.custom_claims = claims;

        // Read back rather than trust the write.
        if options.verify {
            let snapshot = self.verify_admin_claim(&user.uid).await?;
            if snapshot.is_admin() != Some(true) {
                return Err(BootstrapError::ClaimNotApplied { uid: user.uid });
            }
            user.custom_claims = snapshot.into_claims();
        }

        let outcome = if created {
            BootstrapOutcome::Created
        } else {
            BootstrapOutcome::Promoted
        };
        info!(uid = %user.uid, ?outcome, "admin user ready");
        Ok((user, outcome))
    }

    async fn assign_with_retry(
        &self,
        uid: &str,
        claims: &Claims,
        retry: &RetryPolicy,
    ) -> Result<(), ProviderError> {
        let mut delay = retry.base_delay;
        let mut attempt = 1;
        loop {
            match self.provider.set_custom_claims(uid, claims).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < retry.attempts => {
                    warn!(%uid, attempt, error = %err, "claim assignment failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn with_admin_claim(mut claims: Claims) -> Claims {
    claims.insert(ADMIN_CLAIM.to_string(), Value::Bool(true));
    claims
}
