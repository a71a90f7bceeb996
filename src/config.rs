use clap::{Args, Parser, Subcommand};
use keyring::Entry;
use std::{fmt, path::PathBuf, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

use crate::bootstrap::{EnsureOptions, RetryPolicy};
use crate::firebase::{FirebaseAuth, ServiceAccountKey};
use crate::provider::ProviderError;

/// The keyring service name bootstrap passwords are stored under.
pub const KEYRING_SERVICE: &str = "adminctl";

/// Creates Firebase Authentication administrator accounts.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the service account key file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", global = true)]
    pub credentials: Option<PathBuf>,

    /// Firebase project ID. Defaults to the key file's project.
    #[arg(long, env = "ADMINCTL_PROJECT_ID", global = true)]
    pub project_id: Option<String>,

    /// Auth emulator address (`host:port`); no key file is needed when set.
    #[arg(long, env = "FIREBASE_AUTH_EMULATOR_HOST", global = true)]
    pub emulator_host: Option<String>,

    /// Per-request timeout in seconds. Unset means the HTTP client's default.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new user and grant it `isAdmin`. Fails if the email is taken.
    Create(AccountArgs),
    /// Make sure an admin with this email exists, creating or promoting it.
    Ensure {
        #[command(flatten)]
        account: AccountArgs,
        /// Skip reading the user back to confirm the claim.
        #[arg(long)]
        no_verify: bool,
        /// Keep a newly created user even if it could not be made an admin.
        #[arg(long)]
        no_rollback: bool,
        /// Attempts at assigning the claim, including the first.
        #[arg(long, default_value_t = 3)]
        attempts: u32,
        /// Delay before the first retry, doubled after each one.
        #[arg(long, default_value_t = 500)]
        retry_delay_ms: u64,
    },
    /// Print the custom claims currently stored for a user.
    Verify {
        /// The user's uid.
        uid: String,
    },
}

#[derive(Args)]
pub struct AccountArgs {
    /// Email address of the admin account.
    #[arg(long, env = "ADMINCTL_EMAIL")]
    pub email: String,

    /// Password for the account. Read from the OS keyring when unset.
    #[arg(long, env = "ADMINCTL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl fmt::Debug for AccountArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountArgs")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no password given: pass --password (or set ADMINCTL_PASSWORD) or store one in the keyring under service `{KEYRING_SERVICE}`, user `{0}`")]
    MissingPassword(String),
    #[error("keyring: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("no credentials: pass --credentials or set GOOGLE_APPLICATION_CREDENTIALS")]
    MissingCredentials,
    #[error("--project-id is required when using the Auth emulator")]
    MissingProjectId,
    #[error("failed to load credentials from `{}`", path.display())]
    Credentials {
        path: PathBuf,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// The email and password of the account being bootstrapped.
pub struct AccountSecrets {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AccountSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSecrets")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AccountSecrets {
    /// Takes the password given on the command line (or in
    /// `ADMINCTL_PASSWORD`), falling back to the OS keyring.
    pub fn resolve(account: AccountArgs) -> Result<Self, ConfigError> {
        Self::resolve_with(account.email, account.password, |email| {
            keyring_password(Entry::new(KEYRING_SERVICE, email)?.get_password())
        })
    }

    fn resolve_with(
        email: String,
        given: Option<String>,
        keyring: impl FnOnce(&str) -> Result<Option<String>, ConfigError>,
    ) -> Result<Self, ConfigError> {
        let password = match given.filter(|p| !p.is_empty()) {
            Some(password) => password,
            None => keyring(&email)?
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ConfigError::MissingPassword(email.clone()))?,
        };
        Ok(Self { email, password })
    }
}

/// A keyring that is absent or locked is no different from one without
/// an entry: the user needs the password hint, not a platform error.
fn keyring_password(result: keyring::Result<String>) -> Result<Option<String>, ConfigError> {
    match result {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err @ (keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_))) => {
            warn!(error = %err, "keyring unavailable");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

impl Cli {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Builds the provider client from the command line.
    /// No request is made until the first operation.
    pub fn connect(&self) -> Result<FirebaseAuth, ConfigError> {
        let auth = match &self.emulator_host {
            Some(host) => {
                let project_id = self
                    .project_id
                    .clone()
                    .ok_or(ConfigError::MissingProjectId)?;
                info!(%host, %project_id, "using Auth emulator");
                FirebaseAuth::emulator(host, project_id)?
            }
            None => {
                let path = self
                    .credentials
                    .as_ref()
                    .ok_or(ConfigError::MissingCredentials)?;
                let key = ServiceAccountKey::load(path).map_err(|source| {
                    ConfigError::Credentials {
                        path: path.clone(),
                        source,
                    }
                })?;
                FirebaseAuth::new(key, self.project_id.clone())?
            }
        };
        info!(project_id = auth.project_id(), "connected to Firebase Authentication");

        match self.timeout() {
            Some(timeout) => Ok(auth.with_timeout(timeout)?),
            None => Ok(auth),
        }
    }
}

impl Command {
    pub fn ensure_options(
        no_verify: bool,
        no_rollback: bool,
        attempts: u32,
        retry_delay_ms: u64,
    ) -> EnsureOptions {
        EnsureOptions {
            retry: RetryPolicy {
                attempts: attempts.max(1),
                base_delay: Duration::from_millis(retry_delay_ms),
            },
            rollback: !no_rollback,
            verify: !no_verify,
        }
    }
}
