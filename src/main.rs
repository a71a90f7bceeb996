mod bootstrap;
mod config;
mod firebase;
mod provider;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{AdminBootstrapper, BootstrapOutcome};
use crate::config::{AccountSecrets, Cli, Command};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let bootstrapper = AdminBootstrapper::new(cli.connect()?);

    match cli.command {
        Command::Create(account) => {
            let secrets = AccountSecrets::resolve(account)?;
            let user = bootstrapper
                .create_admin_user(&secrets.email, &secrets.password)
                .await
                .context("failed to create admin user")?;
            println!("Created admin user {} ({})", secrets.email, user.uid);
        }
        Command::Ensure {
            account,
            no_verify,
            no_rollback,
            attempts,
            retry_delay_ms,
        } => {
            let secrets = AccountSecrets::resolve(account)?;
            let options = Command::ensure_options(no_verify, no_rollback, attempts, retry_delay_ms);
            let (user, outcome) = bootstrapper
                .ensure_admin_user(&secrets.email, &secrets.password, &options)
                .await
                .context("failed to ensure admin user")?;
            let verb = match outcome {
                BootstrapOutcome::Created => "Created admin user",
                BootstrapOutcome::Promoted => "Promoted existing user",
                BootstrapOutcome::AlreadyAdmin => "Already an admin:",
            };
            println!("{verb} {} ({})", secrets.email, user.uid);
        }
        Command::Verify { uid } => {
            let snapshot = bootstrapper
                .verify_admin_claim(&uid)
                .await
                .with_context(|| format!("failed to read claims for `{uid}`"))?;
            println!("{}", serde_json::to_string_pretty(snapshot.claims())?);
        }
    }

    Ok(())
}
