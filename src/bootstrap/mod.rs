mod bootstrapper;

#[cfg(test)]
mod memory;
#[cfg(test)]
mod test;

pub use bootstrapper::{
    AdminBootstrapper, BootstrapError, BootstrapOutcome, EnsureOptions, RetryPolicy,
};
