pub mod amount;
pub mod balance;
pub mod client;
pub mod config;
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod error;
pub mod fee;
pub mod gateway;
pub mod ledger;
pub mod registry;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use error::{AppError, Result};
pub use workflow::{MigrationDeps, MigrationWorkflow, TransitionOutcome};

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}
