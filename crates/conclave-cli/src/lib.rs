//! Conclave command-line driver
//!
//! Wires the coordination library to real collaborators: HTTP agents for
//! consensus, and agent/test commands plus git for the ralph loop.

pub mod agents;
pub mod cli;
pub mod commands;

/// Install the stderr log subscriber. `RUST_LOG` overrides the default
/// `info` filter; stdout stays reserved for command output.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
