//! Shared plumbing for the `handshake-listen` and `handshake-connect`
//! binaries: settings files, command-line overrides and logging.

pub mod cli;
pub mod settings;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the defaults.
pub fn init_logging(binary: &str) -> anyhow::Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for target in [binary, "handshake_net", "handshake_client", "handshake_server"] {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
