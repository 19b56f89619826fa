//! Answer greetings until interrupted.
//!
//!   handshake-listen --name Buster --port 32011
//!   handshake-listen --config server.toml --single-shot

use anyhow::{Context, bail};
use clap::Parser;
use handshake_core::Outcome;
use handshake_daemon::cli::ListenArgs;
use handshake_net::WsTransport;
use handshake_server::SupervisorReport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    handshake_daemon::init_logging("handshake_listen")?;

    let args = ListenArgs::parse();
    let settings = args.settings()?;

    let mut supervisor = handshake_server::listen(&WsTransport::new(), &settings)
        .await
        .with_context(|| format!("cannot listen on {}", settings.address))?;
    tracing::info!(
        "{} listening on {} ({:?} greetings)",
        settings.local_identity,
        supervisor.local_address(),
        settings.greeting_policy
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            report = supervisor.next() => match report {
                Some(SupervisorReport::Accepted { id, peer }) => {
                    tracing::debug!("Session {} opened for {}", id, peer);
                }
                Some(SupervisorReport::SessionEnded(end)) => {
                    tracing::info!(
                        "Session {} closed after {} greeting(s)",
                        end.id,
                        end.rounds
                    );
                }
                None => break,
            },
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, stopping sessions");
                supervisor.cancel();
                break;
            }
        }
    }

    match supervisor.join().await {
        Outcome::Aborted => Ok(()),
        outcome => bail!("listener ended: {outcome}"),
    }
}
