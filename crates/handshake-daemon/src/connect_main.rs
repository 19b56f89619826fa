//! Greet every configured server and report the acknowledgements.
//!
//!   handshake-connect --name Gladys --port 32011
//!   handshake-connect --config client.toml

use anyhow::bail;
use clap::Parser;
use handshake_client::{Group, GroupStatus, MemberChange};
use handshake_core::Outcome;
use handshake_daemon::cli::ConnectArgs;
use handshake_net::WsTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    handshake_daemon::init_logging("handshake_connect")?;

    let args = ConnectArgs::parse();
    let settings = args.settings()?;
    if settings.members.is_empty() {
        bail!("no members to connect to");
    }

    tracing::info!(
        "Greeting {} member(s) as {}",
        settings.members.len(),
        settings.local_identity
    );
    let mut group = Group::from_settings(&settings, WsTransport::new());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let status = tokio::select! {
            status = group.next() => status,
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                let outcome = group.stop().await;
                bail!("connection {outcome}");
            }
        };

        match status {
            Some(GroupStatus::Update(update)) => match update.change {
                MemberChange::Gained => tracing::info!("{}: connected", update.member),
                MemberChange::Acknowledged(ack) => {
                    println!(
                        "At client - {} acknowledged {} ({})",
                        ack.responder_name, ack.addressed_to, update.member
                    );
                }
                MemberChange::Lost(outcome) => {
                    tracing::warn!("{}: {}", update.member, outcome)
                }
            },
            Some(GroupStatus::Ready) => {
                tracing::info!("All members acknowledged");
                group.stop().await;
                return Ok(());
            }
            Some(GroupStatus::Completed(outcome)) => {
                bail!("connection {outcome}");
            }
            None => {
                let outcome = group.join().await;
                if outcome == Outcome::Aborted {
                    return Ok(());
                }
                bail!("connection {outcome}");
            }
        }
    }
}
