//! Command-line arguments.
//!
//! Flags override whatever the settings file (or the factory settings)
//! provide.

use crate::settings::{self, SettingsError};
use clap::Parser;
use handshake_core::{Address, ClientSettings, GreetingPolicy, Identity, ServerSettings};
use std::path::PathBuf;

/// Member name used when the address comes from `--host`/`--port`.
pub const DEFAULT_MEMBER: &str = "server";

/// Greet a server and wait for its acknowledgement.
#[derive(Debug, Parser)]
#[command(name = "handshake-connect", version)]
pub struct ConnectArgs {
    /// TOML settings file.
    #[arg(long, env = "HANDSHAKE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name to greet with.
    #[arg(long)]
    pub name: Option<String>,

    /// Server host.
    #[arg(long)]
    pub host: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// How long to wait for the acknowledgement, in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Attempts per member before giving up.
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

impl ConnectArgs {
    pub fn settings(&self) -> Result<ClientSettings, SettingsError> {
        let mut settings: ClientSettings = settings::load(self.config.as_deref())?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut ClientSettings) {
        if let Some(name) = &self.name {
            settings.local_identity = Identity::new(name.as_str());
        }
        if self.host.is_some() || self.port.is_some() {
            let member = settings
                .members
                .entry(DEFAULT_MEMBER.to_string())
                .or_insert_with(|| ServerSettings::default().address);
            if let Some(host) = &self.host {
                member.host = host.clone();
            }
            if let Some(port) = self.port {
                member.port = port;
            }
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.handshake_timeout_ms = timeout_ms;
        }
        if let Some(max_attempts) = self.max_attempts {
            settings.retry.max_attempts = Some(max_attempts);
        }
    }
}

/// Answer greetings until interrupted.
#[derive(Debug, Parser)]
#[command(name = "handshake-listen", version)]
pub struct ListenArgs {
    /// TOML settings file.
    #[arg(long, env = "HANDSHAKE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name to acknowledge with.
    #[arg(long)]
    pub name: Option<String>,

    /// Address to listen on.
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Allow one greeting per stream; a second one ends the session.
    #[arg(long)]
    pub single_shot: bool,
}

impl ListenArgs {
    pub fn settings(&self) -> Result<ServerSettings, SettingsError> {
        let mut settings: ServerSettings = settings::load(self.config.as_deref())?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut ServerSettings) {
        if let Some(name) = &self.name {
            settings.local_identity = Identity::new(name.as_str());
        }
        if let Some(host) = &self.host {
            settings.address = Address::new(host.as_str(), settings.address.port);
        }
        if let Some(port) = self.port {
            settings.address.port = port;
        }
        if self.single_shot {
            settings.greeting_policy = GreetingPolicy::SingleShot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_flags_override_factory_settings() {
        let args = ConnectArgs::parse_from([
            "handshake-connect",
            "--name",
            "Mabel",
            "--port",
            "4000",
            "--max-attempts",
            "2",
        ]);
        let settings = args.settings().unwrap();

        assert_eq!(settings.local_identity, Identity::new("Mabel"));
        assert_eq!(
            settings.members.get(DEFAULT_MEMBER),
            Some(&Address::new("127.0.0.1", 4000))
        );
        assert_eq!(settings.retry.max_attempts, Some(2));
        assert_eq!(settings.handshake_timeout_ms, 3_000);
    }

    #[test]
    fn listen_flags_override_factory_settings() {
        let args = ListenArgs::parse_from([
            "handshake-listen",
            "--host",
            "0.0.0.0",
            "--single-shot",
        ]);
        let settings = args.settings().unwrap();

        assert_eq!(settings.local_identity, Identity::new("Buster"));
        assert_eq!(settings.address, Address::new("0.0.0.0", 32011));
        assert_eq!(settings.greeting_policy, GreetingPolicy::SingleShot);
    }
}
