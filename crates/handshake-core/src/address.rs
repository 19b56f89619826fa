//! Network addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// A host and port pair naming where a peer listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    /// Create a new address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(AddressParseError::EmptyHost);
        }

        let port = port
            .parse()
            .map_err(|_| AddressParseError::InvalidPort(port.to_string()))?;

        Ok(Self::new(host, port))
    }
}

/// Error parsing an address string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("address must be host:port, got: {0}")]
    MissingPort(String),
    #[error("address host cannot be empty")]
    EmptyHost,
    #[error("invalid port: {0}")]
    InvalidPort(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_port() {
        let addr: Address = "127.0.0.1:32011".parse().unwrap();
        assert_eq!(addr, Address::new("127.0.0.1", 32011));
        assert_eq!(addr.to_string(), "127.0.0.1:32011");
    }

    #[test]
    fn parse_bracketed_ipv6() {
        let addr: Address = "[::1]:8001".parse().unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.to_string(), "[::1]:8001");
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(
            "localhost".parse::<Address>(),
            Err(AddressParseError::MissingPort("localhost".into()))
        );
        assert_eq!(":80".parse::<Address>(), Err(AddressParseError::EmptyHost));
        assert!(matches!(
            "localhost:http".parse::<Address>(),
            Err(AddressParseError::InvalidPort(_))
        ));
    }
}
