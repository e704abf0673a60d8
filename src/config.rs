use std::fmt;
use std::str::FromStr;

use thiserror::Error as ThisError;

/// Startup configuration, assembled from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP bind port.
    pub port: u16,
    /// When set, the server starts in the replica role and attaches to this
    /// primary.
    pub replicaof: Option<PrimaryAddr>,
}

#[derive(Debug, ThisError, PartialEq)]
pub enum ConfigError {
    #[error("expected \"<host> <port>\", got {0:?}")]
    InvalidReplicaOf(String),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

/// Primary endpoint as given to `--replicaof`: a single space-separated
/// `"<host> <port>"` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryAddr {
    pub host: String,
    pub port: u16,
}

impl FromStr for PrimaryAddr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();

        let (host, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(port), None) => (host, port),
            _ => return Err(ConfigError::InvalidReplicaOf(s.to_string())),
        };

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| ConfigError::InvalidPort(port.to_string()))?;

        Ok(PrimaryAddr {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for PrimaryAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.host, self.port)
    }
}
