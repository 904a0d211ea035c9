//! Server and configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address '{ip}': {source}")]
    InvalidIp {
        ip: String,
        source: std::net::AddrParseError,
    },
    #[error("unknown log level '{0}', expected trace|debug|info|warn|error")]
    InvalidLogLevel(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
