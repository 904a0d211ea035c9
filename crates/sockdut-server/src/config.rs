//! Startup configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::structured_log::{LogEmitter, LogLevel, Logger};

/// Validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the RPC listener binds to.
    pub bind: SocketAddr,
    /// JSONL log destination; stderr when absent.
    pub log_path: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl ServerConfig {
    pub fn new(
        ip: &str,
        port: u16,
        log_path: Option<PathBuf>,
        log_level: &str,
    ) -> Result<Self, ConfigError> {
        let addr: IpAddr = ip.parse().map_err(|source| ConfigError::InvalidIp {
            ip: ip.to_string(),
            source,
        })?;
        Ok(Self {
            bind: SocketAddr::new(addr, port),
            log_path,
            log_level: log_level.parse()?,
        })
    }

    /// Opens the configured log sink.
    pub fn open_log(&self, run_id: &str) -> std::io::Result<Logger> {
        let emitter = match &self.log_path {
            Some(path) => LogEmitter::to_file(path, run_id, self.log_level)?,
            None => LogEmitter::to_stderr(run_id, self.log_level),
        };
        Ok(Logger::new(emitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_and_ipv6() {
        let v4 = ServerConfig::new("127.0.0.1", 40000, None, "info").unwrap();
        assert_eq!(v4.bind.to_string(), "127.0.0.1:40000");
        let v6 = ServerConfig::new("::1", 40001, None, "debug").unwrap();
        assert_eq!(v6.bind.to_string(), "[::1]:40001");
        assert_eq!(v6.log_level, LogLevel::Debug);
    }

    #[test]
    fn rejects_bad_ip_and_level() {
        let err = ServerConfig::new("localhost", 1, None, "info").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIp { .. }));
        assert!(err.to_string().contains("localhost"));
        assert!(matches!(
            ServerConfig::new("0.0.0.0", 1, None, "chatty").unwrap_err(),
            ConfigError::InvalidLogLevel(_)
        ));
    }
}
