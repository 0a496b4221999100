//! Server configuration, loaded from environment variables.
//!
//! All settings can be overridden via `AUTHORITY_*` environment variables.

use std::net::SocketAddr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Path to mirror the forensic log to, if any. Without this, the log
    /// lives in memory only and is lost on restart.
    pub forensic_file_path: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `AUTHORITY_BIND_ADDR` — full bind address (default: `127.0.0.1:8700`)
    /// - `PORT` — port to bind on (Railway/Heroku convention, binds `0.0.0.0`)
    /// - `AUTHORITY_LOG_LEVEL` — log filter (default: `info`)
    /// - `AUTHORITY_FORENSIC_FILE` — path to mirror the forensic log to
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = if let Ok(addr) = std::env::var("AUTHORITY_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8700)))
        } else if let Ok(port_str) = std::env::var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(8700);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8700))
        };

        let log_level = std::env::var("AUTHORITY_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
        let forensic_file_path = std::env::var("AUTHORITY_FORENSIC_FILE").ok();

        Self {
            bind_addr,
            log_level,
            forensic_file_path,
        }
    }
}
