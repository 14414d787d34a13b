//! Server configuration
//!
//! Layered in increasing precedence: built-in defaults, an optional TOML
//! file, then command-line flags and `ANTIBRUTE_*` environment variables.

use anyhow::{bail, Context, Result};
use antibrute_core::engine::{
    DEFAULT_ACTIVE_TIMEOUT, DEFAULT_IP_LIMIT, DEFAULT_LOGIN_LIMIT, DEFAULT_PASSWORD_LIMIT,
};
use antibrute_core::{BucketKind, CoreError, Limits};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default QUIC listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:50051";

/// Default per-peer connection allowance
pub const DEFAULT_CONNECTIONS_PER_MINUTE: u32 = 600;

/// Antibrute server - brute-force protection decisions over QUIC
#[derive(Parser, Debug, Default)]
#[command(name = "antibrute-server")]
#[command(author = "Antibrute Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Brute-force protection decision service", long_about = None)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ANTIBRUTE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind address for QUIC server
    #[arg(short, long, env = "ANTIBRUTE_BIND")]
    pub bind: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "ANTIBRUTE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Attempts per minute for one login
    #[arg(long, env = "ANTIBRUTE_LOGIN_LIMIT")]
    pub login_limit: Option<u32>,

    /// Attempts per minute with one password
    #[arg(long, env = "ANTIBRUTE_PASSWORD_LIMIT")]
    pub password_limit: Option<u32>,

    /// Attempts per minute from one IP
    #[arg(long, env = "ANTIBRUTE_IP_LIMIT")]
    pub ip_limit: Option<u32>,

    /// Seconds a recovered bucket may sit idle before eviction
    #[arg(long, env = "ANTIBRUTE_BUCKET_ACTIVE_TIMEOUT")]
    pub bucket_active_timeout: Option<u64>,

    /// Seconds between idle-bucket sweeps
    #[arg(long, env = "ANTIBRUTE_SWEEP_INTERVAL")]
    pub sweep_interval: Option<u64>,

    /// Bucket algorithm (token, leaky)
    #[arg(long, env = "ANTIBRUTE_BUCKET_KIND")]
    pub bucket_kind: Option<BucketKind>,

    /// QUIC connections accepted per minute from one peer
    #[arg(long, env = "ANTIBRUTE_CONNECTIONS_PER_MINUTE")]
    pub connections_per_minute: Option<u32>,

    /// Directory holding the server certificate
    #[arg(long, env = "ANTIBRUTE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

/// Per-minute bucket limits as written in the config file
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub login: u32,
    pub password: u32,
    pub ip: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            login: DEFAULT_LOGIN_LIMIT,
            password: DEFAULT_PASSWORD_LIMIT,
            ip: DEFAULT_IP_LIMIT,
        }
    }
}

/// Resolved server configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bind: SocketAddr,
    pub log_level: String,
    pub limits: LimitsConfig,
    pub bucket_active_timeout_secs: u64,
    /// Defaults to the active timeout when unset
    pub sweep_interval_secs: Option<u64>,
    pub bucket_kind: BucketKind,
    pub connections_per_minute: u32,
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 50051)),
            log_level: "info".to_string(),
            limits: LimitsConfig::default(),
            bucket_active_timeout_secs: DEFAULT_ACTIVE_TIMEOUT.as_secs(),
            sweep_interval_secs: None,
            bucket_kind: BucketKind::default(),
            connections_per_minute: DEFAULT_CONNECTIONS_PER_MINUTE,
            data_dir: None,
        }
    }
}

impl Config {
    /// Build the effective configuration from parsed arguments
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay flags and environment values on top of this config
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(bind) = args.bind {
            self.bind = bind;
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
        if let Some(login) = args.login_limit {
            self.limits.login = login;
        }
        if let Some(password) = args.password_limit {
            self.limits.password = password;
        }
        if let Some(ip) = args.ip_limit {
            self.limits.ip = ip;
        }
        if let Some(timeout) = args.bucket_active_timeout {
            self.bucket_active_timeout_secs = timeout;
        }
        if let Some(interval) = args.sweep_interval {
            self.sweep_interval_secs = Some(interval);
        }
        if let Some(kind) = args.bucket_kind {
            self.bucket_kind = kind;
        }
        if let Some(rate) = args.connections_per_minute {
            self.connections_per_minute = rate;
        }
        if let Some(dir) = &args.data_dir {
            self.data_dir = Some(dir.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.limits().validate()?;
        if self.sweep_interval().is_zero() {
            bail!(CoreError::InvalidConfig(
                "sweep interval must be greater than zero".into()
            ));
        }
        if self.connections_per_minute == 0 {
            bail!(CoreError::InvalidConfig(
                "connections_per_minute must be greater than zero".into()
            ));
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            login: self.limits.login,
            password: self.limits.password,
            ip: self.limits.ip,
            active_timeout: Duration::from_secs(self.bucket_active_timeout_secs),
            bucket_kind: self.bucket_kind,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(
            self.sweep_interval_secs
                .unwrap_or(self.bucket_active_timeout_secs),
        )
    }
}
