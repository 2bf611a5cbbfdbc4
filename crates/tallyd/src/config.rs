//! Server configuration.
//!
//! Settings are layered, later layers winning:
//! 1. built-in defaults
//! 2. TOML configuration file (`--config`)
//! 3. environment (`TALLY_HOST`, `TALLY_PORT`)
//! 4. command-line arguments

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default bind host (all local IPv4 addresses)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default time allowed for one response write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for handlers to finish after shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default log directive
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable overriding the bind host
pub const ENV_HOST: &str = "TALLY_HOST";

/// Environment variable overriding the port
pub const ENV_PORT: &str = "TALLY_PORT";

// ============================================================================
// Resolved Configuration
// ============================================================================

/// Final configuration used by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host or IP to bind to
    pub host: String,

    /// TCP port to listen on (0 = pick a free port)
    pub port: u16,

    /// Close connections that send nothing for this long
    pub idle_timeout: Option<Duration>,

    /// Give up on a response write after this long
    pub write_timeout: Duration,

    /// How long shutdown waits for handlers to finish
    pub shutdown_grace: Duration,

    /// Log filter directive for the daemon's own crates
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            idle_timeout: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// The `host:port` string to bind.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        match self.host.parse::<std::net::IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.host, self.port),
        }
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the bind host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the idle timeout (`None` disables it)
    pub fn idle_timeout(mut self, idle: Option<Duration>) -> Self {
        self.config.idle_timeout = idle;
        self
    }

    /// Set the write timeout
    pub fn write_timeout(mut self, write: Duration) -> Self {
        self.config.write_timeout = write;
        self
    }

    /// Set the shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Set the log level directive
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

// ============================================================================
// TOML File
// ============================================================================

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerSection,
    #[serde(default)]
    pub logging: FileLoggingSection,
}

/// `[server]` section
#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// 0 disables the idle timeout
    pub idle_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

/// `[logging]` section
#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingSection {
    pub level: Option<String>,
}

impl FileConfig {
    /// Parses a configuration file's text.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::TomlParse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::parse(&text, path)
    }
}

// ============================================================================
// Layering
// ============================================================================

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl CliOverrides {
    /// Resolves the final configuration using the process environment.
    pub fn resolve(&self) -> Result<ServerConfig, ConfigError> {
        self.resolve_with_env(|key| std::env::var(key).ok())
    }

    /// Resolves the final configuration with an injectable environment.
    ///
    /// A port must come from somewhere; without one this fails with
    /// `ConfigError::MissingPort`.
    pub fn resolve_with_env<F>(&self, env: F) -> Result<ServerConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match self.config_path {
            Some(ref path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let env_host = env(ENV_HOST).filter(|h| !h.trim().is_empty());
        let env_port = match env(ENV_PORT) {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                ConfigError::InvalidEnv {
                    var: ENV_PORT,
                    value: raw.clone(),
                    error: e.to_string(),
                }
            })?),
            None => None,
        };

        let port = self
            .port
            .or(env_port)
            .or(file.server.port)
            .ok_or(ConfigError::MissingPort)?;

        let host = self
            .host
            .clone()
            .or(env_host)
            .or(file.server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let mut builder = ServerConfig::builder().host(host).port(port);

        if let Some(secs) = file.server.idle_timeout_secs {
            builder = builder.idle_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }
        if let Some(secs) = file.server.write_timeout_secs {
            builder = builder.write_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = file.server.shutdown_grace_secs {
            builder = builder.shutdown_grace(Duration::from_secs(secs));
        }
        if let Some(level) = self.log_level.clone().or(file.logging.level) {
            builder = builder.log_level(level);
        }

        Ok(builder.build())
    }
}

/// Configuration loading errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {error}", .path.display())]
    FileRead { path: PathBuf, error: String },

    #[error("Failed to parse config file '{}': {error}", .path.display())]
    TomlParse { path: PathBuf, error: String },

    #[error("Invalid value '{value}' for {var}: {error}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        error: String,
    },

    #[error("No port given (pass PORT, set TALLY_PORT, or set server.port in the config file)")]
    MissingPort,
}
