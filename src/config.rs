//! Configuration management for the FTPS server
//!
//! Settings are read once at startup from an optional `config.toml` with
//! `FTPD`-prefixed environment overrides and are immutable afterwards.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind the FTP control connection
    pub bind_address: String,

    /// Port for FTP control connection
    pub control_port: u16,

    /// Name announced in the greeting
    pub server_name: Option<String>,

    /// Root directory served by the local driver
    pub server_root: String,

    /// Maximum FTP command length, excluding the line terminator
    pub max_command_length: usize,

    /// Credentials accepted by the local driver (user -> password)
    pub users: HashMap<String, String>,

    pub tls: TlsSettings,

    pub data_channel: DataChannelSettings,
}

/// RFC 4217 settings
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TlsSettings {
    pub private_key_file: Option<String>,
    pub cert_chain_file: Option<String>,

    /// Refuse USER until the control channel is secured with AUTH TLS
    pub enforce_tls: bool,

    /// Refuse transfers unless the client selected PROT P
    pub enforce_data_tls: bool,
}

/// How wait loops pause between readiness checks
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaiterKind {
    /// Yield to the tokio reactor
    Reactor,
    /// Block the calling thread
    Blocking,
}

/// Data connection tuning
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataChannelSettings {
    /// First backoff interval while waiting for a data connection
    pub wait_initial_ms: u64,

    /// Waiting stops once the next interval would exceed this
    pub wait_cap_ms: u64,

    pub waiter: WaiterKind,

    /// Size of each write while streaming to the client
    pub chunk_size: usize,

    /// Upper bound for dialing out in active mode
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            control_port: 2121,
            server_name: None,
            server_root: "./server_root".to_string(),
            max_command_length: 512,
            users: HashMap::new(),
            tls: TlsSettings::default(),
            data_channel: DataChannelSettings::default(),
        }
    }
}

impl Default for DataChannelSettings {
    fn default() -> Self {
        Self {
            wait_initial_ms: 100,
            wait_cap_ms: 25_000,
            waiter: WaiterKind::Reactor,
            chunk_size: 16 * 1024,
            connect_timeout_secs: 25,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `config.toml` (if present) with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from the given file stem with environment overrides
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("FTPD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate(crate::tls::tls_supported())?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self, tls_supported: bool) -> Result<(), ConfigError> {
        if self.control_port == 0 {
            return Err(ConfigError::Message("Control port cannot be 0".into()));
        }

        if self.server_root.is_empty() {
            return Err(ConfigError::Message("server_root cannot be empty".into()));
        }

        if self.max_command_length < 16 {
            return Err(ConfigError::Message(
                "max_command_length must be at least 16".into(),
            ));
        }

        let data = &self.data_channel;
        if data.wait_initial_ms == 0 || data.wait_initial_ms > data.wait_cap_ms {
            return Err(ConfigError::Message(
                "wait_initial_ms must be positive and not above wait_cap_ms".into(),
            ));
        }

        if data.chunk_size == 0 {
            return Err(ConfigError::Message("chunk_size must be greater than 0".into()));
        }

        self.tls.validate(tls_supported)
    }

    /// Get bind address and control port as socket address
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    /// Get server root as PathBuf
    pub fn server_root_path(&self) -> PathBuf {
        PathBuf::from(&self.server_root)
    }
}

impl TlsSettings {
    fn validate(&self, tls_supported: bool) -> Result<(), ConfigError> {
        let key = self.private_key_file.as_deref();
        let cert = self.cert_chain_file.as_deref();

        if (self.enforce_tls || self.enforce_data_tls) && (key.is_none() || cert.is_none()) {
            return Err(ConfigError::Message(
                "private_key_file and cert_chain_file MUST be specified when enabling enforce_tls or enforce_data_tls".into(),
            ));
        }

        for path in [key, cert].into_iter().flatten() {
            if !is_readable(Path::new(path)) {
                return Err(ConfigError::Message(format!("{} not readable", path)));
            }
        }

        if key.is_some() != cert.is_some() {
            return Err(ConfigError::Message(
                "private_key_file and cert_chain_file must be both specified".into(),
            ));
        }

        if key.is_some() && !tls_supported {
            return Err(ConfigError::Message(
                "this build does not support TLS".into(),
            ));
        }

        Ok(())
    }
}

impl DataChannelSettings {
    pub fn wait_initial(&self) -> Duration {
        Duration::from_millis(self.wait_initial_ms)
    }

    pub fn wait_cap(&self) -> Duration {
        Duration::from_millis(self.wait_cap_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

pub(crate) fn is_readable(path: &Path) -> bool {
    std::fs::File::open(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn readable_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pem").unwrap();
        file
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate(true).is_ok());
    }

    #[test]
    fn test_enforce_tls_requires_both_files() {
        let mut config = ServerConfig::default();
        config.tls.enforce_tls = true;
        assert!(config.validate(true).is_err());

        let key = readable_file();
        config.tls.private_key_file = Some(key.path().to_string_lossy().into_owned());
        assert!(config.validate(true).is_err());

        let cert = readable_file();
        config.tls.cert_chain_file = Some(cert.path().to_string_lossy().into_owned());
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_enforce_data_tls_requires_files() {
        let mut config = ServerConfig::default();
        config.tls.enforce_data_tls = true;
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn test_unreadable_key_is_rejected() {
        let mut config = ServerConfig::default();
        let cert = readable_file();
        config.tls.private_key_file = Some("/nonexistent/key.pem".into());
        config.tls.cert_chain_file = Some(cert.path().to_string_lossy().into_owned());
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn test_unpaired_files_are_rejected() {
        let mut config = ServerConfig::default();
        let cert = readable_file();
        config.tls.cert_chain_file = Some(cert.path().to_string_lossy().into_owned());
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn test_tls_files_require_tls_support() {
        let mut config = ServerConfig::default();
        let key = readable_file();
        let cert = readable_file();
        config.tls.private_key_file = Some(key.path().to_string_lossy().into_owned());
        config.tls.cert_chain_file = Some(cert.path().to_string_lossy().into_owned());
        assert!(config.validate(false).is_err());
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ftpd.toml");
        std::fs::write(
            &path,
            "control_port = 2200\nserver_name = \"test\"\n\n[users]\nalice = \"alice123\"\n\n[data_channel]\nwaiter = \"blocking\"\nwait_cap_ms = 800\n",
        )
        .unwrap();

        let stem = path.with_extension("");
        let config = ServerConfig::load_from(&stem.to_string_lossy()).unwrap();
        assert_eq!(config.control_port, 2200);
        assert_eq!(config.server_name.as_deref(), Some("test"));
        assert_eq!(config.users.get("alice").map(String::as_str), Some("alice123"));
        assert_eq!(config.data_channel.waiter, WaiterKind::Blocking);
        assert_eq!(config.data_channel.wait_cap(), Duration::from_millis(800));
        assert_eq!(config.data_channel.wait_initial_ms, 100);
    }
}
