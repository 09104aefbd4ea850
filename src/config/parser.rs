use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of Actix Web workers for the API server.
pub const DEFAULT_WORKERS: usize = 4;

/// Default launch command, rendered with the same placeholders as custom commands.
pub const DEFAULT_COMMAND: &str = "frankenphp php-server --listen {listen_addr} -r {directory}";

/// Default ACME client invocation used by the command-based certificate issuer.
pub const DEFAULT_ISSUER_COMMAND: &str = "certbot certonly --non-interactive --agree-tos \
     --keep-until-expiring --standalone --email {email} --config-dir {storage} \
     --work-dir {storage}/work --logs-dir {storage}/logs {domain_args}";

/// Bind address of the management API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiServerConfig {
    /// Host or address the API listens on.
    pub host: String,
    /// Port the API listens on.
    pub port: u16,
    /// Number of Actix Web workers.
    pub workers: Option<usize>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

/// Bearer token authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BearerAuthConfig {
    /// Token expected in the `Authorization: Bearer <token>` header.
    pub token: String,
}

/// Authentication settings for the management API.
///
/// When no bearer section is present every request is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Bearer token authentication settings.
    #[serde(default)]
    pub bearer: Option<BearerAuthConfig>,
}

/// How server processes are launched and stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Shell used to run the resolved command line (`<shell> -c <command>`).
    pub shell: PathBuf,
    /// Template used when a server has no custom command.
    pub default_command: String,
    /// OS user the server processes run as. `None` keeps the supervisor's identity.
    pub run_as: Option<String>,
    /// Directory prepended to the child's `PATH`.
    pub path_prefix: Option<String>,
    /// How long Stop waits for the killed process to be reaped, in milliseconds.
    pub stop_timeout_ms: u64,
}

impl SupervisorConfig {
    /// Stop's bounded wait for the reaper, as a `Duration`.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            default_command: DEFAULT_COMMAND.to_string(),
            run_as: None,
            path_prefix: Some("/usr/local/bin".to_string()),
            stop_timeout_ms: 5_000,
        }
    }
}

/// Certificate acquisition and renewal settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CertificateConfig {
    /// Command template run by the default issuer.
    ///
    /// Placeholders: `{email}`, `{domains}`, `{domain_args}`, `{storage}`.
    pub issuer_command: String,
    /// Parent directory of per-server certificate storage.
    pub storage_root: PathBuf,
    /// Delay between successful acquisitions, in seconds.
    pub renew_interval_secs: u64,
    /// Delay before retrying a failed acquisition, in seconds.
    pub retry_interval_secs: u64,
}

impl CertificateConfig {
    /// Renewal period as a `Duration`.
    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.renew_interval_secs)
    }

    /// Retry period as a `Duration`.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            issuer_command: DEFAULT_ISSUER_COMMAND.to_string(),
            storage_root: PathBuf::from("certificates"),
            renew_interval_secs: 12 * 60 * 60,
            retry_interval_secs: 10 * 60,
        }
    }
}

/// Main configuration for the server manager.
///
/// # YAML layout
///
/// ```yaml
/// server:
///   host: 0.0.0.0
///   port: 8080
/// auth:
///   bearer:
///     token: secret
/// servers_config_path: /etc/phpservermanager/servers.json
/// supervisor:
///   shell: /bin/sh
///   run_as: www-data
///   stop_timeout_ms: 5000
/// certificates:
///   storage_root: /var/lib/phpservermanager/certificates
/// ```
///
/// Every section is optional and falls back to its defaults.
///
/// # Examples
///
/// ```
/// use php_server_manager::config::ManagerConfig;
///
/// let config = ManagerConfig::parse_from_str("server:\n  port: 9090\n").unwrap();
/// assert_eq!(config.server.port, 9090);
/// assert_eq!(config.server.host, "0.0.0.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Management API bind settings.
    pub server: ApiServerConfig,
    /// Management API authentication.
    pub auth: AuthConfig,
    /// Path of the JSON file holding the server set.
    pub servers_config_path: PathBuf,
    /// Process launch settings.
    pub supervisor: SupervisorConfig,
    /// Certificate management settings.
    pub certificates: CertificateConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            server: ApiServerConfig::default(),
            auth: AuthConfig::default(),
            servers_config_path: PathBuf::from("servers.json"),
            supervisor: SupervisorConfig::default(),
            certificates: CertificateConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Loads a configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file does not exist
    /// * The file cannot be read
    /// * The file contents are not valid YAML
    /// * A field has the wrong type
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ConfigParse(format!(
                "Configuration file {} not found",
                path.display()
            )),
            _ => Error::ConfigParse(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        })?;

        Self::parse_from_str(&content)
    }

    /// Parses a configuration from a YAML string.
    ///
    /// An empty document yields the default configuration.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }
}

/// Directory holding the configuration for the current platform.
pub fn default_config_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        let home = std::env::var_os("HOME").unwrap_or_default();
        PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("phpservermanager")
    } else if cfg!(target_os = "linux") {
        PathBuf::from("/etc").join("phpservermanager")
    } else {
        PathBuf::from(".").join("phpservermanager")
    }
}

/// Default location of `config.yaml`.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}
