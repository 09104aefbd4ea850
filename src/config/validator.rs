use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::server::ServerSpec;
use std::net::IpAddr;

/// Returns true if `host` is an IP address, a well-known bind name or a
/// plausible hostname.
pub fn validate_host(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    if matches!(host, "localhost" | "0.0.0.0" | "::") {
        return true;
    }
    if host.len() > 253 {
        return false;
    }
    host.split('.')
        .all(|label| !label.is_empty() && label.len() <= 63)
}

/// Validates a server definition received from the API boundary.
pub fn validate_server_spec(spec: &ServerSpec) -> Result<()> {
    if spec.name.trim().is_empty() || spec.port.trim().is_empty() || spec.directory.trim().is_empty()
    {
        return Err(Error::ConfigInvalid(
            "Name, port, and directory are required".to_string(),
        ));
    }

    if spec.port.parse::<u16>().is_err() {
        return Err(Error::ConfigInvalid("Port must be a number".to_string()));
    }

    if !spec.host.is_empty() && !validate_host(&spec.host) {
        return Err(Error::ConfigInvalid("Invalid host format".to_string()));
    }

    let certificates = &spec.certificates;
    if certificates.enabled && (certificates.email.trim().is_empty() || certificates.domains.is_empty())
    {
        return Err(Error::ConfigInvalid(
            "Email and domains are required to enable ACME".to_string(),
        ));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &ManagerConfig) -> Result<()> {
    if config.supervisor.shell.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid("Supervisor shell is empty".to_string()));
    }

    if config.supervisor.default_command.trim().is_empty() {
        return Err(Error::ConfigInvalid("Default command is empty".to_string()));
    }

    if config.supervisor.stop_timeout_ms == 0 {
        return Err(Error::ConfigInvalid(
            "stop_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if let Some(user) = &config.supervisor.run_as {
        if user.trim().is_empty() {
            return Err(Error::ConfigInvalid("run_as user is empty".to_string()));
        }
    }

    if config.certificates.renew_interval_secs == 0 || config.certificates.retry_interval_secs == 0
    {
        return Err(Error::ConfigInvalid(
            "Certificate intervals must be greater than zero".to_string(),
        ));
    }

    if let Some(bearer) = &config.auth.bearer {
        if bearer.token.is_empty() {
            return Err(Error::ConfigInvalid("Bearer token is empty".to_string()));
        }
    }

    Ok(())
}
