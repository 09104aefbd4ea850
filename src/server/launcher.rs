//! Builds launch commands for server definitions and spawns them.
//!
//! Every server runs as `<shell> -c <command line>` in its own process group
//! so that stopping it can signal the shell and everything it started.

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::server::ServerSpec;
use crate::server::process::{ProcessHandle, SpawnedProcess};
use nix::unistd::User;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tokio::sync::watch;

/// Placeholder for the configured host.
pub const HOST_PLACEHOLDER: &str = "{host}";
/// Placeholder for the configured port.
pub const PORT_PLACEHOLDER: &str = "{port}";
/// Placeholder for the server directory.
pub const DIRECTORY_PLACEHOLDER: &str = "{directory}";
/// Placeholder for the host formatted for binding (IPv6 literals bracketed).
pub const BIND_HOST_PLACEHOLDER: &str = "{bind_host}";
/// Placeholder for the full listen address.
pub const LISTEN_ADDR_PLACEHOLDER: &str = "{listen_addr}";

/// Brackets IPv6 address literals so they can be joined with a port.
///
/// Hosts that are already bracketed, or that contain a colon without being an
/// address, are returned unchanged.
pub fn format_bind_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') && host.parse::<IpAddr>().is_ok() {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

/// Listen address for a server: `bind_host:port`, prefixed with `https://`
/// when certificate management is enabled.
pub fn listen_addr(spec: &ServerSpec) -> String {
    let addr = format!("{}:{}", format_bind_host(&spec.host), spec.port);
    if spec.certificates.enabled {
        format!("https://{}", addr)
    } else {
        addr
    }
}

/// Substitutes all placeholders in `template` with values from `spec`.
pub fn render_template(template: &str, spec: &ServerSpec) -> String {
    template
        .replace(HOST_PLACEHOLDER, &spec.host)
        .replace(PORT_PLACEHOLDER, &spec.port)
        .replace(DIRECTORY_PLACEHOLDER, &spec.directory)
        .replace(BIND_HOST_PLACEHOLDER, &format_bind_host(&spec.host))
        .replace(LISTEN_ADDR_PLACEHOLDER, &listen_addr(spec))
}

/// Resolves the command line for `spec`: its own template when set,
/// otherwise `default_template`.
///
/// # Examples
///
/// ```
/// use php_server_manager::server::{ServerSpec, launcher::resolve_command};
///
/// let spec = ServerSpec::new("app", "127.0.0.1", "9000", "/srv/app")
///     .with_command("run --addr {listen_addr} --dir {directory}");
/// assert_eq!(
///     resolve_command(&spec, "unused"),
///     "run --addr 127.0.0.1:9000 --dir /srv/app"
/// );
/// ```
pub fn resolve_command(spec: &ServerSpec, default_template: &str) -> String {
    if spec.command.trim().is_empty() {
        render_template(default_template, spec)
    } else {
        render_template(&spec.command, spec)
    }
}

/// Spawns server processes according to the supervisor configuration.
pub struct ProcessLauncher {
    config: SupervisorConfig,
    next_generation: AtomicU64,
}

impl ProcessLauncher {
    /// Create a new launcher
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            next_generation: AtomicU64::new(1),
        }
    }

    /// The command line that would be run for `spec`.
    pub fn command_line(&self, spec: &ServerSpec) -> String {
        resolve_command(spec, &self.config.default_command)
    }

    /// Spawns the server as the leader of a new process group.
    ///
    /// The child's working directory is the supervisor's own; the server
    /// directory only reaches the process through the command line.
    pub(crate) fn spawn(&self, spec: &ServerSpec) -> Result<SpawnedProcess> {
        let command_line = self.command_line(spec);
        let working_dir = std::env::current_dir()
            .map_err(|e| Error::Spawn(format!("Failed to resolve working directory: {}", e)))?;

        let mut command = Command::new(&self.config.shell);
        command
            .arg("-c")
            .arg(&command_line)
            .current_dir(working_dir)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(prefix) = &self.config.path_prefix {
            let path = match std::env::var("PATH") {
                Ok(current) if !current.is_empty() => format!("{}:{}", prefix, current),
                _ => prefix.clone(),
            };
            command.env("PATH", path);
        }

        if let Some(user_name) = &self.config.run_as {
            let user = User::from_name(user_name)
                .map_err(|e| Error::Spawn(format!("Failed to look up user '{}': {}", user_name, e)))?
                .ok_or_else(|| Error::Spawn(format!("Unknown user '{}'", user_name)))?;
            command.uid(user.uid.as_raw()).gid(user.gid.as_raw());
        }

        let child = command
            .spawn()
            .map_err(|e| Error::Spawn(format!("Failed to start '{}': {}", command_line, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| Error::Spawn("Process exited before its PID was read".to_string()))?;
        let pgid = i32::try_from(pid)
            .map_err(|_| Error::Spawn(format!("PID {} out of range", pid)))?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (exit_tx, exit_rx) = watch::channel(None);

        tracing::debug!(pgid, command = %command_line, "Spawned server process group");

        Ok(SpawnedProcess {
            handle: ProcessHandle::new(generation, pgid, command_line, exit_rx),
            child,
            exit_tx,
        })
    }
}
