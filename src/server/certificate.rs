//! Certificate acquisition and renewal bound to a server's running window.
//!
//! When a certificate-enabled server starts, the coordinator launches a task
//! that keeps asking a [`CertificateIssuer`] to obtain or renew certificates
//! for the server's domains. The task is owned by the server's live process
//! entry and is aborted as soon as that entry is released, whether by Stop or
//! by the reaper. Failures are logged and recorded, never returned.

use crate::config::CertificateConfig;
use crate::error::{Error, Result};
use crate::server::lifecycle::{ServerLifecycleEvent, ServerLifecycleManager};
use crate::server::process::ExitInfo;
use crate::server::{CertificateSettings, ServerId};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Obtains or renews the certificates of one server.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Ensures valid certificates exist for `settings.domains` in
    /// `settings.storage_path`.
    async fn obtain(&self, server: &ServerId, settings: &CertificateSettings) -> Result<()>;
}

/// Issuer that runs an external ACME client.
///
/// The command template understands `{email}`, `{domains}` (comma separated),
/// `{domain_args}` (`-d a -d b`) and `{storage}`.
pub struct CommandIssuer {
    shell: PathBuf,
    template: String,
}

impl CommandIssuer {
    /// Create an issuer running `template` through `shell -c`.
    pub fn new(shell: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            template: template.into(),
        }
    }

    /// Renders the command line for `settings`.
    pub fn command_line(&self, settings: &CertificateSettings) -> String {
        let domain_args = settings
            .domains
            .iter()
            .map(|domain| format!("-d {}", domain))
            .collect::<Vec<_>>()
            .join(" ");

        self.template
            .replace("{email}", &settings.email)
            .replace("{domains}", &settings.domains.join(","))
            .replace("{domain_args}", &domain_args)
            .replace("{storage}", &settings.storage_path)
    }
}

#[async_trait]
impl CertificateIssuer for CommandIssuer {
    async fn obtain(&self, server: &ServerId, settings: &CertificateSettings) -> Result<()> {
        tokio::fs::create_dir_all(&settings.storage_path)
            .await
            .map_err(|e| {
                Error::Certificate(format!(
                    "Failed to create certificate storage '{}': {}",
                    settings.storage_path, e
                ))
            })?;

        let command_line = self.command_line(settings);
        tracing::debug!(server = %server, command = %command_line, "Running certificate issuer");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(&command_line)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Certificate(format!("Failed to run issuer: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Certificate(format!(
                "Issuer failed with {}: {}",
                ExitInfo::from(output.status),
                stderr.trim()
            )))
        }
    }
}

/// A running acquisition/renewal task. Dropping it aborts the task.
#[derive(Debug)]
pub(crate) struct CertificateTask {
    handle: JoinHandle<()>,
}

impl CertificateTask {
    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CertificateTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Launches certificate tasks for starting servers.
pub struct CertificateCoordinator {
    issuer: Arc<dyn CertificateIssuer>,
    storage_root: PathBuf,
    renew_interval: Duration,
    retry_interval: Duration,
    lifecycle: Arc<ServerLifecycleManager>,
}

impl CertificateCoordinator {
    /// Create a coordinator using `issuer` and the intervals from `config`.
    pub fn new(
        issuer: Arc<dyn CertificateIssuer>,
        config: &CertificateConfig,
        lifecycle: Arc<ServerLifecycleManager>,
    ) -> Self {
        Self {
            issuer,
            storage_root: config.storage_root.clone(),
            renew_interval: config.renew_interval(),
            retry_interval: config.retry_interval(),
            lifecycle,
        }
    }

    /// Per-server storage directory: the configured path, or
    /// `<storage_root>/<id>` when none is set.
    pub fn storage_for(&self, id: &ServerId, settings: &CertificateSettings) -> PathBuf {
        if settings.storage_path.trim().is_empty() {
            self.storage_root.join(id.as_str())
        } else {
            Path::new(&settings.storage_path).to_path_buf()
        }
    }

    /// Starts the renewal loop for `id`, or returns `None` when certificate
    /// management is not active for these settings.
    pub(crate) fn launch(&self, id: &ServerId, settings: &CertificateSettings) -> Option<CertificateTask> {
        if !settings.is_active() {
            return None;
        }

        let mut settings = settings.clone();
        settings.storage_path = self.storage_for(id, &settings).to_string_lossy().into_owned();

        let issuer = Arc::clone(&self.issuer);
        let lifecycle = Arc::clone(&self.lifecycle);
        let renew_interval = self.renew_interval;
        let retry_interval = self.retry_interval;
        let server = id.clone();
        let span = tracing::info_span!("certificates", server = %id);

        let handle = tokio::spawn(
            async move {
                loop {
                    let delay = match issuer.obtain(&server, &settings).await {
                        Ok(()) => {
                            tracing::info!(domains = ?settings.domains, "Certificates are up to date");
                            renew_interval
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Certificate management failed");
                            lifecycle.record(
                                &server,
                                ServerLifecycleEvent::CertificateFailed,
                                Some(e.to_string()),
                            );
                            retry_interval
                        }
                    };
                    tokio::time::sleep(delay).await;
                }
            }
            .instrument(span),
        );

        Some(CertificateTask { handle })
    }
}
