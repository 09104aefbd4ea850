/// Server supervision module.
///
/// This module holds the pieces the registry ([`crate::ServerManager`])
/// composes to run server processes: the definition types, the launcher that
/// spawns process groups, the reaper that observes their exit, the certificate
/// coordinator and the lifecycle event log.
/// All background tasks are instrumented with `tracing` spans.
///
/// # Components
///
/// * `definition` - Server identity and desired configuration
/// * `launcher` - Command resolution and process group spawning
/// * `reaper` - One waiter per live process
/// * `certificate` - Certificate acquisition bound to a running process
/// * `lifecycle` - Bounded history of process events
///
/// # Examples
///
/// Resolving the command a server would run:
///
/// ```
/// use php_server_manager::config::SupervisorConfig;
/// use php_server_manager::server::{ProcessLauncher, ServerSpec};
///
/// let launcher = ProcessLauncher::new(SupervisorConfig::default());
/// let spec = ServerSpec::new("blog", "::1", "8000", "/srv/blog");
/// assert_eq!(
///     launcher.command_line(&spec),
///     "frankenphp php-server --listen [::1]:8000 -r /srv/blog"
/// );
/// ```
pub mod certificate;
mod definition;
pub mod launcher;
pub mod lifecycle;
mod process;
pub(crate) mod reaper;

pub use certificate::{CertificateCoordinator, CertificateIssuer, CommandIssuer};
pub use definition::{CertificateSettings, ServerDefinition, ServerId, ServerSpec};
pub use launcher::ProcessLauncher;
pub use lifecycle::{ServerEvent, ServerLifecycleEvent, ServerLifecycleManager};
pub use process::{ExitInfo, ProcessInfo, ServerStatus};

pub(crate) use certificate::CertificateTask;
pub(crate) use definition::null_as_default;
pub(crate) use process::{ProcessHandle, SpawnedProcess};
