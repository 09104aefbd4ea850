//! Background waiter for spawned server processes.

use crate::server::ServerId;
use crate::server::process::ExitInfo;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawns the reaper for one process.
///
/// The task waits for `child` to exit, publishes the exit on `exit_tx` (which
/// wakes a pending Stop), then hands it to `on_exit` so the registry can
/// commit the transition.
pub(crate) fn spawn_reaper<F>(
    server: ServerId,
    mut child: Child,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    on_exit: F,
) -> JoinHandle<()>
where
    F: FnOnce(ExitInfo) + Send + 'static,
{
    let span = tracing::debug_span!("reaper", server = %server);
    tokio::spawn(
        async move {
            let exit = match child.wait().await {
                Ok(status) => ExitInfo::from(status),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to wait for server process");
                    ExitInfo::unknown()
                }
            };
            tracing::debug!(%exit, "Server process reaped");

            exit_tx.send_replace(Some(exit));
            on_exit(exit);
        }
        .instrument(span),
    )
}
