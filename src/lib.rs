/*!
 # PHP Server Manager

 A Rust library for supervising a set of PHP application servers.

 ## Overview

 PHP Server Manager provides functionality to:
 - Keep a persistent registry of server definitions (name, host, port, document root)
 - Start each server as its own OS process group and stop it with a hard kill
 - Notice servers that exit on their own and mark them stopped
 - Obtain and renew TLS certificates for servers that request them
 - Expose all of the above over an HTTP management API

 ## Basic Usage

 ```no_run
 use php_server_manager::{ManagerConfig, Result, ServerManager, ServerSpec};

 #[tokio::main]
 async fn main() -> Result<()> {
     let config = ManagerConfig::from_file("config.yaml")?;
     let manager = ServerManager::builder(config).build().await?;

     // Register a server and start it
     let id = manager.create(ServerSpec::new("blog", "127.0.0.1", "8000", "/srv/blog"))?;
     manager.start(&id).await?;
     println!("blog is {}", manager.status(&id)?);

     // Stop everything and write the final state
     manager.shutdown().await;
     Ok(())
 }
 ```

 ## Features

 - **Process Groups**: Every server and all of its children are killed together
 - **Exit Tracking**: A reaper task per process keeps the running flag honest
 - **Persistence**: Definitions survive restarts; running flags never do
 - **Certificates**: Renewal tasks live exactly as long as their server process
 - **HTTP API**: actix-web API with CORS and bearer-token authentication
*/

pub mod api;
pub mod config;
pub mod error;
pub mod persistence;
pub mod server;

pub use api::{ApiHandle, ApiServer};
pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use persistence::{JsonFileStore, MemoryStore, ServerStore, Snapshot};
pub use server::{ProcessInfo, ServerDefinition, ServerId, ServerSpec, ServerStatus};

use config::ApiServerConfig;
use persistence::SaveQueue;
use serde::{Deserialize, Serialize};
use server::{
    CertificateCoordinator, CertificateIssuer, CertificateTask, CommandIssuer, ExitInfo,
    ProcessHandle, ProcessLauncher, ServerEvent, ServerLifecycleEvent, ServerLifecycleManager,
    SpawnedProcess, reaper,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Host used when a server or the API is given an empty one.
pub const DEFAULT_HOST: &str = "localhost";

/// API port used when the persisted settings carry an empty one.
pub const DEFAULT_API_PORT: &str = "8080";

/// Bind address of the management API, persisted with the server set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// API bind host
    pub host: String,
    /// API bind port
    pub port: String,
}

impl ManagerSettings {
    fn normalized(host: &str, port: &str) -> Self {
        Self {
            host: non_empty_or(host, DEFAULT_HOST),
            port: non_empty_or(port, DEFAULT_API_PORT),
        }
    }

    fn from_config(config: &ApiServerConfig) -> Self {
        Self::normalized(&config.host, &config.port.to_string())
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// The live process of a server and what is bound to its lifetime.
struct LiveProcess {
    handle: ProcessHandle,
    certificate: Option<CertificateTask>,
}

impl LiveProcess {
    /// Consumes the process record, cancelling its certificate task.
    fn release(self) {
        if let Some(task) = self.certificate {
            drop(task);
            tracing::debug!("Certificate management cancelled");
        }
    }
}

struct ServerEntry {
    definition: ServerDefinition,
    status: ServerStatus,
    gate: Arc<tokio::sync::Mutex<()>>,
    process: Option<LiveProcess>,
}

impl ServerEntry {
    fn new(definition: ServerDefinition) -> Self {
        Self {
            definition,
            status: ServerStatus::Stopped,
            gate: Arc::new(tokio::sync::Mutex::new(())),
            process: None,
        }
    }

    // `running` and the live process only ever change through these two.
    fn attach(&mut self, process: LiveProcess) {
        self.process = Some(process);
        self.definition.running = true;
        self.status = ServerStatus::Running;
    }

    fn detach(&mut self) -> Option<LiveProcess> {
        self.definition.running = false;
        self.status = ServerStatus::Stopped;
        self.process.take()
    }

    fn holds(&self, generation: u64) -> bool {
        self.process
            .as_ref()
            .is_some_and(|live| live.handle.generation() == generation)
    }
}

struct RegistryState {
    servers: HashMap<ServerId, ServerEntry>,
    next_id: u64,
    settings: ManagerSettings,
}

impl RegistryState {
    /// Rebuilds the registry from a persisted snapshot. Nothing is running
    /// after a restart, whatever the snapshot says.
    fn restore(snapshot: Snapshot, defaults: &ApiServerConfig) -> Self {
        let mut next_id = snapshot.next_id.max(1);
        let mut servers = HashMap::with_capacity(snapshot.servers.len());

        for (id, mut definition) in snapshot.servers {
            if let Some(value) = id.counter_value() {
                next_id = next_id.max(value.saturating_add(1));
            }
            definition.id = id.clone();
            definition.running = false;
            definition.spec = definition.spec.normalized();
            servers.insert(id, ServerEntry::new(definition));
        }

        let settings = if snapshot.server_host.is_empty() && snapshot.server_port.is_empty() {
            ManagerSettings::from_config(defaults)
        } else {
            let fallback = ManagerSettings::from_config(defaults);
            ManagerSettings {
                host: non_empty_or(&snapshot.server_host, &fallback.host),
                port: non_empty_or(&snapshot.server_port, &fallback.port),
            }
        };

        Self {
            servers,
            next_id,
            settings,
        }
    }

    fn entry(&self, id: &ServerId) -> Result<&ServerEntry> {
        self.servers
            .get(id)
            .ok_or_else(|| Error::ServerNotFound(id.to_string()))
    }

    fn entry_mut(&mut self, id: &ServerId) -> Result<&mut ServerEntry> {
        self.servers
            .get_mut(id)
            .ok_or_else(|| Error::ServerNotFound(id.to_string()))
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            servers: self
                .servers
                .iter()
                .map(|(id, entry)| (id.clone(), entry.definition.clone()))
                .collect(),
            next_id: self.next_id,
            server_host: self.settings.host.clone(),
            server_port: self.settings.port.clone(),
        }
    }
}

struct Shared {
    state: Mutex<RegistryState>,
    launcher: ProcessLauncher,
    certificates: CertificateCoordinator,
    lifecycle: Arc<ServerLifecycleManager>,
    saves: SaveQueue,
    stop_timeout: Duration,
}

impl Shared {
    fn lock_state(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Other("Failed to lock server registry".to_string()))
    }

    fn queue_save(&self, state: &RegistryState) {
        self.saves.schedule(state.snapshot());
    }

    /// Commits an exit observed by the reaper.
    ///
    /// Only the entry still holding `generation` is cleared, and never while a
    /// Stop is in progress; Stop commits its own transition.
    fn reap(&self, id: &ServerId, generation: u64, exit: ExitInfo) {
        let released = match self.lock_state() {
            Ok(mut state) => match state.servers.get_mut(id) {
                Some(entry)
                    if entry.status != ServerStatus::Stopping && entry.holds(generation) =>
                {
                    entry.detach()
                }
                _ => None,
            },
            Err(e) => {
                tracing::error!(server = %id, error = %e, "Failed to record process exit");
                None
            }
        };

        if let Some(live) = released {
            live.release();
            tracing::info!(server = %id, %exit, "Server process exited");
            self.lifecycle
                .record(id, ServerLifecycleEvent::Exited, Some(exit.to_string()));
        }
    }
}

/// Builder for [`ServerManager`].
pub struct ServerManagerBuilder {
    config: ManagerConfig,
    store: Option<Arc<dyn ServerStore>>,
    issuer: Option<Arc<dyn CertificateIssuer>>,
}

impl ServerManagerBuilder {
    /// Use `store` instead of the JSON file named by `servers_config_path`.
    pub fn store(mut self, store: Arc<dyn ServerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `issuer` instead of running the configured issuer command.
    pub fn issuer(mut self, issuer: Arc<dyn CertificateIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Load the persisted server set and build the manager.
    ///
    /// A missing or unreadable server set is logged and treated as empty.
    /// Must be called inside a Tokio runtime.
    #[tracing::instrument(skip(self), fields(servers_config_path = ?self.config.servers_config_path))]
    pub async fn build(self) -> Result<ServerManager> {
        let ManagerConfig {
            server,
            servers_config_path,
            supervisor,
            certificates,
            ..
        } = self.config;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(JsonFileStore::new(servers_config_path)));
        let issuer = self.issuer.unwrap_or_else(|| {
            Arc::new(CommandIssuer::new(
                supervisor.shell.clone(),
                certificates.issuer_command.clone(),
            ))
        });

        let snapshot = match store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::info!("No saved server set, starting empty");
                Snapshot::default()
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load server set, starting empty");
                Snapshot::default()
            }
        };

        let state = RegistryState::restore(snapshot, &server);
        tracing::info!(
            servers = state.servers.len(),
            next_id = state.next_id,
            "Loaded server set"
        );

        let lifecycle = Arc::new(ServerLifecycleManager::new());
        let stop_timeout = supervisor.stop_timeout();

        Ok(ServerManager {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                launcher: ProcessLauncher::new(supervisor),
                certificates: CertificateCoordinator::new(
                    issuer,
                    &certificates,
                    Arc::clone(&lifecycle),
                ),
                lifecycle,
                saves: SaveQueue::spawn(store),
                stop_timeout,
            }),
        })
    }
}

/// Registry and supervisor of PHP server processes.
///
/// Cheap to clone; all clones share the same registry. Operations on one
/// server are serialized, operations on different servers run concurrently.
/// All public methods are instrumented with `tracing` spans.
#[derive(Clone)]
pub struct ServerManager {
    shared: Arc<Shared>,
}

impl ServerManager {
    /// Start building a manager from `config`.
    pub fn builder(config: ManagerConfig) -> ServerManagerBuilder {
        ServerManagerBuilder {
            config,
            store: None,
            issuer: None,
        }
    }

    /// Register a new server definition. It starts out stopped.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip_all, fields(name = %spec.name))]
    pub fn create(&self, spec: ServerSpec) -> Result<ServerId> {
        let mut state = self.shared.lock_state()?;

        let id = ServerId::from_counter(state.next_id);
        state.next_id += 1;
        state.servers.insert(
            id.clone(),
            ServerEntry::new(ServerDefinition {
                id: id.clone(),
                spec: spec.normalized(),
                running: false,
            }),
        );
        self.shared.queue_save(&state);

        tracing::info!(server = %id, "Server created");
        Ok(id)
    }

    /// Replace the desired configuration of a server.
    ///
    /// A running server is stopped first and stays stopped. If it cannot be
    /// stopped the definition is left untouched.
    pub async fn update(&self, id: &ServerId, spec: ServerSpec) -> Result<()> {
        self.update_with(id, |_| Ok(spec)).await
    }

    /// Derive the new configuration of a server from its current one.
    ///
    /// `patch` runs while the server's operations are serialized, so it always
    /// sees the configuration left by the previous operation. An error from
    /// `patch` leaves the server untouched and running if it was.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip_all, fields(server = %id))]
    pub async fn update_with<F>(&self, id: &ServerId, patch: F) -> Result<()>
    where
        F: FnOnce(&ServerSpec) -> Result<ServerSpec>,
    {
        let gate = self.gate(id)?;
        let _turn = gate.lock().await;

        let current = {
            let state = self.shared.lock_state()?;
            state.entry(id)?.definition.spec.clone()
        };
        let spec = patch(&current)?;

        self.stop_locked(id).await?;

        let mut state = self.shared.lock_state()?;
        let entry = state.entry_mut(id)?;
        entry.definition.spec = spec.normalized();
        self.shared.queue_save(&state);

        tracing::info!("Server updated");
        Ok(())
    }

    /// Remove a server definition, stopping it first if it is running.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip_all, fields(server = %id))]
    pub async fn delete(&self, id: &ServerId) -> Result<()> {
        let gate = self.gate(id)?;
        let _turn = gate.lock().await;

        self.stop_locked(id).await?;

        {
            let mut state = self.shared.lock_state()?;
            state
                .servers
                .remove(id)
                .ok_or_else(|| Error::ServerNotFound(id.to_string()))?;
            self.shared.queue_save(&state);
        }

        if let Err(e) = self.shared.lifecycle.forget_server(id) {
            tracing::warn!(error = %e, "Failed to drop event history");
        }

        tracing::info!("Server deleted");
        Ok(())
    }

    /// All definitions, ordered by ID.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<ServerDefinition>> {
        let state = self.shared.lock_state()?;
        let mut definitions: Vec<ServerDefinition> = state
            .servers
            .values()
            .map(|entry| entry.definition.clone())
            .collect();
        drop(state);

        definitions.sort_by(|a, b| {
            a.id.counter_value()
                .cmp(&b.id.counter_value())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(definitions)
    }

    /// One definition.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip_all, fields(server = %id))]
    pub fn get(&self, id: &ServerId) -> Result<ServerDefinition> {
        let state = self.shared.lock_state()?;
        Ok(state.entry(id)?.definition.clone())
    }

    /// Current status of a server.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip_all, fields(server = %id))]
    pub fn status(&self, id: &ServerId) -> Result<ServerStatus> {
        let state = self.shared.lock_state()?;
        Ok(state.entry(id)?.status)
    }

    /// Whether a live process exists for the server.
    pub fn is_running(&self, id: &ServerId) -> Result<bool> {
        let state = self.shared.lock_state()?;
        Ok(state.entry(id)?.definition.running)
    }

    /// Details of the live process, or `None` when the server is stopped.
    pub fn process_info(&self, id: &ServerId) -> Result<Option<ProcessInfo>> {
        let state = self.shared.lock_state()?;
        Ok(state
            .entry(id)?
            .process
            .as_ref()
            .map(|live| live.handle.info()))
    }

    /// Recent lifecycle events of a server, newest first.
    pub fn events(&self, id: &ServerId, limit: Option<usize>) -> Result<Vec<ServerEvent>> {
        self.shared.lock_state()?.entry(id)?;
        self.shared.lifecycle.get_server_events(id, limit)
    }

    /// Launch the server's process group.
    ///
    /// Fails with [`Error::AlreadyRunning`] when a live process exists and
    /// with [`Error::Spawn`] when the process cannot be created.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip_all, fields(server = %id))]
    pub async fn start(&self, id: &ServerId) -> Result<()> {
        let gate = self.gate(id)?;
        let _turn = gate.lock().await;

        let spec = {
            let mut state = self.shared.lock_state()?;
            let entry = state.entry_mut(id)?;
            if entry.process.is_some() {
                tracing::debug!("Server already running");
                return Err(Error::AlreadyRunning(id.to_string()));
            }
            entry.status = ServerStatus::Starting;
            entry.definition.spec.clone()
        };

        tracing::info!("Starting server");
        let SpawnedProcess {
            handle,
            child,
            exit_tx,
        } = match self.shared.launcher.spawn(&spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start server process");
                if let Ok(mut state) = self.shared.lock_state() {
                    if let Ok(entry) = state.entry_mut(id) {
                        entry.status = ServerStatus::Stopped;
                    }
                }
                self.shared
                    .lifecycle
                    .record(id, ServerLifecycleEvent::Failed, Some(e.to_string()));
                return Err(e);
            }
        };

        let generation = handle.generation();
        let info = handle.info();

        let attached = self.shared.lock_state().and_then(|mut state| {
            state.entry_mut(id).map(|entry| {
                entry.attach(LiveProcess {
                    handle: handle.clone(),
                    certificate: None,
                })
            })
        });

        let registry = Arc::downgrade(&self.shared);
        let server = id.clone();
        reaper::spawn_reaper(id.clone(), child, exit_tx, move |exit| {
            if let Some(shared) = registry.upgrade() {
                shared.reap(&server, generation, exit);
            }
        });

        if let Err(e) = attached {
            tracing::error!(error = %e, "Failed to record started process, killing it");
            if let Err(kill_error) = handle.kill_group() {
                tracing::error!(error = %kill_error, "Failed to kill unrecorded process group");
            }
            return Err(e);
        }

        tracing::info!(pgid = info.pgid, command = %info.command_line, "Server started");
        self.shared.lifecycle.record(
            id,
            ServerLifecycleEvent::Started,
            Some(format!("pgid {}: {}", info.pgid, info.command_line)),
        );

        if let Some(task) = self.shared.certificates.launch(id, &spec.certificates) {
            match self.shared.lock_state() {
                Ok(mut state) => match state.servers.get_mut(id) {
                    Some(entry) if entry.holds(generation) => {
                        if let Some(live) = entry.process.as_mut() {
                            live.certificate = Some(task);
                        }
                    }
                    _ => tracing::debug!("Server exited before certificate management began"),
                },
                Err(e) => tracing::error!(error = %e, "Failed to attach certificate task"),
            }
        }

        Ok(())
    }

    /// Kill the server's process group and wait for it to be reaped.
    ///
    /// Stopping a server that is not running succeeds without doing anything.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip_all, fields(server = %id))]
    pub async fn stop(&self, id: &ServerId) -> Result<()> {
        let gate = self.gate(id)?;
        let _turn = gate.lock().await;
        self.stop_locked(id).await
    }

    /// Stop body; the caller holds the server's gate.
    async fn stop_locked(&self, id: &ServerId) -> Result<()> {
        let handle = {
            let mut state = self.shared.lock_state()?;
            let entry = state.entry_mut(id)?;
            match entry.process.as_ref() {
                Some(live) => {
                    let handle = live.handle.clone();
                    entry.status = ServerStatus::Stopping;
                    handle
                }
                None => {
                    tracing::debug!("Server not running");
                    return Ok(());
                }
            }
        };

        tracing::info!(pgid = handle.info().pgid, "Stopping server");
        if let Err(e) = handle.kill_group() {
            tracing::error!(error = %e, "Failed to stop server");
            if let Ok(mut state) = self.shared.lock_state() {
                if let Some(entry) = state.servers.get_mut(id) {
                    if entry.holds(handle.generation()) {
                        entry.status = ServerStatus::Running;
                    }
                }
            }
            return Err(e);
        }

        match handle.wait_exited(self.shared.stop_timeout).await {
            Some(exit) => tracing::debug!(%exit, "Process group terminated"),
            None => tracing::warn!(
                timeout = ?self.shared.stop_timeout,
                "Process was not reaped within the stop timeout"
            ),
        }

        let released = {
            let mut state = self.shared.lock_state()?;
            let entry = state.entry_mut(id)?;
            if entry.holds(handle.generation()) {
                entry.detach()
            } else {
                None
            }
        };
        if let Some(live) = released {
            live.release();
        }

        self.shared
            .lifecycle
            .record(id, ServerLifecycleEvent::Stopped, None);
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Bind address of the management API.
    pub fn settings(&self) -> Result<ManagerSettings> {
        Ok(self.shared.lock_state()?.settings.clone())
    }

    /// Change the API bind address used from the next startup on.
    ///
    /// Empty values fall back to `localhost` and `8080`.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub fn update_settings(&self, host: &str, port: &str) -> Result<ManagerSettings> {
        let mut state = self.shared.lock_state()?;
        state.settings = ManagerSettings::normalized(host, port);
        self.shared.queue_save(&state);

        tracing::info!(host = %state.settings.host, port = %state.settings.port, "Settings updated");
        Ok(state.settings.clone())
    }

    /// Stop every running server and write the server set one last time.
    ///
    /// Failures are logged; shutdown always runs to completion.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down server manager");

        let running: Vec<ServerId> = match self.shared.lock_state() {
            Ok(state) => state
                .servers
                .iter()
                .filter(|(_, entry)| entry.process.is_some())
                .map(|(id, _)| id.clone())
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to list running servers");
                Vec::new()
            }
        };

        for id in running {
            match self.stop(&id).await {
                Ok(()) | Err(Error::ServerNotFound(_)) => {}
                Err(e) => tracing::error!(server = %id, error = %e, "Failed to stop server"),
            }
        }

        let snapshot = match self.shared.lock_state() {
            Ok(state) => state.snapshot(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to snapshot server set");
                return;
            }
        };
        if let Err(e) = self.shared.saves.flush(snapshot).await {
            tracing::error!(error = %e, "Failed to save server set");
        }

        tracing::info!("Server manager shut down");
    }

    fn gate(&self, id: &ServerId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let state = self.shared.lock_state()?;
        Ok(Arc::clone(&state.entry(id)?.gate))
    }
}
