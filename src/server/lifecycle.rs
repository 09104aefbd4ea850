use crate::error::{Error, Result};
use crate::server::ServerId;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::SystemTime;

/// Maximum number of events kept across all servers.
const MAX_EVENTS: usize = 1000;

/// Server lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerLifecycleEvent {
    /// Process spawned
    Started,
    /// Process killed by an explicit stop
    Stopped,
    /// Process exited on its own
    Exited,
    /// Process could not be spawned
    Failed,
    /// Certificate acquisition or renewal failed
    CertificateFailed,
}

/// Server lifecycle event
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    /// Server ID
    pub id: ServerId,
    /// Event type
    pub event: ServerLifecycleEvent,
    /// Event timestamp
    pub timestamp: SystemTime,
    /// Event details
    pub details: Option<String>,
}

/// Bounded history of process lifecycle events.
pub struct ServerLifecycleManager {
    events: Mutex<VecDeque<ServerEvent>>,
}

impl ServerLifecycleManager {
    /// Create a new server lifecycle manager
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a server event
    pub fn record_event(
        &self,
        id: &ServerId,
        event: ServerLifecycleEvent,
        details: Option<String>,
    ) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        events.push_back(ServerEvent {
            id: id.clone(),
            event,
            timestamp: SystemTime::now(),
            details,
        });

        while events.len() > MAX_EVENTS {
            events.pop_front();
        }

        Ok(())
    }

    /// Record an event, logging instead of failing if the history is unavailable.
    pub(crate) fn record(&self, id: &ServerId, event: ServerLifecycleEvent, details: Option<String>) {
        if let Err(e) = self.record_event(id, event, details) {
            tracing::warn!(server = %id, error = %e, "Failed to record lifecycle event");
        }
    }

    /// Get recent events for a server, newest first
    pub fn get_server_events(&self, id: &ServerId, limit: Option<usize>) -> Result<Vec<ServerEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        let server_events = events
            .iter()
            .rev()
            .filter(|e| &e.id == id)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(server_events)
    }

    /// Drop the history of one server
    pub fn forget_server(&self, id: &ServerId) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        events.retain(|e| &e.id != id);

        Ok(())
    }
}

impl Default for ServerLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
