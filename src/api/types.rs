//! Request and response bodies of the management API.

use crate::ManagerSettings;
use crate::server::{
    CertificateSettings, ProcessInfo, ServerEvent, ServerId, ServerLifecycleEvent, ServerSpec,
    ServerStatus,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Body of `POST /api/servers` and `PUT /api/servers/{id}`.
///
/// Certificate fields left out of an update keep their current values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerRequest {
    /// Display label
    pub name: String,
    /// Bind host
    #[serde(default)]
    pub host: String,
    /// Port
    pub port: String,
    /// Document root
    pub directory: String,
    /// Custom command template
    #[serde(default)]
    pub command: String,
    /// Enable certificate management
    pub acme_enabled: Option<bool>,
    /// ACME account email
    pub acme_cert_email: Option<String>,
    /// Certificate domains
    pub acme_domains: Option<Vec<String>>,
    /// Certificate storage directory
    pub acme_storage_path: Option<String>,
}

impl ServerRequest {
    /// Builds the spec this request describes on top of `current` certificate settings.
    pub fn into_spec(self, current: Option<&CertificateSettings>) -> ServerSpec {
        let current = current.cloned().unwrap_or_default();
        let certificates = CertificateSettings {
            enabled: self.acme_enabled.unwrap_or(current.enabled),
            email: self.acme_cert_email.unwrap_or(current.email),
            domains: self
                .acme_domains
                .map(|domains| {
                    domains
                        .into_iter()
                        .map(|domain| domain.trim().to_string())
                        .filter(|domain| !domain.is_empty())
                        .collect()
                })
                .unwrap_or(current.domains),
            storage_path: self.acme_storage_path.unwrap_or(current.storage_path),
        };

        ServerSpec::new(self.name, self.host, self.port, self.directory)
            .with_command(self.command)
            .with_certificates(certificates)
    }
}

/// Body of `GET /api/servers/{id}/status` and of start/stop responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    /// Server ID
    pub id: ServerId,
    /// Whether a live process exists
    pub running: bool,
    /// Fine-grained status
    pub status: ServerStatus,
    /// Process group of the live process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pgid: Option<i32>,
    /// Resolved command line of the live process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    /// Start time of the live process, in milliseconds since the epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
}

impl StatusResponse {
    /// Combine a status with the live process details, if any.
    pub fn new(id: ServerId, status: ServerStatus, process: Option<ProcessInfo>) -> Self {
        Self {
            id,
            running: status.is_running(),
            status,
            pgid: process.as_ref().map(|info| info.pgid),
            command_line: process.as_ref().map(|info| info.command_line.clone()),
            started_at: process.as_ref().map(|info| unix_millis(info.started_at)),
        }
    }
}

/// One lifecycle event as returned by `GET /api/servers/{id}/events`.
#[derive(Debug, Clone, Serialize)]
pub struct EventResponse {
    /// Event kind
    pub event: ServerLifecycleEvent,
    /// When it happened, in milliseconds since the epoch
    pub timestamp: u64,
    /// Free-form details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<ServerEvent> for EventResponse {
    fn from(event: ServerEvent) -> Self {
        Self {
            event: event.event,
            timestamp: unix_millis(event.timestamp),
            details: event.details,
        }
    }
}

/// Query string of the events endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    /// Maximum number of events
    pub limit: Option<usize>,
}

/// Body of `PUT /api/settings`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsRequest {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
}

/// Body of the settings endpoints.
pub type SettingsResponse = ManagerSettings;

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
