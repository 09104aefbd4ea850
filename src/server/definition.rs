use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of a server definition.
///
/// Assigned by the registry from a monotonically increasing counter and never
/// reused. Callers may build one from a path segment to address a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub(crate) fn from_counter(value: u64) -> Self {
        Self(value.to_string())
    }

    /// The ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the ID, if it was produced by the counter.
    pub fn counter_value(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ServerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Certificate lifecycle settings of one server.
///
/// Field names on the wire match the persisted `acme_*` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSettings {
    /// Whether certificates are managed for this server.
    #[serde(rename = "acme_enabled", default)]
    pub enabled: bool,
    /// Contact email for the ACME account.
    #[serde(rename = "acme_cert_email", default)]
    pub email: String,
    /// Domains to obtain certificates for.
    #[serde(rename = "acme_domains", default, deserialize_with = "null_as_default")]
    pub domains: Vec<String>,
    /// Per-server storage directory. Empty selects `<storage_root>/<id>`.
    #[serde(rename = "acme_storage_path", default)]
    pub storage_path: String,
}

/// Reads a `null` field as the type's default value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl CertificateSettings {
    /// True when a certificate task should run alongside the process.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.domains.is_empty()
    }
}

/// Desired configuration of a server, without its identity.
///
/// This is what callers pass to create and update a definition.
///
/// # Examples
///
/// ```
/// use php_server_manager::server::ServerSpec;
///
/// let spec = ServerSpec::new("blog", "", "8000", "/srv/blog")
///     .with_command("php -S {listen_addr} -t {directory}");
/// assert_eq!(spec.port, "8000");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Display label.
    pub name: String,
    /// Bind host; empty is stored as `localhost`.
    #[serde(default)]
    pub host: String,
    /// Decimal port, kept as the operator typed it.
    pub port: String,
    /// Document root handed to the command.
    pub directory: String,
    /// Optional command template; empty selects the default command.
    #[serde(default)]
    pub command: String,
    /// Certificate lifecycle settings.
    #[serde(flatten)]
    pub certificates: CertificateSettings,
}

impl ServerSpec {
    /// Builds a spec without a custom command or certificate management.
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: port.into(),
            directory: directory.into(),
            command: String::new(),
            certificates: CertificateSettings::default(),
        }
    }

    /// Sets the custom command template.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Sets the certificate settings.
    pub fn with_certificates(mut self, certificates: CertificateSettings) -> Self {
        self.certificates = certificates;
        self
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.host.trim().is_empty() {
            self.host = "localhost".to_string();
        }
        self
    }
}

/// A server definition as held by the registry.
///
/// `running` mirrors whether the registry holds a live process handle for
/// `id`; the registry changes both together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDefinition {
    /// Registry-assigned identifier.
    pub id: ServerId,
    /// Desired configuration.
    #[serde(flatten)]
    pub spec: ServerSpec,
    /// True iff a live process exists for this server.
    #[serde(default)]
    pub running: bool,
}
