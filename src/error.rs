/// Error handling module for the server manager.
///
/// This module defines the error types used throughout the library.
/// Every supervisor failure is returned to the caller as one of these values;
/// none of them is fatal to the supervisor process itself.
///
/// # Example
///
/// ```
/// use php_server_manager::error::{Error, Result};
///
/// fn describe(result: Result<()>) -> String {
///     match result {
///         Ok(_) => "ok".to_string(),
///         Err(Error::ServerNotFound(id)) => format!("no server with id {}", id),
///         Err(Error::AlreadyRunning(id)) => format!("server {} is already running", id),
///         Err(e) => format!("failed: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the php-server-manager library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or parse a configuration or data file.
    ///
    /// This error occurs when:
    /// - The YAML configuration is malformed
    /// - The persisted server set is not valid JSON
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration or a server definition contains invalid values.
    ///
    /// This error occurs when:
    /// - A port is not numeric
    /// - A host is not a valid address or hostname
    /// - Certificate management is enabled without an email or domains
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No server definition exists for the given ID.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// Start was requested for a server that already has a live process.
    #[error("Server {0} is already running")]
    AlreadyRunning(String),

    /// The operating system refused to create the server process.
    ///
    /// The server remains stopped.
    #[error("Failed to spawn server process: {0}")]
    Spawn(String),

    /// The termination signal could not be delivered to the process group.
    ///
    /// The server remains running; the operator must retry.
    #[error("Failed to signal server process group: {0}")]
    Signal(String),

    /// Certificate acquisition or renewal failed.
    ///
    /// Only ever logged; it never fails the owning start or stop call.
    #[error("Certificate management error: {0}")]
    Certificate(String),

    /// The server set could not be loaded or saved.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Unauthorized access to the HTTP API.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for php-server-manager operations.
pub type Result<T> = std::result::Result<T, Error>;
