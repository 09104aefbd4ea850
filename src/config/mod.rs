//! Configuration module for the server manager.
//!
//! This module handles parsing and validation of the manager's YAML
//! configuration, and the boundary checks applied to server definitions
//! before they reach the supervisor.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use php_server_manager::config::{ManagerConfig, validate_config};
//!
//! let config = ManagerConfig::from_file("/etc/phpservermanager/config.yaml").unwrap();
//! validate_config(&config).unwrap();
//! println!("API will listen on {}:{}", config.server.host, config.server.port);
//! ```
mod parser;
pub mod validator;

pub use parser::{
    ApiServerConfig, AuthConfig, BearerAuthConfig, CertificateConfig, DEFAULT_COMMAND,
    DEFAULT_ISSUER_COMMAND, DEFAULT_WORKERS, ManagerConfig, SupervisorConfig, default_config_dir,
    default_config_path,
};
pub use validator::{validate_config, validate_host, validate_server_spec};
