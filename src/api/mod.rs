//! HTTP management API built on Actix Web.
//!
//! The API exposes the [`ServerManager`](crate::ServerManager) registry as
//! JSON resources under `/api`. CORS is open to any origin; when a bearer
//! token is configured every request except CORS preflight must carry it.
//!
//! ```no_run
//! use php_server_manager::{ApiServer, ManagerConfig, ServerManager};
//!
//! # async fn run() -> php_server_manager::Result<()> {
//! let config = ManagerConfig::default();
//! let manager = ServerManager::builder(config.clone()).build().await?;
//! let api = ApiServer::new("127.0.0.1", 8080)
//!     .auth(config.auth.clone())
//!     .start(manager.clone())?;
//!
//! tokio::signal::ctrl_c().await.ok();
//! api.shutdown().await;
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub use self::handlers::configure;
pub use self::http::{ApiHandle, ApiServer};

pub mod actix_error;
pub mod auth;
pub mod handlers;
pub mod http;
pub mod types;
