//! The actix-web server hosting the management API.

use crate::ServerManager;
use crate::api::auth::Authentication;
use crate::api::handlers;
use crate::config::{AuthConfig, DEFAULT_WORKERS};
use crate::error::{Error, Result};

use actix_cors::Cors;
use actix_web::{App, HttpServer, dev::ServerHandle, middleware, web::Data};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Where and how the API listens.
#[derive(Debug, Clone)]
pub struct ApiServer {
    host: String,
    port: u16,
    workers: usize,
    auth: Arc<AuthConfig>,
}

impl ApiServer {
    /// Create an API server bound to `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            workers: DEFAULT_WORKERS,
            auth: Arc::new(AuthConfig::default()),
        }
    }

    /// Number of actix workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Authentication applied to every route
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    /// Bind and start serving the API for `manager`.
    ///
    /// Must be called inside a Tokio runtime.
    #[tracing::instrument(skip(self, manager), fields(host = %self.host, port = self.port))]
    pub fn start(self, manager: ServerManager) -> Result<ApiHandle> {
        let manager = Data::new(manager);
        let auth = self.auth;

        if auth.bearer.is_none() {
            tracing::warn!("Management API has no authentication configured");
        }

        let server = HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(Authentication::new(auth.clone()))
                .wrap(cors)
                .wrap(middleware::Logger::default())
                .app_data(manager.clone())
                .configure(handlers::configure)
        })
        .workers(self.workers)
        .disable_signals()
        .bind((self.host.as_str(), self.port))
        .map_err(|e| {
            Error::Other(format!(
                "Failed to bind API to {}:{}: {}",
                self.host, self.port, e
            ))
        })?;

        let addrs = server.addrs();
        let server = server.run();
        let handle = server.handle();

        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Management API server error");
            }
        });

        tracing::info!(addresses = ?addrs, workers = self.workers, "Management API listening");
        Ok(ApiHandle {
            server: handle,
            task,
            addrs,
        })
    }
}

/// Handle of a running API server.
pub struct ApiHandle {
    server: ServerHandle,
    task: JoinHandle<()>,
    addrs: Vec<SocketAddr>,
}

impl ApiHandle {
    /// Addresses the API is bound to
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(self) {
        self.server.stop(true).await;

        match tokio::time::timeout(Duration::from_secs(5), self.task).await {
            Ok(Err(e)) => tracing::warn!(error = %e, "Error while joining API server task"),
            Err(_) => tracing::warn!("Timeout waiting for API server to finish"),
            Ok(Ok(())) => {}
        }
        tracing::info!("Management API stopped");
    }
}
