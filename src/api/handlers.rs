//! HTTP request handlers of the management API.
//!
//! Routes, all under `/api`:
//! - `GET|POST /servers`
//! - `GET|PUT|DELETE /servers/{id}`
//! - `POST /servers/{id}/start`, `POST /servers/{id}/stop`
//! - `GET /servers/{id}/status`, `GET /servers/{id}/events`
//! - `GET|PUT /settings`

use crate::ServerManager;
use crate::api::actix_error::ApiError;
use crate::api::types::{EventResponse, EventsQuery, ServerRequest, SettingsRequest, StatusResponse};
use crate::config::validate_server_spec;
use crate::server::ServerId;

use actix_web::{
    HttpResponse,
    web::{self, Data, Json, Path, Query},
};

type HandlerResult = std::result::Result<HttpResponse, ApiError>;

/// Register the API routes on `cfg`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::InvalidRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::InvalidRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .route("/servers", web::get().to(list_servers))
            .route("/servers", web::post().to(create_server))
            .route("/servers/{id}", web::get().to(get_server))
            .route("/servers/{id}", web::put().to(update_server))
            .route("/servers/{id}", web::delete().to(delete_server))
            .route("/servers/{id}/start", web::post().to(start_server))
            .route("/servers/{id}/stop", web::post().to(stop_server))
            .route("/servers/{id}/status", web::get().to(server_status))
            .route("/servers/{id}/events", web::get().to(server_events))
            .route("/settings", web::get().to(get_settings))
            .route("/settings", web::put().to(update_settings)),
    );
}

fn status_of(manager: &ServerManager, id: ServerId) -> Result<StatusResponse, ApiError> {
    let status = manager.status(&id)?;
    let process = manager.process_info(&id)?;
    Ok(StatusResponse::new(id, status, process))
}

/// `GET /api/servers`
pub async fn list_servers(manager: Data<ServerManager>) -> HandlerResult {
    Ok(HttpResponse::Ok().json(manager.list()?))
}

/// `POST /api/servers`
pub async fn create_server(manager: Data<ServerManager>, body: Json<ServerRequest>) -> HandlerResult {
    let spec = body.into_inner().into_spec(None);
    validate_server_spec(&spec)?;

    let id = manager.create(spec)?;
    tracing::debug!(server = %id, "Created server through API");
    Ok(HttpResponse::Created().json(manager.get(&id)?))
}

/// `GET /api/servers/{id}`
pub async fn get_server(manager: Data<ServerManager>, path: Path<String>) -> HandlerResult {
    let id = ServerId::from(path.into_inner());
    Ok(HttpResponse::Ok().json(manager.get(&id)?))
}

/// `PUT /api/servers/{id}`
///
/// A running server is stopped and stays stopped.
pub async fn update_server(
    manager: Data<ServerManager>,
    path: Path<String>,
    body: Json<ServerRequest>,
) -> HandlerResult {
    let id = ServerId::from(path.into_inner());
    let request = body.into_inner();
    manager
        .update_with(&id, |current| {
            let spec = request.into_spec(Some(&current.certificates));
            validate_server_spec(&spec)?;
            Ok(spec)
        })
        .await?;
    Ok(HttpResponse::Ok().json(manager.get(&id)?))
}

/// `DELETE /api/servers/{id}`
pub async fn delete_server(manager: Data<ServerManager>, path: Path<String>) -> HandlerResult {
    let id = ServerId::from(path.into_inner());
    manager.delete(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// `POST /api/servers/{id}/start`
pub async fn start_server(manager: Data<ServerManager>, path: Path<String>) -> HandlerResult {
    let id = ServerId::from(path.into_inner());
    manager.start(&id).await?;
    Ok(HttpResponse::Ok().json(status_of(&manager, id)?))
}

/// `POST /api/servers/{id}/stop`
pub async fn stop_server(manager: Data<ServerManager>, path: Path<String>) -> HandlerResult {
    let id = ServerId::from(path.into_inner());
    manager.stop(&id).await?;
    Ok(HttpResponse::Ok().json(status_of(&manager, id)?))
}

/// `GET /api/servers/{id}/status`
pub async fn server_status(manager: Data<ServerManager>, path: Path<String>) -> HandlerResult {
    let id = ServerId::from(path.into_inner());
    Ok(HttpResponse::Ok().json(status_of(&manager, id)?))
}

/// `GET /api/servers/{id}/events?limit=n`
pub async fn server_events(
    manager: Data<ServerManager>,
    path: Path<String>,
    query: Query<EventsQuery>,
) -> HandlerResult {
    let id = ServerId::from(path.into_inner());
    let events: Vec<EventResponse> = manager
        .events(&id, query.limit)?
        .into_iter()
        .map(EventResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(events))
}

/// `GET /api/settings`
pub async fn get_settings(manager: Data<ServerManager>) -> HandlerResult {
    Ok(HttpResponse::Ok().json(manager.settings()?))
}

/// `PUT /api/settings`
///
/// Takes effect at the next startup.
pub async fn update_settings(
    manager: Data<ServerManager>,
    body: Json<SettingsRequest>,
) -> HandlerResult {
    let SettingsRequest { host, port } = body.into_inner();
    if !host.is_empty() && !crate::config::validate_host(&host) {
        return Err(ApiError::InvalidRequest("Invalid host format".to_string()));
    }
    if !port.is_empty() && port.parse::<u16>().is_err() {
        return Err(ApiError::InvalidRequest("Port must be a number".to_string()));
    }

    Ok(HttpResponse::Ok().json(manager.update_settings(&host, &port)?))
}
