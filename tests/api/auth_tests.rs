use actix_web::{App, http::StatusCode, test, web::Data};
use php_server_manager::ServerManager;
use php_server_manager::api::auth::Authentication;
use php_server_manager::api::configure;
use php_server_manager::config::{AuthConfig, BearerAuthConfig, ManagerConfig};
use php_server_manager::persistence::MemoryStore;
use std::sync::Arc;

async fn manager() -> ServerManager {
    ServerManager::builder(ManagerConfig::default())
        .store(Arc::new(MemoryStore::new()))
        .build()
        .await
        .unwrap()
}

fn bearer(token: &str) -> Arc<AuthConfig> {
    Arc::new(AuthConfig {
        bearer: Some(BearerAuthConfig {
            token: token.to_string(),
        }),
    })
}

#[actix_web::test]
async fn test_requests_need_the_token() {
    let app = test::init_service(
        App::new()
            .wrap(Authentication::new(bearer("s3cret")))
            .app_data(Data::new(manager().await))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/servers").to_request();
    let resp = test::try_call_service(&app, req).await;
    let status = match resp {
        Ok(resp) => resp.status(),
        Err(e) => e.as_response_error().status_code(),
    };
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/servers")
        .insert_header(("Authorization", "Bearer wrong"))
        .to_request();
    let status = match test::try_call_service(&app, req).await {
        Ok(resp) => resp.status(),
        Err(e) => e.as_response_error().status_code(),
    };
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/servers")
        .insert_header(("Authorization", "Bearer s3cret"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_no_token_configured_allows_everything() {
    let app = test::init_service(
        App::new()
            .wrap(Authentication::new(Arc::new(AuthConfig::default())))
            .app_data(Data::new(manager().await))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/settings").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
