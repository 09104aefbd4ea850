use actix_web::{App, http::StatusCode, test, web::Data};
use php_server_manager::ServerManager;
use php_server_manager::api::configure;
use php_server_manager::config::ManagerConfig;
use php_server_manager::persistence::MemoryStore;
use php_server_manager::server::ServerId;
use serde_json::{Value, json};
use std::sync::Arc;

async fn manager() -> ServerManager {
    ServerManager::builder(ManagerConfig::default())
        .store(Arc::new(MemoryStore::new()))
        .build()
        .await
        .unwrap()
}

macro_rules! app {
    ($manager:expr) => {
        test::init_service(
            App::new()
                .app_data(Data::new($manager.clone()))
                .configure(configure),
        )
        .await
    };
}

fn blog() -> Value {
    json!({
        "name": "blog",
        "port": "8000",
        "directory": "/srv/blog",
        "command": "exec sleep 30"
    })
}

#[actix_web::test]
async fn test_create_and_list_servers() {
    let manager = manager().await;
    let app = app!(manager);

    let req = test::TestRequest::post()
        .uri("/api/servers")
        .set_json(blog())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["id"], "1");
    assert_eq!(created["host"], "localhost");
    assert_eq!(created["running"], false);

    let req = test::TestRequest::get().uri("/api/servers").to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["name"], "blog");
}

#[actix_web::test]
async fn test_create_rejects_invalid_spec() {
    let manager = manager().await;
    let app = app!(manager);

    let req = test::TestRequest::post()
        .uri("/api/servers")
        .set_json(json!({"name": "blog", "port": "eighty", "directory": "/srv/blog"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 400);
    assert!(body["error"].as_str().unwrap().contains("Port must be a number"));

    let req = test::TestRequest::post()
        .uri("/api/servers")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{ not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(manager.list().unwrap().is_empty());
}

#[actix_web::test]
async fn test_unknown_server_is_404() {
    let manager = manager().await;
    let app = app!(manager);

    for req in [
        test::TestRequest::get().uri("/api/servers/9"),
        test::TestRequest::delete().uri("/api/servers/9"),
        test::TestRequest::post().uri("/api/servers/9/start"),
        test::TestRequest::post().uri("/api/servers/9/stop"),
        test::TestRequest::get().uri("/api/servers/9/status"),
        test::TestRequest::get().uri("/api/servers/9/events"),
    ] {
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

#[actix_web::test]
async fn test_start_status_stop() {
    let manager = manager().await;
    let app = app!(manager);
    let id = manager
        .create(serde_json::from_value(blog()).unwrap())
        .unwrap();
    let base = format!("/api/servers/{}", id);

    let req = test::TestRequest::post()
        .uri(&format!("{}/start", base))
        .to_request();
    let started: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(started["running"], true);
    assert_eq!(started["status"], "running");
    assert!(started["pgid"].as_i64().is_some());
    assert_eq!(started["command_line"], "exec sleep 30");

    let req = test::TestRequest::post()
        .uri(&format!("{}/start", base))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri(&format!("{}/stop", base))
        .to_request();
    let stopped: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stopped["running"], false);
    assert_eq!(stopped["status"], "stopped");

    let req = test::TestRequest::get()
        .uri(&format!("{}/events?limit=1", base))
        .to_request();
    let events: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(events.as_array().map(Vec::len), Some(1));
    assert_eq!(events[0]["event"], "stopped");
}

#[actix_web::test]
async fn test_update_keeps_certificates_and_stops_server() {
    let manager = manager().await;
    let app = app!(manager);

    let mut body = blog();
    body["acme_enabled"] = json!(false);
    body["acme_cert_email"] = json!("ops@example.com");
    body["acme_domains"] = json!(["blog.example.com"]);
    let req = test::TestRequest::post()
        .uri("/api/servers")
        .set_json(&body)
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    manager.start(&ServerId::from(id.as_str())).await.unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/api/servers/{}", id))
        .set_json(json!({"name": "renamed", "port": "8001", "directory": "/srv/blog"}))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["name"], "renamed");
    assert_eq!(updated["port"], "8001");
    assert_eq!(updated["running"], false);
    assert_eq!(updated["acme_cert_email"], "ops@example.com");
    assert_eq!(updated["acme_domains"][0], "blog.example.com");
    assert_eq!(updated["command"], "");
}

#[actix_web::test]
async fn test_concurrent_updates_keep_certificate_changes() {
    let manager = manager().await;
    let app = app!(manager);

    let mut body = blog();
    body["acme_cert_email"] = json!("old@example.com");
    let req = test::TestRequest::post()
        .uri("/api/servers")
        .set_json(&body)
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();
    let uri = format!("/api/servers/{}", id);

    manager.start(&ServerId::from(id.as_str())).await.unwrap();

    let mut email_change = blog();
    email_change["acme_cert_email"] = json!("new@example.com");
    let email_req = test::TestRequest::put().uri(&uri).set_json(&email_change).to_request();
    let rename_req = test::TestRequest::put()
        .uri(&uri)
        .set_json(json!({"name": "renamed", "port": "8000", "directory": "/srv/blog"}))
        .to_request();

    let (email_resp, rename_resp) = futures::join!(
        test::call_service(&app, email_req),
        test::call_service(&app, rename_req)
    );
    assert_eq!(email_resp.status(), StatusCode::OK);
    assert_eq!(rename_resp.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri(&uri).to_request();
    let current: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(current["acme_cert_email"], "new@example.com");
}

#[actix_web::test]
async fn test_invalid_update_leaves_server_running() {
    let manager = manager().await;
    let app = app!(manager);

    let req = test::TestRequest::post()
        .uri("/api/servers")
        .set_json(blog())
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = ServerId::from(created["id"].as_str().unwrap());
    manager.start(&id).await.unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/api/servers/{}", id))
        .set_json(json!({"name": "", "port": "8000", "directory": "/srv/blog"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(manager.is_running(&id).unwrap());
    assert_eq!(manager.get(&id).unwrap().spec.name, "blog");
    manager.stop(&id).await.unwrap();
}

#[actix_web::test]
async fn test_delete_server() {
    let manager = manager().await;
    let app = app!(manager);
    let id = manager
        .create(serde_json::from_value(blog()).unwrap())
        .unwrap();
    manager.start(&id).await.unwrap();

    let req = test::TestRequest::delete()
        .uri(&format!("/api/servers/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(manager.list().unwrap().is_empty());
}

#[actix_web::test]
async fn test_settings() {
    let manager = manager().await;
    let app = app!(manager);

    let req = test::TestRequest::get().uri("/api/settings").to_request();
    let settings: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(settings, json!({"host": "0.0.0.0", "port": "8080"}));

    let req = test::TestRequest::put()
        .uri("/api/settings")
        .set_json(json!({"host": "127.0.0.1", "port": "9000"}))
        .to_request();
    let settings: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(settings, json!({"host": "127.0.0.1", "port": "9000"}));

    let req = test::TestRequest::put()
        .uri("/api/settings")
        .set_json(json!({"host": "127.0.0.1", "port": "http"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(manager.settings().unwrap().port, "9000");
}
