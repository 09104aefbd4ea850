use php_server_manager::config::{AuthConfig, BearerAuthConfig, ManagerConfig};
use php_server_manager::persistence::MemoryStore;
use php_server_manager::{ApiServer, ServerManager};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn get(addr: std::net::SocketAddr, path: &str, token: Option<&str>) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let auth = token
        .map(|token| format!("Authorization: Bearer {}\r\n", token))
        .unwrap_or_default();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\n{}Connection: close\r\n\r\n",
        path, auth
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_api_server_serves_and_shuts_down() {
    let manager = ServerManager::builder(ManagerConfig::default())
        .store(Arc::new(MemoryStore::new()))
        .build()
        .await
        .unwrap();

    let api = ApiServer::new("127.0.0.1", 0)
        .workers(1)
        .auth(AuthConfig {
            bearer: Some(BearerAuthConfig {
                token: "s3cret".to_string(),
            }),
        })
        .start(manager.clone())
        .unwrap();
    let addr = api.local_addrs()[0];

    let denied = get(addr, "/api/servers", None).await;
    assert!(denied.starts_with("HTTP/1.1 401"));

    let allowed = get(addr, "/api/settings", Some("s3cret")).await;
    assert!(allowed.starts_with("HTTP/1.1 200"));
    assert!(allowed.contains("\"port\":\"8080\""));

    api.shutdown().await;
    manager.shutdown().await;
}
