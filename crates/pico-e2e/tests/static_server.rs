//! Static file server tests

use std::fs;

use pico_e2e::server::{find_free_port, ServerConfig, ServerHandle};
use pico_e2e::E2eError;
use tempfile::TempDir;

fn site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("index.html"),
        "<!DOCTYPE html><html><head><title>Pico</title></head><body></body></html>",
    )
    .unwrap();
    fs::create_dir_all(tmp.path().join("static")).unwrap();
    fs::write(tmp.path().join("static/cms.js"), "const cms = {};").unwrap();
    fs::create_dir_all(tmp.path().join("about")).unwrap();
    fs::write(tmp.path().join("about/index.html"), "<title>About</title>").unwrap();
    tmp
}

fn any_port() -> ServerConfig {
    ServerConfig {
        port: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn serves_site_root_with_standard_semantics() {
    let root = site();
    let mut server = ServerHandle::start(root.path(), &any_port()).await.unwrap();
    assert!(server.is_running());
    assert!(server.base_url().ends_with('/'));
    assert_eq!(server.root(), root.path());

    let client = reqwest::Client::new();

    let index = client.get(server.base_url()).send().await.unwrap();
    assert_eq!(index.status(), 200);
    let content_type = index.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"), "{}", content_type);
    assert!(index.text().await.unwrap().contains("<title>Pico</title>"));

    let script = client
        .get(format!("{}static/cms.js", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(script.status(), 200);
    let content_type = script.headers()["content-type"].to_str().unwrap();
    assert!(content_type.contains("javascript"), "{}", content_type);

    let nested = client
        .get(format!("{}about/", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(nested.status(), 200);
    assert!(nested.text().await.unwrap().contains("About"));

    let missing = client
        .get(format!("{}nope.html", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    server.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent_and_closes_the_port() {
    let root = site();
    let mut server = ServerHandle::start(root.path(), &any_port()).await.unwrap();
    let url = server.base_url().to_string();

    server.stop().await;
    server.stop().await;
    assert!(!server.is_running());

    let after = reqwest::Client::new().get(&url).send().await;
    assert!(after.is_err(), "server still answering after stop");
}

#[tokio::test]
async fn serves_on_the_configured_port() {
    let root = site();
    let port = find_free_port().unwrap();
    let config = ServerConfig {
        port,
        ..Default::default()
    };

    let mut server = ServerHandle::start(root.path(), &config).await.unwrap();
    assert_eq!(server.addr().port(), port);
    assert_eq!(server.base_url(), format!("http://127.0.0.1:{}/", port));

    server.stop().await;
}

#[tokio::test]
async fn repeated_requests_are_stable() {
    let root = site();
    let mut server = ServerHandle::start(root.path(), &any_port()).await.unwrap();
    let client = reqwest::Client::new();

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let resp = client.get(server.base_url()).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        bodies.push(resp.text().await.unwrap());
    }
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));

    server.stop().await;
}

#[tokio::test]
async fn refuses_empty_build_output() {
    let empty = TempDir::new().unwrap();
    let err = match ServerHandle::start(empty.path(), &any_port()).await {
        Ok(_) => panic!("server started against an empty directory"),
        Err(e) => e,
    };
    assert!(matches!(err, E2eError::ServerStartup(_)), "got {:?}", err);
    assert!(err.is_fatal());
}

#[tokio::test]
async fn port_in_use_is_startup_error() {
    let root = site();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = ServerConfig {
        port: taken.local_addr().unwrap().port(),
        ..Default::default()
    };

    let err = match ServerHandle::start(root.path(), &config).await {
        Ok(_) => panic!("bound a port that was already taken"),
        Err(e) => e,
    };
    assert!(matches!(err, E2eError::ServerStartup(_)), "got {:?}", err);
}

#[tokio::test]
async fn site_without_index_never_becomes_ready() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("style.css"), "body {}").unwrap();
    let config = ServerConfig {
        port: 0,
        ready_timeout_ms: 300,
        ..Default::default()
    };

    let err = match ServerHandle::start(root.path(), &config).await {
        Ok(_) => panic!("root without index reported ready"),
        Err(e) => e,
    };
    assert!(matches!(err, E2eError::ServerHealthCheck(_)), "got {:?}", err);
}
