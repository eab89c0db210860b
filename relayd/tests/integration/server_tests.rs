//! Embedded server lifecycle over real TCP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use relay_common::{MockScriptRunner, RelayConfig};
use relayd::RelayServer;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::common::init_test_logging;

fn ephemeral_config() -> RelayConfig {
    RelayConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..RelayConfig::default()
    }
}

async fn raw_request(addr: SocketAddr, request: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(request.as_bytes()).await.expect("write");
    let mut raw = Vec::new();
    // The server may reset the connection after an early reply; keep what arrived.
    let _ = stream.read_to_end(&mut raw).await;
    let response = String::from_utf8_lossy(&raw);

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

async fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    raw_request(
        addr,
        &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
    )
    .await
}

#[tokio::test]
async fn test_embedded_lifecycle() {
    init_test_logging();
    crate::test_log!("TEST START: test_embedded_lifecycle");

    let mut server = RelayServer::start(&ephemeral_config(), Arc::new(MockScriptRunner::new()))
        .await
        .expect("start relay");
    let status = server.status();
    crate::test_log!("relay status: {:?}", status);
    assert!(status.listening);
    assert!(!status.running);

    let (code, body) = get(server.local_addr(), "/health").await;
    assert_eq!(code, 200);
    let json: Value = serde_json::from_str(&body).expect("health body is JSON");
    assert_eq!(json["app"], "statnerd-relay");
    assert_eq!(json["port"], status.port);

    let (code, body) = get(server.local_addr(), "/missing").await;
    assert_eq!(code, 404);
    assert!(body.contains("Not found."));

    server.restart(&ephemeral_config()).await.expect("restart relay");
    assert!(server.status().listening);
    let (code, _) = get(server.local_addr(), "/health").await;
    assert_eq!(code, 200);

    server.stop().await;
    assert!(!server.status().listening);

    crate::test_log!("TEST PASS: test_embedded_lifecycle");
}

#[tokio::test]
async fn test_oversized_body_over_tcp() {
    init_test_logging();
    crate::test_log!("TEST START: test_oversized_body_over_tcp");

    let config = RelayConfig {
        max_body_bytes: 128,
        ..ephemeral_config()
    };
    let runner = MockScriptRunner::new();
    let mut server = RelayServer::start(&config, Arc::new(runner.clone()))
        .await
        .expect("start relay");

    let body = format!("{{\"repository\":\"{}\"}}", "a".repeat(512));
    let request = format!(
        "POST /v1/update HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let (code, body) = raw_request(server.local_addr(), &request).await;
    assert_eq!(code, 413);
    assert!(body.contains("Payload too large."));
    assert!(runner.calls().is_empty());

    server.stop().await;
    crate::test_log!("TEST PASS: test_oversized_body_over_tcp");
}

#[cfg(unix)]
#[tokio::test]
async fn test_client_disconnect_does_not_cancel_update() {
    use relay_common::ProcessRunner;
    use std::time::Duration;

    use crate::common::RelayRoot;

    init_test_logging();
    crate::test_log!("TEST START: test_client_disconnect_does_not_cancel_update");

    let root = RelayRoot::with_script("sleep 1\ntouch \"$cfg/data/marker\"");
    let mut server = RelayServer::start(
        &ephemeral_config(),
        Arc::new(ProcessRunner::new(4096)),
    )
    .await
    .expect("start relay");

    let body = serde_json::json!({
        "repository": "owner/repo",
        "localRootPath": root.path_str(),
    })
    .to_string();
    let mut stream = TcpStream::connect(server.local_addr()).await.expect("connect");
    stream
        .write_all(
            format!(
                "POST /v1/update HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
            .as_bytes(),
        )
        .await
        .expect("write");

    tokio::time::timeout(Duration::from_secs(5), async {
        while !server.status().running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("update should start");

    drop(stream);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.status().running, "disconnect must not stop the run");

    tokio::time::timeout(Duration::from_secs(10), async {
        while server.status().running {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("run should finish");
    assert!(root.path().join("config/data/marker").is_file());

    server.stop().await;
    crate::test_log!("TEST PASS: test_client_disconnect_does_not_cancel_update");
}
