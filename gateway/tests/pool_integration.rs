//! Exercises `gateway-pool`/`gateway-lsp` end to end against a real child
//! process, not a mock: a `sh -c` one-liner that plays back a canned,
//! `Content-Length`-framed `initialize` response and then either idles or
//! exits, standing in for a language server too heavy to vendor into a test
//! suite. Covers the handshake happy path and the crash/restart cycle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gateway_lsp::client::LanguageServerConfig;
use gateway_pool::{ConfigResolver, HealthStatus, Pool, PoolConfig, UriLanguageResolver};

struct FixedResolver(LanguageServerConfig);

impl ConfigResolver for FixedResolver {
    fn resolve(&self, _language: &str, _workspace: &Path) -> Option<LanguageServerConfig> {
        Some(self.0.clone())
    }
}

struct AnyUriIsFake;

impl UriLanguageResolver for AnyUriIsFake {
    fn language_for_uri(&self, _uri: &str) -> Option<String> {
        Some("fake".to_string())
    }
}

/// Writes a `Content-Length`-framed `initialize` response (id 1, the first
/// and only request a freshly started `Client` sends before `initialized`)
/// to `path`. `result` is deserialized directly as `ServerCapabilities`, so
/// an empty object is the canned "no capabilities" reply.
fn write_initialize_response(path: &Path) {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {}
    })
    .to_string();
    let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
    std::fs::write(path, framed).unwrap();
}

fn fake_server_config(script: String) -> LanguageServerConfig {
    LanguageServerConfig {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script],
        environment: Vec::new(),
        initialization_options: None,
        request_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn handshake_happy_path_reaches_initialized_and_reuses_the_connection() {
    let workspace = tempfile::tempdir().unwrap();
    let responses = tempfile::tempdir().unwrap();
    let response_path = responses.path().join("initialize.bin");
    write_initialize_response(&response_path);

    let script = format!("cat '{}'; sleep 30", response_path.display());
    let pool = Pool::new(
        Arc::new(FixedResolver(fake_server_config(script))),
        Arc::new(AnyUriIsFake),
        PoolConfig {
            health_check_interval: Duration::from_secs(60),
            start_timeout: Duration::from_secs(5),
            ..PoolConfig::default()
        },
    );

    let client = pool
        .get("fake", workspace.path())
        .await
        .expect("handshake against the fake server should succeed");
    assert!(client.is_connected());
    assert!(client.capabilities().is_some());

    let reused = pool
        .get("fake", workspace.path())
        .await
        .expect("second get should reuse the coalesced entry");
    assert!(Arc::ptr_eq(&client, &reused));

    pool.dispose_all().await;
}

#[tokio::test]
async fn a_server_that_keeps_crashing_is_restarted_then_marked_unhealthy() {
    let workspace = tempfile::tempdir().unwrap();
    let responses = tempfile::tempdir().unwrap();
    let response_path = responses.path().join("initialize.bin");
    write_initialize_response(&response_path);

    // Answers initialize, then exits nonzero shortly after - the health
    // loop's next poll finds the client disconnected and restarts it.
    let script = format!("cat '{}'; sleep 0.2; exit 7", response_path.display());
    let pool = Pool::new(
        Arc::new(FixedResolver(fake_server_config(script))),
        Arc::new(AnyUriIsFake),
        PoolConfig {
            health_check_interval: Duration::from_millis(50),
            start_timeout: Duration::from_secs(5),
            max_restarts: 2,
            restart_window: Duration::from_secs(60),
            ..PoolConfig::default()
        },
    );

    pool.get("fake", workspace.path())
        .await
        .expect("initial handshake should succeed before the server crashes");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let health = pool.get_health();
        let status = health.values().next().map(|record| record.status);
        if status == Some(HealthStatus::Unhealthy) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "pool never marked the repeatedly crashing entry unhealthy"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let health = pool.get_health();
    let record = health.values().next().unwrap();
    assert_eq!(record.crash_count, 2);
    assert!(matches!(
        pool.get("fake", workspace.path()).await,
        Err(gateway_pool::PoolError::Exhausted { .. })
    ));

    pool.dispose_all().await;
}
