use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a minimal valid config rooted in `dir`
fn minimal_config(port: u16, dir: &Path) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {}

[database]
path = "{}"

[media]
uploads_dir = "{}"

[converter]
temp_dir = "{}"
"#,
        port,
        dir.join("flux.db").display(),
        dir.join("uploads").display(),
        dir.join("tmp").display(),
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_flux-media"))
        .arg("serve")
        .env("FLUX_MEDIA_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Run a CLI subcommand to completion
async fn run_command(config_path: &Path, args: &[&str]) -> std::process::Output {
    timeout(
        Duration::from_secs(30),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_flux-media"))
            .arg("--config")
            .arg(config_path)
            .args(args)
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&minimal_config(port, dir.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    server.kill().await.ok();
}

#[tokio::test]
async fn test_config_endpoint_returns_sanitized() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&minimal_config(port, dir.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/config", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["server"]["port"], port);
    assert_eq!(json["data"]["database_configured"], true);

    server.kill().await.ok();
}

#[tokio::test]
async fn test_status_reports_native_image_backend() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&minimal_config(port, dir.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 100).await,
        "Server did not start in time"
    );

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/status", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    // The in-process encoders are always there, whatever the host has installed.
    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["data"]["image"]["processor"]["available"], true);

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_flux-media"))
            .env("FLUX_MEDIA_CONFIG", "/nonexistent/config.toml")
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_invalid_config_exits_with_error() {
    let config = write_config(
        r#"
[server]
port = 0
"#,
    );

    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_flux-media"))
            .env("FLUX_MEDIA_CONFIG", config.path())
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_stats_command_on_empty_database() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&minimal_config(get_available_port(), dir.path()));

    let output = run_command(config.path(), &["stats"]).await;
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Failed to parse stats output");
    assert_eq!(json["total_conversions"], 0);
    assert_eq!(json["success_rate"], 0.0);
}

#[tokio::test]
async fn test_convert_all_with_empty_uploads() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
    let config = write_config(&minimal_config(get_available_port(), dir.path()));

    let output = run_command(config.path(), &["convert-all", "--batch-size", "10"]).await;
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Failed to parse bulk output");
    assert_eq!(json["queued"], 0);
    assert_eq!(json["processed"], 0);
}

#[tokio::test]
async fn test_clear_all_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&minimal_config(get_available_port(), dir.path()));

    let confirmed = run_command(config.path(), &["clear-all", "--yes"]).await;
    assert!(confirmed.status.success());
    let json: serde_json::Value =
        serde_json::from_slice(&confirmed.stdout).expect("Failed to parse clear output");
    assert_eq!(json["records_deleted"], 0);

    // stdin is empty, so the prompt reads no answer
    let declined = run_command(config.path(), &["clear-all"]).await;
    assert!(!declined.status.success());
}
