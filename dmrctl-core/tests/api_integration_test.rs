// Интеграционные тесты для API сервера
//
// Эти тесты поднимают настоящий HTTP сервер на свободном порту и проверяют
// его через публичный интерфейс, как это делает веб-интерфейс станции.

use dmrctl_core::{
    api::{ApiServer, ApiServerHandle, ApiStateBuilder},
    probe::StaticProbe,
    store::ConfigStore,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

async fn start_server(config_path: &Path, running: bool) -> ApiServerHandle {
    let state = ApiStateBuilder::new(ConfigStore::new(config_path))
        .probe(Arc::new(StaticProbe::new(running)))
        .build();
    ApiServer::new("127.0.0.1:0".parse().unwrap(), state)
        .start()
        .await
        .expect("server starts")
}

fn url(handle: &ApiServerHandle, path: &str) -> String {
    format!("http://{}{}", handle.local_addr(), path)
}

fn config_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("config.ini")
}

#[tokio::test]
async fn test_api_server_start_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&config_path(&dir), false).await;
    assert_ne!(handle.local_addr().port(), 0);
    assert!(handle.shutdown().await.is_ok());
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let first = start_server(&config_path(&dir), false).await;

    let state = ApiStateBuilder::new(ConfigStore::new(config_path(&dir))).build();
    let result = ApiServer::new(first.local_addr(), state).start().await;
    let err = result.err().expect("second bind must fail");
    assert!(err.to_string().contains("Failed to bind API server"));

    first.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_status_defaults_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&config_path(&dir), false).await;

    let response = Client::new()
        .get(url(&handle, "/api/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value: Value = response.json().await.unwrap();
    assert_eq!(
        value,
        json!({
            "callsign": "N0CALL",
            "dmr_id": 1234567,
            "frequency": 438.8,
            "timeslot": 2,
            "color_code": 1,
            "services": { "dmr": "stopped" }
        })
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_status_reports_running_engine() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&config_path(&dir), true).await;

    let value: Value = Client::new()
        .get(url(&handle, "/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(value["services"]["dmr"], "running");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_config_update_then_status() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&config_path(&dir), false).await;
    let client = Client::new();

    let response = client
        .post(url(&handle, "/api/config"))
        .json(&json!({
            "callsign": "PD0ABC",
            "dmr_id": 2041234,
            "frequency": 430.4126,
            "timeslot": 2,
            "color_code": 1,
            "services": { "dmr": "running" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://127.0.0.1:8080"
    );
    let value: Value = response.json().await.unwrap();
    assert_eq!(value, json!({ "result": "ok" }));

    let status: Value = client
        .get(url(&handle, "/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["callsign"], "PD0ABC");
    assert_eq!(status["dmr_id"], 2041234);
    // частота хранится с тремя знаками после запятой
    assert_eq!(status["frequency"], 430.413);
    assert_eq!(status["services"]["dmr"], "stopped");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_config_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = config_path(&dir);
    std::fs::write(&path, "[dmr]\ncallsign=W1AW\n").unwrap();
    let handle = start_server(&path, false).await;

    let response = Client::new()
        .post(url(&handle, "/api/config"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "[dmr]\ncallsign=W1AW\n"
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wrong_method_on_config() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&config_path(&dir), false).await;
    let client = Client::new();

    let get = client.get(url(&handle, "/api/config")).send().await.unwrap();
    assert_eq!(get.status(), StatusCode::METHOD_NOT_ALLOWED);
    let delete = client
        .delete(url(&handle, "/api/config"))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(!config_path(&dir).exists());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reset_then_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = config_path(&dir);
    std::fs::write(&path, "[modem]\nport=/dev/ttyAMA0\n\n[dmr]\ncallsign=W1AW\ntimeslot=1\n").unwrap();
    let handle = start_server(&path, false).await;
    let client = Client::new();

    let response = client.post(url(&handle, "/api/reset")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value: Value = response.json().await.unwrap();
    assert_eq!(value["result"], "config reset to defaults");

    let backup = client.get(url(&handle, "/api/backup")).send().await.unwrap();
    assert_eq!(backup.status(), StatusCode::OK);
    let bytes = backup.bytes().await.unwrap();
    assert_eq!(&bytes[..], std::fs::read(&path).unwrap().as_slice());

    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("port=/dev/ttyAMA0"));
    assert!(text.contains("callsign=N0CALL"));
    assert!(text.contains("frequency=438.800"));
    assert!(text.contains("timeslot=2"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_backup_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&config_path(&dir), false).await;

    let response = Client::new()
        .get(url(&handle, "/api/backup"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    handle.shutdown().await.unwrap();
}
