use mimic_server::{AppConfig, build_app};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

async fn start_server(cfg: AppConfig) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(&cfg).await.expect("build app");

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

#[tokio::test]
async fn server_endpoints_work() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    // GET /healthz
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // Caller-supplied request id is echoed back
    let resp = client
        .get(format!("{base}/healthz"))
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "req-123");

    // Malformed JSON body -> 400
    let resp = client
        .post(format!("{base}/rest/user"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "bad_request");

    // Missing field -> 400
    let resp = client
        .post(format!("{base}/rest/admissions"))
        .json(&json!({"subject_id": 1, "hadm_id": 1001, "admission_location": "EMERGENCY ROOM ADMIT"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "missing_field");
    assert!(body["message"].as_str().unwrap().contains("admittime"));

    // Bad timestamp -> 400
    let resp = client
        .post(format!("{base}/rest/user"))
        .json(&json!({"subject_id": 1, "gender": "M", "dob": "last tuesday"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "type_mismatch");

    // Non-numeric path identifier -> 400
    let resp = client
        .delete(format!("{base}/rest/user/abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Malformed handle -> 400
    let resp = client
        .get(format!("{base}/results?job_id=job_1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown job -> 502
    let resp = client
        .get(format!("{base}/results?project_id=barbara2-451412&job_id=job_missing&location=US"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "warehouse_error");

    // Unknown route -> 404
    let resp = client.get(format!("{base}/rest/unknown")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
