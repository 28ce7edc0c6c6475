use std::sync::Arc;
use std::time::Duration;

use mimic_db_memory::{InMemoryWarehouse, MemoryOptions};
use mimic_server::{AppConfig, build_app_with_warehouse};
use mimic_warehouse::{
    JobResult, QueryRequest, ResultSet, ScalarValue, Statement, TableRef, WarehouseClient,
    parse_timestamp,
};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

struct TestServer {
    base: String,
    warehouse: Arc<InMemoryWarehouse>,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }

    /// Reads a table straight from the engine, bypassing the HTTP surface.
    async fn table(&self, name: &'static str) -> ResultSet {
        let request = QueryRequest::new(
            Statement::select(TableRef::new("barbara2-451412", "MIMIC", name)),
            vec![],
            "US",
        );
        let handle = self.warehouse.query(&request).await.unwrap();
        match self
            .warehouse
            .job_result(&handle, Duration::from_secs(5))
            .await
            .unwrap()
        {
            JobResult::Rows(rows) => rows,
            JobResult::Pending => panic!("select on {name} did not finish"),
        }
    }
}

async fn start_server(cfg: AppConfig) -> TestServer {
    let warehouse = Arc::new(InMemoryWarehouse::with_options(MemoryOptions {
        project_id: cfg.warehouse.project_id.clone(),
        location: cfg.warehouse.location.clone(),
        execution_delay: Duration::from_millis(cfg.warehouse.memory.execution_delay_ms),
        job_retention: Duration::from_secs(cfg.warehouse.memory.job_retention_secs),
    }));
    let app = build_app_with_warehouse(&cfg, warehouse.clone()).expect("build app");

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base: format!("http://{addr}"),
        warehouse,
        shutdown: tx,
        handle,
    }
}

fn fast_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.query.write_poll_interval_ms = 20;
    cfg.query.redeem_timeout_ms = 5_000;
    cfg
}

#[tokio::test]
async fn created_patient_is_listed_through_redirect() {
    let server = start_server(fast_config()).await;
    let client = reqwest::Client::new();
    let base = &server.base;

    let resp = client
        .post(format!("{base}/rest/user"))
        .json(&json!({"subject_id": 42, "gender": "F", "dob": "1980-01-01T00:00:00Z"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Paciente criado com sucesso!");

    // GET / redirects to /results carrying the job handle
    let no_redirect = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let resp = no_redirect.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(resp.status(), 303);
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with("/results?project_id=barbara2-451412&job_id="));
    assert!(location.ends_with("&location=US"));

    let resp = client.get(format!("{base}{location}")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "complete");
    let rows = body["rows"].as_array().unwrap();
    assert!(rows.len() <= 10);
    let row = rows
        .iter()
        .find(|r| r["SUBJECT_ID"] == 42)
        .expect("created patient is listed");
    assert_eq!(row["GENDER"], "F");
    assert_eq!(row["DOB"], "1980-01-01T00:00:00Z");
    assert_eq!(row["ROW_ID"], Value::Null);

    // The same handle can be redeemed again with the same rows
    let again: Value = client
        .get(format!("{base}{location}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["rows"], body["rows"]);

    // Following the redirect end to end also works
    let resp = client.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    server.stop().await;
}

#[tokio::test]
async fn update_and_delete_patient() {
    let server = start_server(fast_config()).await;
    let client = reqwest::Client::new();
    let base = &server.base;

    for (subject_id, gender) in [(1, "M"), (2, "F")] {
        let resp = client
            .post(format!("{base}/rest/user"))
            .json(&json!({"row_id": subject_id * 10, "subject_id": subject_id, "gender": gender, "dob": "1970-05-05 00:00:00"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    // Identity fields are immutable
    let resp = client
        .put(format!("{base}/rest/user/1"))
        .json(&json!({"subject_id": 3, "gender": "F", "dob": "1971-01-01T00:00:00Z"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "immutable_field");

    let resp = client
        .put(format!("{base}/rest/user/1"))
        .json(&json!({"gender": "F", "dob": "1971-01-01T00:00:00Z"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Paciente 1 atualizado com sucesso!");

    let patients = server.table("PATIENTS").await;
    let updated = patients
        .rows
        .iter()
        .find(|r| r["SUBJECT_ID"] == ScalarValue::Int64(1))
        .unwrap();
    assert_eq!(updated["GENDER"], ScalarValue::String("F".into()));
    assert_eq!(
        updated["DOB"],
        ScalarValue::Timestamp(parse_timestamp("1971-01-01T00:00:00Z").unwrap())
    );
    assert_eq!(updated["ROW_ID"], ScalarValue::Int64(10));
    let untouched = patients
        .rows
        .iter()
        .find(|r| r["SUBJECT_ID"] == ScalarValue::Int64(2))
        .unwrap();
    assert_eq!(untouched["GENDER"], ScalarValue::String("F".into()));

    // Deleting a missing subject is a no-op
    let resp = client
        .delete(format!("{base}/rest/user/999"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(server.table("PATIENTS").await.len(), 2);

    let resp = client
        .delete(format!("{base}/rest/user/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let remaining = server.table("PATIENTS").await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining.rows[0]["SUBJECT_ID"], ScalarValue::Int64(2));

    server.stop().await;
}

#[tokio::test]
async fn deathtime_also_sets_dischtime() {
    let server = start_server(fast_config()).await;
    let client = reqwest::Client::new();
    let base = &server.base;

    for hadm_id in [1001, 1002] {
        let resp = client
            .post(format!("{base}/rest/admissions"))
            .json(&json!({
                "subject_id": 42,
                "hadm_id": hadm_id,
                "admittime": "2024-02-20T08:30:00Z",
                "admission_location": "EMERGENCY ROOM ADMIT"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    // Neither time supplied
    let resp = client
        .put(format!("{base}/rest/admissions/1001"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .put(format!("{base}/rest/admissions/1001"))
        .json(&json!({"deathtime": "2024-03-01T10:00:00Z"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .put(format!("{base}/rest/admissions/1002"))
        .json(&json!({"dischtime": "2024-03-05 12:00:00"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let admissions = server.table("ADMISSIONS").await;
    let by_id = |id: i64| {
        admissions
            .rows
            .iter()
            .find(|r| r["HADM_ID"] == ScalarValue::Int64(id))
            .unwrap()
            .clone()
    };

    let death = ScalarValue::Timestamp(parse_timestamp("2024-03-01T10:00:00Z").unwrap());
    let died = by_id(1001);
    assert_eq!(died["DISCHTIME"], death);
    assert_eq!(died["DEATHTIME"], death);

    let discharged = by_id(1002);
    assert_eq!(
        discharged["DISCHTIME"],
        ScalarValue::Timestamp(parse_timestamp("2024-03-05T12:00:00Z").unwrap())
    );
    assert_eq!(discharged["DEATHTIME"], ScalarValue::Null);

    server.stop().await;
}

#[tokio::test]
async fn questions_and_answers() {
    let server = start_server(fast_config()).await;
    let client = reqwest::Client::new();
    let base = &server.base;

    let resp = client
        .post(format!("{base}/rest/questions"))
        .json(&json!({"id": 1, "patient_id": 42, "message": "Can I eat before the exam?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{base}/rest/answers"))
        .json(&json!({"replying_to": 1, "unit_id": "CARDIO", "message": "No, fast for 8 hours."}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(server.table("ANSWERS").await.len(), 1);

    let resp = client.get(format!("{base}/questions")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["total_rows"], 1);
    assert_eq!(body["rows"][0]["MESSAGE"], "Can I eat before the exam?");
    assert_eq!(body["rows"][0]["PATIENT_ID"], 42);

    server.stop().await;
}

#[tokio::test]
async fn slow_job_times_out_then_completes() {
    let mut cfg = fast_config();
    cfg.warehouse.memory.execution_delay_ms = 400;
    cfg.query.redeem_timeout_ms = 50;
    let server = start_server(cfg).await;
    let no_redirect = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let base = &server.base;

    let resp = no_redirect.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(resp.status(), 303);
    let location = resp.headers()["location"].to_str().unwrap().to_string();

    let resp = no_redirect
        .get(format!("{base}{location}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    assert!(resp.headers().contains_key("retry-after"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "timeout");
    assert_eq!(body["retry_url"], location.as_str());

    // The handle stays redeemable until the job finishes
    let mut completed = None;
    for _ in 0..40 {
        let resp = no_redirect
            .get(format!("{base}{location}"))
            .send()
            .await
            .unwrap();
        if resp.status() == 200 {
            completed = Some(resp.json::<Value>().await.unwrap());
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let body = completed.expect("job eventually completes");
    assert_eq!(body["status"], "complete");
    assert_eq!(body["total_rows"], 0);

    server.stop().await;
}
