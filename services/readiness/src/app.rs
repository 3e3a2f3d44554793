use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::routes_assessments::{
    export_report, get_report, get_status, list_assessments, trigger_assessment,
};
use crate::routes_datasets::{delete_dataset, get_dataset, list_datasets, upload_dataset};
use crate::routes_health::health;
use crate::state::SharedState;

pub fn app(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        // size is enforced chunk by chunk inside ingestion
        .route(
            "/api/ingestion/upload",
            post(upload_dataset).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/ingestion/datasets", get(list_datasets))
        .route(
            "/api/ingestion/datasets/:id",
            get(get_dataset).delete(delete_dataset),
        )
        .route("/api/assessment/trigger", post(trigger_assessment))
        .route("/api/assessment/list", get(list_assessments))
        .route("/api/assessment/:id/status", get(get_status))
        .route("/api/assessment/:id/report", get(get_report))
        .route("/api/assessment/:id/export", get(export_report))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use blobstore::InMemoryObjectStore;

    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;

    const BOUNDARY: &str = "readiness-test-boundary";
    const PEOPLE: &str = "id,name,age,email,score\n\
        1,Ann,34,ann@example.com,7.5\n\
        2,Bob,,bob@example.com,6.0\n\
        3,Cid,51,cid@example.com,8.25\n\
        4,Dee,28,dee@example.com,9.0\n\
        5,Eve,45,eve@example.com,5.5\n";

    struct TestApp {
        router: Router,
        state: SharedState,
        _dir: tempfile::TempDir,
    }

    fn test_app(tweak: impl FnOnce(&mut AppConfig)) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::for_tests(dir.path().join("uploads"));
        tweak(&mut cfg);
        let state = Arc::new(AppState::in_memory(cfg, Arc::new(InMemoryObjectStore::new())));
        TestApp {
            router: app(state.clone()),
            state,
            _dir: dir,
        }
    }

    fn upload_request(filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/ingestion/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = app.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, req).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn upload_people(app: &TestApp) -> String {
        let (status, body) =
            send_json(app, upload_request("people.csv", "text/csv", PEOPLE.as_bytes())).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(|_| {});
        let (status, body) = send_json(&app, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database_connection"], true);
        assert_eq!(body["storage_connection"], true);
    }

    #[tokio::test]
    async fn test_dataset_lifecycle() {
        let app = test_app(|_| {});
        let id = upload_people(&app).await;

        let (status, ds) = send_json(&app, get_request(&format!("/api/ingestion/datasets/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ds["name"], "people.csv");
        assert_eq!(ds["file_type"], "csv");
        assert_eq!(ds["metadata"]["row_count"], 5);
        assert_eq!(ds["metadata"]["column_count"], 5);
        assert_eq!(ds["metadata"]["statistics"]["age"]["kind"], "numeric");
        assert_eq!(ds["metadata"]["statistics"]["name"]["kind"], "categorical");

        let (status, list) = send_json(&app, get_request("/api/ingestion/datasets?limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total"], 1);
        assert_eq!(list["page"], 1);
        assert_eq!(list["page_size"], 5);
        assert_eq!(list["datasets"][0]["id"], id.as_str());

        let (status, _) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/ingestion/datasets/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send_json(&app, get_request(&format!("/api/ingestion/datasets/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
        let (_, list) = send_json(&app, get_request("/api/ingestion/datasets")).await;
        assert_eq!(list["total"], 0);
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let app = test_app(|cfg| cfg.max_upload_bytes = 64);

        let (status, _) = send_json(&app, upload_request("logo.png", "image/png", b"\x89PNG")).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let big = "x,y\n".repeat(100);
        let (status, body) = send_json(&app, upload_request("big.csv", "text/csv", big.as_bytes())).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].as_str().unwrap().contains("64"));

        let (status, _) = send_json(&app, get_request("/api/ingestion/datasets?limit=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, list) = send_json(&app, get_request("/api/ingestion/datasets")).await;
        assert_eq!(list["total"], 0);
    }

    #[tokio::test]
    async fn test_assessment_flow() {
        let app = test_app(|_| {});
        let id = upload_people(&app).await;

        let (status, created) = send_json(
            &app,
            json_request("POST", "/api/assessment/trigger", json!({ "dataset_id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "in_progress");
        assert_eq!(created["modules"], json!(["quality", "accessibility"]));
        let job = created["assessment_id"].as_str().unwrap().to_string();

        let mut view = Value::Null;
        for _ in 0..500 {
            let (status, body) =
                send_json(&app, get_request(&format!("/api/assessment/{job}/status"))).await;
            assert_eq!(status, StatusCode::OK);
            view = body;
            if view["status"] == "completed" || view["status"] == "failed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(view["status"], "completed");
        assert_eq!(view["module_scores"].as_array().unwrap().len(), 2);
        assert!(view.get("report").is_none());

        let (status, report) = send_json(&app, get_request(&format!("/api/assessment/{job}/report"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!report["findings"].as_array().unwrap().is_empty());
        assert!(!report["recommendations"].as_array().unwrap().is_empty());

        let resp = app
            .router
            .clone()
            .oneshot(get_request(&format!("/api/assessment/{job}/export?format=csv")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        assert!(resp.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .ends_with(".csv\""));

        let (status, _) =
            send_json(&app, get_request(&format!("/api/assessment/{job}/export?format=pdf"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, list) =
            send_json(&app, get_request(&format!("/api/assessment/list?dataset_id={id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total"], 1);
        assert_eq!(list["assessments"][0]["id"], job.as_str());
    }

    #[tokio::test]
    async fn test_assessment_errors() {
        let app = test_app(|cfg| cfg.module_delay_ms = 10_000);

        let missing = uuid::Uuid::now_v7();
        let (status, _) = send_json(
            &app,
            json_request("POST", "/api/assessment/trigger", json!({ "dataset_id": missing })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send_json(&app, get_request(&format!("/api/assessment/{missing}/status"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let id = upload_people(&app).await;
        let (status, _) = send_json(
            &app,
            json_request(
                "POST",
                "/api/assessment/trigger",
                json!({ "dataset_id": id, "modules": [] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, created) = send_json(
            &app,
            json_request("POST", "/api/assessment/trigger", json!({ "dataset_id": id })),
        )
        .await;
        let job = created["assessment_id"].as_str().unwrap().to_string();
        let (status, _) = send_json(&app, get_request(&format!("/api/assessment/{job}/report"))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        app.state.engine.shutdown_and_wait().await;
        let (_, view) = send_json(&app, get_request(&format!("/api/assessment/{job}/status"))).await;
        assert_eq!(view["status"], "failed");
        assert_eq!(view["error"], "service_shutdown");
    }
}
