//! Integration test: server API endpoints

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use mlstudio::server::{create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app(name: &str) -> (axum::Router, std::path::PathBuf) {
    let base = std::env::temp_dir().join(format!("mlstudio_server_test_{name}"));
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_dir: base.join("uploads").to_string_lossy().to_string(),
        processed_dir: base.join("processed").to_string_lossy().to_string(),
        models_dir: base.join("models").to_string_lossy().to_string(),
    };
    std::fs::create_dir_all(&config.data_dir).ok();
    std::fs::create_dir_all(&config.processed_dir).ok();
    std::fs::create_dir_all(&config.models_dir).ok();
    let state = Arc::new(AppState::new(config));
    (create_router(state), base)
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app("health");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_unknown_model_type_is_bad_request() {
    let (app, _) = test_app("bad_type");
    let req = json_request(
        "/api/train-models",
        json!({
            "filename": "data.csv",
            "modelType": "ranking",
            "algorithms": ["RandomForest"],
        }),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_missing_dataset_is_not_found() {
    let (app, _) = test_app("no_dataset");
    let req = json_request(
        "/api/train-models",
        json!({
            "filename": "does_not_exist.csv",
            "modelType": "classification",
            "algorithms": ["NaiveBayes"],
            "target": "label",
        }),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_target_is_bad_request() {
    let (app, base) = test_app("no_target");
    let csv = "a,b,label\n1,2,0\n3,4,1\n5,6,0\n7,8,1\n";
    std::fs::write(base.join("uploads").join("data.csv"), csv).unwrap();
    let req = json_request(
        "/api/train-models",
        json!({
            "filename": "data.csv",
            "modelType": "classification",
            "algorithms": ["NaiveBayes"],
        }),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let _ = std::fs::remove_dir_all(base);
}

#[tokio::test]
async fn test_train_classification_end_to_end() {
    let (app, base) = test_app("train_ok");
    let mut csv = String::from("a,b,label\n");
    for i in 0..20 {
        let group = i % 2;
        csv.push_str(&format!(
            "{},{},{}\n",
            group as f64 * 5.0 + i as f64 * 0.1,
            group as f64 * 5.0,
            group
        ));
    }
    std::fs::write(base.join("uploads").join("data.csv"), csv).unwrap();

    let req = json_request(
        "/api/train-models",
        json!({
            "filename": "data.csv",
            "modelType": "classification",
            "algorithms": ["NaiveBayes", "DecisionTree"],
            "target": "label",
            "testSize": 0.25,
        }),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0]["metrics"]["accuracy"].is_number());
    assert!(body["comparison_plot"].is_string());
    let _ = std::fs::remove_dir_all(base);
}

#[tokio::test]
async fn test_download_model_requires_params() {
    let (app, _) = test_app("dl_params");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/download-model?algo=RandomForest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_missing_model_is_not_found() {
    let (app, _) = test_app("dl_missing");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/download-model?algo=RandomForest&model_type=classification")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_after_training() {
    let (app, base) = test_app("dl_after_train");
    let mut csv = String::from("a,b,label\n");
    for i in 0..16 {
        let group = i % 2;
        csv.push_str(&format!(
            "{},{},{}\n",
            group as f64 * 4.0 + i as f64 * 0.1,
            group as f64 * 4.0,
            group
        ));
    }
    std::fs::write(base.join("uploads").join("data.csv"), csv).unwrap();

    let train = json_request(
        "/api/train-models",
        json!({
            "filename": "data.csv",
            "modelType": "classification",
            "algorithms": ["DecisionTree"],
            "target": "label",
        }),
    );
    let response = app.clone().oneshot(train).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/download-model?algo=DecisionTree&model_type=classification")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(!bytes.is_empty());
    let _ = std::fs::remove_dir_all(base);
}
