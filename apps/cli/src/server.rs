//! Webhook trigger: `POST /ingest` runs one batch, `GET /health` for liveness checks.

use std::sync::Arc;

use axum::extract::{State, rejection::JsonRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use color_eyre::eyre::{Result, WrapErr};
use curator_core::{SilentProgress, Workflow};
use curator_shared::RawInput;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub(crate) fn router(workflow: Arc<Workflow>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .with_state(workflow)
        .layer(TraceLayer::new_for_http())
}

pub(crate) async fn serve(workflow: Arc<Workflow>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .wrap_err_with(|| format!("failed to bind {bind}"))?;
    info!(bind, backend = workflow.store().backend_name(), "listening");

    axum::serve(listener, router(workflow))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ingest(
    State(workflow): State<Arc<Workflow>>,
    body: std::result::Result<Json<Vec<RawInput>>, JsonRejection>,
) -> Response {
    let inputs = match body {
        Ok(Json(inputs)) => inputs,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected ingest payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    let result = workflow.run(&inputs, &SilentProgress).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use curator_classifier::Classifier;
    use curator_extractor::{Extractor, FetchError, FetchResponse, Fetcher, RetryPolicy};
    use curator_shared::{ClassifierConfig, ExtractorConfig, PipelineConfig, WorkflowResult};
    use curator_store::{ContentStore, FsBackend};

    struct Offline;

    #[async_trait]
    impl Fetcher for Offline {
        async fn fetch(&self, _url: &str) -> std::result::Result<FetchResponse, FetchError> {
            Err(FetchError::Status(404))
        }
    }

    async fn spawn_server() -> (String, std::path::PathBuf) {
        let root = std::env::temp_dir().join(format!("curator-serve-{}", uuid::Uuid::now_v7()));
        let extractor = Extractor::new(Arc::new(Offline), &ExtractorConfig::default())
            .with_retry_policy(RetryPolicy::none());
        let workflow = Workflow::new(
            Arc::new(extractor),
            Arc::new(Classifier::new(&ClassifierConfig::default())),
            Arc::new(ContentStore::new(Arc::new(FsBackend::new(&root)), "content", "main")),
            &PipelineConfig::default(),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(workflow))).await.unwrap();
        });
        (format!("http://{addr}"), root)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (base, _) = spawn_server().await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn ingest_reports_item_errors_without_failing() {
        let (base, root) = spawn_server().await;
        let batch = json!([{
            "sender": "editor@example.com",
            "receivedAt": "2025-06-01T10:00:00Z",
            "urls": ["https://www.reuters.com/gone"]
        }]);

        let resp = reqwest::Client::new()
            .post(format!("{base}/ingest"))
            .json(&batch)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let result: WorkflowResult = resp.json().await.unwrap();
        assert!(result.success);
        assert_eq!(result.processed_count, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.created_files.is_empty());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let (base, _) = spawn_server().await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/ingest"))
            .header("content-type", "application/json")
            .body(r#"{"not":"a batch"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }
}
