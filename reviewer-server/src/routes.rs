//! HTTP route handlers.

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use reviewer::api::{handle_review, schema_document};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/agent", post(review))
        .route("/schema", get(schema))
        .route("/health", get(health))
}

async fn health() -> &'static str {
    "ok"
}

/// GET /schema - OpenAPI description of `/agent`.
async fn schema() -> Json<Value> {
    Json(schema_document())
}

/// POST /agent - run a review and return its result.
///
/// Dropping the connection cancels the run.
async fn review(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(error = %rejection, "unreadable request body");
            Value::Null
        }
    };

    let sink = state.start_run();
    info!(run_id = sink.run_id(), "review requested");
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let response = handle_review(state.pipeline.clone(), body, sink, cancel).await;
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewer::pipeline::ReviewPipeline;
    use reviewer::test_support::{PR_URL, happy_worker, local_config, sample_review_json};
    use serde_json::json;
    use std::sync::Arc;

    fn state() -> AppState {
        let pipeline =
            ReviewPipeline::new(Arc::new(happy_worker()), local_config()).expect("pipeline");
        AppState::new(pipeline)
    }

    #[tokio::test]
    async fn missing_url_is_bad_request() {
        let (status, Json(body)) = review(State(state()), Ok(Json(json!({})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("pull_request_url is required"));
    }

    #[tokio::test]
    async fn review_broadcasts_tagged_events() {
        let state = state();
        let mut rx = state.event_tx.subscribe();

        let (status, Json(body)) = review(
            State(state.clone()),
            Ok(Json(json!({"pull_request_url": PR_URL}))),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, sample_review_json());
        let first = rx.recv().await.expect("event");
        assert_eq!(first.run_id, "run-1");
        let wire = serde_json::to_value(&first).expect("json");
        assert_eq!(wire["author"], json!("fetch_pr_details"));
        assert_eq!(wire["role"], json!("assistant"));
    }

    #[tokio::test]
    async fn schema_route_serves_openapi() {
        let Json(doc) = schema().await;
        assert_eq!(doc["openapi"], json!("3.0.0"));
    }
}
