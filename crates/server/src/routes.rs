//! Routes and handlers.
//!
//! Every parse answers 200 with the `ParseResult` document, failed or not;
//! only a request body that is not a valid parse request gets a 400.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use grantscope_core::{Extractor, HttpTransport, ParseRequest, StatsSnapshot};
use serde::Serialize;
use tracing::debug;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<Extractor<HttpTransport>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(flatten)]
    stats: StatsSnapshot,
    cache_size: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/parse", post(parse))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .with_state(state)
}

async fn parse(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ParseRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejected parse request");
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: format!("Invalid request: {e}") }))
                .into_response();
        }
    };

    Json(state.extractor.parse_request(&request).await).into_response()
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse { stats: state.extractor.stats(), cache_size: state.extractor.cache().store().len() })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use grantscope_core::{ExtractorConfig, ProfileResolver};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let extractor = Extractor::with_config(ExtractorConfig::default()).with_resolver(ProfileResolver::new());
        create_router(AppState { extractor: Arc::new(extractor) })
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_parse(body: &str) -> Request<Body> {
        Request::post("/parse")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unparseable_body_is_400() {
        let (status, body) = send(app(), post_parse("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));

        let (status, _) = send(app(), post_parse(r#"{"contentType":"grants"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_failed_parse_is_200_with_error() {
        let (status, body) = send(app(), post_parse(r#"{"url":"not a url","contentType":"contracts"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["contentType"], "contracts");
        assert!(body["error"].as_str().unwrap().contains("Invalid URL"));
    }

    #[tokio::test]
    async fn test_stats_include_cache_size() {
        let app = app();
        send(app.clone(), post_parse(r#"{"url":"ftp://example.gov/"}"#)).await;

        let (status, body) = send(app, Request::get("/stats").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requests"], 1);
        assert_eq!(body["failedParses"], 1);
        assert_eq!(body["cacheSize"], 0);
        assert_eq!(body["strategyWins"]["structural"], 0);
    }
}
