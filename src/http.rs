//! HTTP transport for the incident pipeline
//!
//! `POST {path}` accepts `{"report": "..."}` and answers with one NDJSON line per stage.
//! Requests are rejected with a JSON error before any stream is opened; once the stream
//! starts, failures travel in-band as an `error` event.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use crate::clients::ModelBackend;
use crate::config::Config;
use crate::error::{EcoOpsError, Result};
use crate::graph::PipelineRun;
use crate::state::IncidentReport;
use crate::stream::ndjson_stream;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// `None` when no provider credentials were found; analysis requests then fail with 500.
    pub backend: Option<Arc<dyn ModelBackend>>,
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    "ok"
}

/// Start one run and stream its events
pub async fn analyze_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let report = match parse_request(&body) {
        Ok(report) => report,
        Err(e) => return error_response(e),
    };
    let Some(backend) = state.backend.clone() else {
        return error_response(EcoOpsError::Config {
            message: "no model provider configured; set GROQ_API_KEY or OPENAI_API_KEY"
                .to_string(),
        });
    };

    let run = PipelineRun::new(&report, backend);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(ndjson_stream(run)),
    )
        .into_response()
}

/// Pull the report out of a request body.
pub fn parse_request(body: &[u8]) -> Result<IncidentReport> {
    let value: Value = serde_json::from_slice(body).map_err(|e| EcoOpsError::Validation {
        message: format!("Request body is not valid JSON: {}", e),
    })?;
    match value.get("report") {
        Some(Value::String(text)) => IncidentReport::new(text.as_str()),
        Some(_) => Err(EcoOpsError::Validation {
            message: "Report must be a string".to_string(),
        }),
        None => Err(EcoOpsError::Validation {
            message: "Report text is required".to_string(),
        }),
    }
}

fn error_response(err: EcoOpsError) -> Response {
    tracing::warn!("rejecting analyze request: {}", err);
    (
        err.http_status(),
        [(header::CONTENT_TYPE, "application/json")],
        err.to_json_body(),
    )
        .into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({"error": "Unauthorized"}).to_string(),
    )
        .into_response()
}

/// Build the router for a config and an optional backend.
pub fn router(config: &Config, backend: Option<Arc<dyn ModelBackend>>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route(config.server.path.as_str(), post(analyze_handler))
        .with_state(AppState { backend });

    if let Some(token) = config.runtime.bearer_token.clone() {
        app = app.layer(middleware::from_fn_with_state(
            token,
            |State(expected): State<String>,
             req: axum::http::Request<Body>,
             next: axum::middleware::Next| async move {
                if req.uri().path() == "/health" {
                    return next.run(req).await;
                }
                let headers: &HeaderMap = req.headers();
                let header_ok = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|h| h.to_str().ok())
                    .map(|v| v == format!("Bearer {}", expected))
                    .unwrap_or(false);
                if !header_ok {
                    return unauthorized();
                }
                next.run(req).await
            },
        ));
    }

    if config.server.cors_allow_any {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app
}

/// Start the HTTP server
pub async fn serve(config: &Config, backend: Option<Arc<dyn ModelBackend>>) -> Result<()> {
    if backend.is_none() {
        tracing::warn!("serving without a model provider; analyze requests will return 500");
    }
    let app = router(config, backend);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP listener: {}", e))?;

    tracing::info!(
        "Starting HTTP server on {} (analyze at {})",
        config.server.bind,
        config.server.path
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parsing_rejects_bad_bodies() {
        for body in [
            &b"not json"[..],
            br#"{"text": "smoke"}"#,
            br#"{"report": 42}"#,
            br#"{"report": "   "}"#,
            br#"["report"]"#,
        ] {
            let err = parse_request(body).unwrap_err();
            assert_eq!(err.http_status(), StatusCode::BAD_REQUEST, "{:?}", body);
        }
    }

    #[test]
    fn request_parsing_keeps_report_text() {
        let report = parse_request(br#"{"report": "Oil in the creek"}"#).unwrap();
        assert_eq!(report.text(), "Oil in the creek");
    }
}
