//! REST API Server for the Investment Committee Orchestrator
//!
//! Exposes a single deliberation endpoint plus a health check

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::models::CommitteeRequest;

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            error_code: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(err: &OrchestrationError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_code: Some(err.error_code().to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

fn status_for(err: &OrchestrationError) -> StatusCode {
    match err {
        OrchestrationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Deliberation Endpoint
/// =============================

async fn execute_analysis(
    State(state): State<ApiState>,
    Json(req): Json<CommitteeRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(topic = %req.topic, symbols = ?req.symbols, "Received analysis request");

    match state.orchestrator.execute(req).await {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::success(outcome))),
        Err(e) => {
            warn!(code = e.error_code(), "Analysis request failed: {}", e);
            (status_for(&e), Json(ApiResponse::error(&e)))
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/analysis/execute", post(execute_analysis))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommitteeConfig;
    use crate::invocation::AgentPolicy;
    use crate::testing::{sample_request, ScriptedReasoner};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router() -> Router {
        let config = CommitteeConfig {
            default_policy: AgentPolicy::fast(),
            overall_deadline: Duration::from_secs(5),
            ..CommitteeConfig::default()
        };
        let reasoner = Arc::new(ScriptedReasoner::unanimous("buy", 0.8, 0.2));
        let orchestrator = tokio_test::assert_ok!(Orchestrator::committee(reasoner, config));
        create_router(Arc::new(orchestrator))
    }

    async fn post_json(router: Router, body: serde_json::Value) -> (StatusCode, ApiResponse) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/analysis/execute")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_execute_returns_decision_and_minutes() {
        let body = serde_json::to_value(sample_request()).unwrap();
        let (status, response) = post_json(router(), body).await;

        assert_eq!(status, StatusCode::OK);
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["decision"]["action"], "buy");
        assert!(data["transcript"]["events"].as_array().unwrap().len() > 7);
        assert!(data["minutes"]["participants"].is_array());
    }

    #[tokio::test]
    async fn test_invalid_request_is_bad_request() {
        let mut body = serde_json::to_value(sample_request()).unwrap();
        body["topic"] = serde_json::json!("");

        let (status, response) = post_json(router(), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("INVALID_REQUEST"));
    }
}
