use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::logic::RemoteJoiner;
use crate::model::{JoinError, Query, ServiceConfig};

pub type AppState = Arc<RemoteJoiner>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureDetail>,
}

/// One failed fetch, as reported to HTTP callers
#[derive(Debug, Serialize)]
pub struct FailureDetail {
    pub path: String,
    pub service: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            failures: Vec::new(),
        }
    }
}

impl From<&JoinError> for ErrorResponse {
    fn from(err: &JoinError) -> Self {
        Self {
            error: err.to_string(),
            failures: err
                .failures()
                .into_iter()
                .map(|failure| FailureDetail {
                    path: failure.path.clone(),
                    service: failure.service.clone(),
                    error: format!("{:#}", failure.source),
                })
                .collect(),
        }
    }
}

fn status_for(err: &JoinError) -> StatusCode {
    match err {
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        JoinError::BranchFetch(_) | JoinError::Aggregated(_) => StatusCode::BAD_GATEWAY,
        JoinError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: JoinError) -> (StatusCode, Json<ErrorResponse>) {
    (status_for(&err), Json(ErrorResponse::from(&err)))
}

pub async fn list_services(State(joiner): State<AppState>) -> Json<Vec<ServiceConfig>> {
    Json(joiner.registry().services().cloned().collect())
}

/// Run a joined query; the body is a `Query` in either expand form
pub async fn run_query(
    State(joiner): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<ErrorResponse>)> {
    let query = Query::from_json(body).map_err(error_response)?;

    log::info!("query on '{}'", query.service);

    match joiner.query(&query).await {
        Ok(result) => Ok(Json(result)),
        Err(err) => {
            if !err.is_client_error() {
                log::warn!("query on '{}' failed: {}", query.service, err);
            }
            Err(error_response(err))
        }
    }
}
