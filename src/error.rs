use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Gateway error taxonomy. `Upstream` and `Timeout` render identically on the
/// wire; the distinction only survives in the logged detail.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Invalid client request (bad JSON, no user message). Surfaced before any
    /// generation or proxy attempt.
    #[error("Bad Request: {0}")]
    BadRequest(String),
    /// The augmented generation pipeline failed.
    #[error("Pipeline Error: {0}")]
    Pipeline(String),
    /// Upstream generation service unreachable or returned an error status.
    #[error("Upstream Error: {0}")]
    Upstream(String),
    /// Upstream or pipeline call exceeded the configured deadline.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Gateway is still starting up and has no router wired.
    #[error("Not Ready: {0}")]
    NotReady(String),
    #[error("Internal Error: {0}")]
    Internal(String),
    #[error("Serialization Error: {0}")]
    Serialization(String),
}

impl GatewayError {
    /// Message safe to put on the wire. Upstream transport detail collapses to
    /// one generic string so connection failures and timeouts are
    /// indistinguishable to clients.
    pub fn wire_message(&self) -> String {
        match self {
            GatewayError::BadRequest(msg) => msg.clone(),
            GatewayError::Pipeline(msg) => msg.clone(),
            GatewayError::Upstream(_) | GatewayError::Timeout(_) => {
                "upstream generation service unavailable".to_string()
            }
            GatewayError::NotReady(msg) => msg.clone(),
            GatewayError::Internal(_) | GatewayError::Serialization(_) => {
                "internal gateway error".to_string()
            }
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "invalid_request_error",
            GatewayError::Pipeline(_) => "internal_server_error",
            GatewayError::Upstream(_) | GatewayError::Timeout(_) => "upstream_error",
            GatewayError::NotReady(_) => "service_unavailable",
            GatewayError::Internal(_) | GatewayError::Serialization(_) => "internal_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_) | GatewayError::Timeout(_) => StatusCode::BAD_GATEWAY,
            GatewayError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) | GatewayError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": {
                "message": self.wire_message(),
                "type": self.error_type(),
                "code": null
            }
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(format!("upstream request timed out: {}", err))
        } else if err.is_connect() {
            GatewayError::Upstream(format!("unable to reach upstream service: {}", err))
        } else if let Some(status) = err.status() {
            GatewayError::Upstream(format!("HTTP {}: {}", status.as_u16(), err))
        } else {
            GatewayError::Upstream(format!("HTTP client error: {}", err))
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<axum::http::Error> for GatewayError {
    fn from(err: axum::http::Error) -> Self {
        GatewayError::Internal(format!("HTTP protocol error: {}", err))
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(err: tokio::task::JoinError) -> Self {
        GatewayError::Internal(format!("worker task failed: {}", err))
    }
}
