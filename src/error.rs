//! Domain errors and their JSON HTTP rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Failure of one external tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("no compression tool configured")]
    NoCandidates,
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{program} produced no usable output")]
    EmptyOutput { program: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Payment provider failures on the order path.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment provider not configured")]
    NotConfigured,
    #[error("provider request: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected order ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Outcome of a failed payment verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("payment secret not configured")]
    NotConfigured,
    #[error("invalid payment signature")]
    InvalidSignature,
}

/// HTTP error: a status plus a machine-readable `error` code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub extra: Map<String, Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            extra: Map::new(),
        }
    }

    pub fn bad_request(code: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    pub fn internal(code: &'static str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code)
    }

    pub fn server_error() -> Self {
        Self::internal("SERVER_ERROR")
    }

    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED")
    }

    pub fn limit_reached() -> Self {
        Self::new(StatusCode::FORBIDDEN, "LIMIT_REACHED")
            .with("remaining", json!(0))
            .with("isPro", json!(false))
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = self.extra;
        body.insert("error".to_string(), Value::from(self.code));
        (self.status, Json(Value::Object(body))).into_response()
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotConfigured => ApiError::internal("RAZORPAY_NOT_CONFIGURED"),
            _ => ApiError::internal("ORDER_CREATION_FAILED"),
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::NotConfigured => ApiError::internal("RAZORPAY_NOT_CONFIGURED"),
            VerifyError::InvalidSignature => ApiError::bad_request("INVALID_SIGNATURE"),
        }
    }
}
