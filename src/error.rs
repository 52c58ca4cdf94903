//! Pipeline rejections and how they turn into HTTP responses.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::upstream::UpstreamError;

/// Client-facing error body: `{"error": "..."}`.
#[derive(Debug, Serialize, Clone)]
pub struct ErrorBody {
    pub error: String,
}

/// Every way the pipeline can stop early.  `Display` is the message the
/// client sees; upstream detail stays in the `source`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),
    #[error("Content not allowed. Please use appropriate language.")]
    ContentRejected { category: String },
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Duration,
    },
    #[error("Service temporarily unavailable")]
    Configuration,
    #[error("{message}")]
    Upstream {
        message: &'static str,
        #[source]
        source: UpstreamError,
    },
    #[error("{0}")]
    PayloadTooLarge(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) | GatewayError::ContentRejected { .. } => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Configuration | GatewayError::Upstream { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "validation",
            GatewayError::ContentRejected { .. } => "content",
            GatewayError::MethodNotAllowed => "method",
            GatewayError::RateLimited { .. } => "rate_limit",
            GatewayError::Configuration => "configuration",
            GatewayError::Upstream { .. } => "upstream",
            GatewayError::PayloadTooLarge(_) => "too_large",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        match self {
            GatewayError::RateLimited { retry_after, .. } => {
                let mut resp = (status, body).into_response();
                resp.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after.as_secs()),
                );
                resp
            }
            _ => (status, body).into_response(),
        }
    }
}
