//! Origin allow-list and the fixed CORS header set.

use axum::http::{header, HeaderMap, HeaderValue, Method};

pub const ALLOW_HEADERS: &str = "Content-Type, Authorization";
pub const ALLOW_METHODS: &str = "POST, OPTIONS";
pub const MAX_AGE_SECS: &str = "86400";

/// What the guard decided for an incoming method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodDecision {
    /// Answer 200 with an empty body right away.
    Preflight,
    /// Answer 405.
    Reject,
    Proceed,
}

pub fn classify_method(method: &Method) -> MethodDecision {
    if method == Method::OPTIONS {
        MethodDecision::Preflight
    } else if method == Method::POST {
        MethodDecision::Proceed
    } else {
        MethodDecision::Reject
    }
}

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    default_origin: String,
}

impl CorsPolicy {
    pub fn new(allowed_origins: Vec<String>, default_origin: String) -> Self {
        Self {
            allowed_origins,
            default_origin,
        }
    }

    /// The request origin when allow-listed, the default origin otherwise.
    /// Comparison is exact.
    pub fn effective_origin<'a>(&'a self, origin: Option<&'a str>) -> &'a str {
        match origin {
            Some(o) if self.allowed_origins.iter().any(|a| a == o) => o,
            _ => &self.default_origin,
        }
    }

    /// Insert the CORS headers for a request carrying `request_headers`.
    pub fn apply(&self, request_headers: &HeaderMap, response_headers: &mut HeaderMap) {
        let origin = request_headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok());
        let effective = self.effective_origin(origin);
        let allow_origin = HeaderValue::from_str(effective)
            .unwrap_or_else(|_| HeaderValue::from_static("null"));
        response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        response_headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        response_headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        response_headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(MAX_AGE_SECS),
        );
    }
}
