//! Core library for wordgate.  This module wires the request pipeline
//! together: CORS and method guard, per-caller quota, content filter and the
//! upstream chat-completion relay, plus the operational endpoints.
//!
//! Every business endpoint runs the same stages in the same order and any
//! stage may end the request early with a [`GatewayError`]:
//!
//! `method → quota → configuration → body → content filter → upstream`
//!
//! CORS headers are attached to whatever comes out, errors included.

mod config;
pub mod cors;
pub mod error;
pub mod feedback;
pub mod filter;
pub mod quota;
pub mod sink;
pub mod upstream;
pub mod util;

pub use config::{AppConfig, IdentityMode, RotationConfig};
pub use error::{ErrorBody, GatewayError};

use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody, JsonRejection},
    ConnectInfo, DefaultBodyLimit, State,
};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::cors::{classify_method, CorsPolicy, MethodDecision};
use crate::feedback::{acknowledgment_request, spawn_categorization, CategorizationJob, FeedbackSubmission};
use crate::filter::ContentFilter;
use crate::quota::{InMemoryQuota, QuotaDecision, QuotaStore, UnlimitedQuota};
use crate::sink::{FeedbackSink, LogFeedbackSink, RotatingWriter};
use crate::upstream::{
    ChatMessage, CompletionProvider, CompletionRequest, CompletionResponse, OpenAiClient,
    UpstreamError, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
use crate::util::caller_address;

pub use crate::feedback::{FeedbackCategory, FeedbackRecord};
pub use crate::upstream::Usage;

const RELAY_FAILURE: &str = "Failed to fetch synonyms. Please try again.";
const FEEDBACK_FAILURE: &str = "Failed to process feedback. Please try again.";

/// Body of a relay request.  Generation parameters fall back to the
/// defaults in [`upstream`] when omitted.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct RelayRequest {
    pub messages: Option<Vec<ChatMessage>>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl RelayRequest {
    fn into_completion_request(self, messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            model: self
                .model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            messages,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }
}

/// Successful feedback reply.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub response: String,
    /// Always `general_feedback`; the real category only reaches the sink.
    pub feedback_type: FeedbackCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Feedback,
    Relay,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Feedback => "feedback",
            Endpoint::Relay => "relay",
        }
    }

    fn rate_limit_message(&self, limit: u32) -> String {
        match self {
            Endpoint::Feedback => format!(
                "Rate limit exceeded. Maximum {} feedback submissions per day.",
                limit
            ),
            Endpoint::Relay => format!("Rate limit exceeded. Maximum {} requests per day.", limit),
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            Endpoint::Feedback => FEEDBACK_FAILURE,
            Endpoint::Relay => RELAY_FAILURE,
        }
    }
}

/// Counters exposed on `/metrics`.
pub struct Metrics {
    feedback_requests_total: AtomicU64,
    relay_requests_total: AtomicU64,
    preflight_total: AtomicU64,
    rejected_validation_total: AtomicU64,
    rejected_content_total: AtomicU64,
    rejected_method_total: AtomicU64,
    rejected_rate_limit_total: AtomicU64,
    rejected_configuration_total: AtomicU64,
    rejected_too_large_total: AtomicU64,
    upstream_errors_total: AtomicU64,
    feedback_categorized_total: AtomicU64,
    feedback_uncategorized_total: AtomicU64,
    // Upstream latency histogram; bucket upper bounds in ms.
    hist_buckets: Vec<u64>,
    hist_counts: Vec<AtomicU64>,
    hist_sum_ms: AtomicU64,
    hist_count: AtomicU64,
    process_start_instant: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let buckets: Vec<u64> = vec![50, 100, 250, 500, 1000, 2000, 5000, 10000, 30000];
        Self {
            feedback_requests_total: AtomicU64::new(0),
            relay_requests_total: AtomicU64::new(0),
            preflight_total: AtomicU64::new(0),
            rejected_validation_total: AtomicU64::new(0),
            rejected_content_total: AtomicU64::new(0),
            rejected_method_total: AtomicU64::new(0),
            rejected_rate_limit_total: AtomicU64::new(0),
            rejected_configuration_total: AtomicU64::new(0),
            rejected_too_large_total: AtomicU64::new(0),
            upstream_errors_total: AtomicU64::new(0),
            feedback_categorized_total: AtomicU64::new(0),
            feedback_uncategorized_total: AtomicU64::new(0),
            hist_counts: buckets.iter().map(|_| AtomicU64::new(0)).collect(),
            hist_buckets: buckets,
            hist_sum_ms: AtomicU64::new(0),
            hist_count: AtomicU64::new(0),
            process_start_instant: Instant::now(),
        }
    }

    fn request(&self, endpoint: Endpoint) {
        let counter = match endpoint {
            Endpoint::Feedback => &self.feedback_requests_total,
            Endpoint::Relay => &self.relay_requests_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn rejection(&self, err: &GatewayError) {
        let counter = match err {
            GatewayError::Validation(_) => &self.rejected_validation_total,
            GatewayError::ContentRejected { .. } => &self.rejected_content_total,
            GatewayError::MethodNotAllowed => &self.rejected_method_total,
            GatewayError::RateLimited { .. } => &self.rejected_rate_limit_total,
            GatewayError::Configuration => &self.rejected_configuration_total,
            GatewayError::Upstream { .. } => &self.upstream_errors_total,
            GatewayError::PayloadTooLarge(_) => &self.rejected_too_large_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn observe_upstream_ms(&self, ms: u64) {
        self.hist_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        for (idx, ub) in self.hist_buckets.iter().enumerate() {
            if ms <= *ub {
                self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    pub fn feedback_categorized(&self) {
        self.feedback_categorized_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn feedback_uncategorized(&self) {
        self.feedback_uncategorized_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn upstream_errors(&self) -> u64 {
        self.upstream_errors_total.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        use std::fmt::Write as _;
        let mut buf = String::new();
        let counter = |buf: &mut String, name: &str, help: &str, v: &AtomicU64| {
            writeln!(buf, "# HELP {} {}", name, help).ok();
            writeln!(buf, "# TYPE {} counter", name).ok();
            writeln!(buf, "{} {}", name, v.load(Ordering::Relaxed)).ok();
        };

        writeln!(
            &mut buf,
            "# HELP wordgate_requests_total Requests reaching an endpoint handler"
        )
        .ok();
        writeln!(&mut buf, "# TYPE wordgate_requests_total counter").ok();
        writeln!(
            &mut buf,
            "wordgate_requests_total{{endpoint=\"feedback\"}} {}",
            self.feedback_requests_total.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            &mut buf,
            "wordgate_requests_total{{endpoint=\"relay\"}} {}",
            self.relay_requests_total.load(Ordering::Relaxed)
        )
        .ok();
        counter(
            &mut buf,
            "wordgate_preflight_total",
            "CORS preflight requests answered",
            &self.preflight_total,
        );

        writeln!(
            &mut buf,
            "# HELP wordgate_rejections_total Requests ended early, by reason"
        )
        .ok();
        writeln!(&mut buf, "# TYPE wordgate_rejections_total counter").ok();
        for (kind, v) in [
            ("validation", &self.rejected_validation_total),
            ("content", &self.rejected_content_total),
            ("method", &self.rejected_method_total),
            ("rate_limit", &self.rejected_rate_limit_total),
            ("configuration", &self.rejected_configuration_total),
            ("too_large", &self.rejected_too_large_total),
            ("upstream", &self.upstream_errors_total),
        ] {
            writeln!(
                &mut buf,
                "wordgate_rejections_total{{reason=\"{}\"}} {}",
                kind,
                v.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(
            &mut buf,
            "# HELP wordgate_feedback_records_total Feedback records written, by categorization outcome"
        )
        .ok();
        writeln!(&mut buf, "# TYPE wordgate_feedback_records_total counter").ok();
        writeln!(
            &mut buf,
            "wordgate_feedback_records_total{{categorized=\"true\"}} {}",
            self.feedback_categorized_total.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            &mut buf,
            "wordgate_feedback_records_total{{categorized=\"false\"}} {}",
            self.feedback_uncategorized_total.load(Ordering::Relaxed)
        )
        .ok();

        writeln!(
            &mut buf,
            "# HELP wordgate_upstream_latency_ms Upstream call latency histogram milliseconds"
        )
        .ok();
        writeln!(&mut buf, "# TYPE wordgate_upstream_latency_ms histogram").ok();
        let mut cumulative: u64 = 0;
        for (i, ub) in self.hist_buckets.iter().enumerate() {
            cumulative += self.hist_counts[i].load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "wordgate_upstream_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        let count = self.hist_count.load(Ordering::Relaxed);
        writeln!(
            &mut buf,
            "wordgate_upstream_latency_ms_bucket{{le=\"+Inf\"}} {}",
            count
        )
        .ok();
        writeln!(
            &mut buf,
            "wordgate_upstream_latency_ms_sum {}",
            self.hist_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(&mut buf, "wordgate_upstream_latency_ms_count {}", count).ok();

        writeln!(
            &mut buf,
            "# HELP wordgate_build_info Build information\n# TYPE wordgate_build_info gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "wordgate_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP wordgate_process_uptime_seconds Process uptime seconds\n# TYPE wordgate_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "wordgate_process_uptime_seconds {}",
            self.process_start_instant.elapsed().as_secs_f64()
        )
        .ok();
        buf
    }
}

/// Shared state handed to every handler.  The collaborators are trait
/// objects so tests and alternative deployments can swap them.
#[derive(Clone)]
pub struct AppState {
    pub api_key: Option<String>,
    pub provider: Arc<dyn CompletionProvider>,
    pub quota: Arc<dyn QuotaStore>,
    pub filter: Arc<ContentFilter>,
    pub cors: Arc<CorsPolicy>,
    pub sink: Arc<dyn FeedbackSink>,
    pub metrics: Arc<Metrics>,
    pub feedback_limit: u32,
    pub relay_limit: u32,
    pub feedback_identity: IdentityMode,
    /// Maximum accepted raw request body size in bytes (None => unlimited)
    pub max_request_bytes: Option<usize>,
}

impl AppState {
    /// Build state from an already loaded configuration using the default
    /// collaborators: the HTTP client, in-memory quota and log sink.
    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let AppConfig {
            api_key,
            upstream_url,
            upstream_timeout_ms,
            allowed_origins,
            default_origin,
            feedback_limit,
            relay_limit,
            feedback_identity,
            rate_limit_disabled,
            filter_config,
            max_request_bytes,
            feedback_log_file,
            rotation,
        } = config;

        if api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set; business endpoints will answer 500");
        }
        let provider = OpenAiClient::new(upstream_url, upstream_timeout_ms)?;

        let quota: Arc<dyn QuotaStore> = if rate_limit_disabled {
            tracing::warn!("rate limiting disabled; every request is admitted");
            Arc::new(UnlimitedQuota)
        } else {
            Arc::new(InMemoryQuota::new())
        };

        let writer = match feedback_log_file.as_deref() {
            Some(path) => {
                match RotatingWriter::open(path, rotation.max_bytes, rotation.keep, rotation.compress)
                {
                    Ok(w) => Some(w),
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "Failed to open FEEDBACK_LOG_FILE; feedback goes to the log only");
                        None
                    }
                }
            }
            None => None,
        };

        let filter = ContentFilter::from_config(&filter_config);
        tracing::info!(rules = filter.len(), "content filter loaded");

        Ok(Self {
            api_key,
            provider: Arc::new(provider),
            quota,
            filter: Arc::new(filter),
            cors: Arc::new(CorsPolicy::new(allowed_origins, default_origin)),
            sink: Arc::new(LogFeedbackSink::new(writer)),
            metrics: Arc::new(Metrics::new()),
            feedback_limit,
            relay_limit,
            feedback_identity,
            max_request_bytes,
        })
    }

    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_quota(mut self, quota: Arc<dyn QuotaStore>) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn limit_for(&self, endpoint: Endpoint) -> u32 {
        match endpoint {
            Endpoint::Feedback => self.feedback_limit,
            Endpoint::Relay => self.relay_limit,
        }
    }

    fn quota_key(&self, endpoint: Endpoint, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        let identity = match (endpoint, &self.feedback_identity) {
            (Endpoint::Feedback, IdentityMode::Fixed(key)) => key.clone(),
            _ => caller_address(headers, peer),
        };
        format!("{}:{}", endpoint.as_str(), identity)
    }

    async fn complete(
        &self,
        api_key: &str,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse, UpstreamError> {
        let start = Instant::now();
        let result = self.provider.create_completion(api_key, req).await;
        self.metrics
            .observe_upstream_ms(start.elapsed().as_millis() as u64);
        result
    }
}

/// Build state from environment variables.  See [`AppConfig::from_env`]
/// for the variables read.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    AppState::from_config(config)
}

/// Build the Axum router.  Business routes accept every method so the
/// guard, not the router, answers preflight and 405.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    let router = Router::new()
        .route("/api/synonyms", any(relay_handler))
        .route("/.netlify/functions/synonyms", any(relay_handler))
        .route("/api/feedback", any(feedback_handler))
        .route("/.netlify/functions/feedback", any(feedback_handler))
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler));

    let router = if let Some(limit) = max_request_bytes {
        router.layer(DefaultBodyLimit::max(limit))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

enum Admission {
    Preflight,
    Proceed { api_key: String },
}

/// Method guard, quota and configuration check, in that order.
async fn admit(
    state: &AppState,
    endpoint: Endpoint,
    method: &Method,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Result<Admission, GatewayError> {
    match classify_method(method) {
        MethodDecision::Preflight => return Ok(Admission::Preflight),
        MethodDecision::Reject => return Err(GatewayError::MethodNotAllowed),
        MethodDecision::Proceed => {}
    }

    state.metrics.request(endpoint);
    let limit = state.limit_for(endpoint);
    let key = state.quota_key(endpoint, headers, peer);
    if let QuotaDecision::Denied { retry_after } = state.quota.check_and_increment(&key, limit).await {
        tracing::info!(endpoint = endpoint.as_str(), key = %key, limit, "quota exhausted");
        return Err(GatewayError::RateLimited {
            message: endpoint.rate_limit_message(limit),
            retry_after,
        });
    }

    match state.api_key.as_deref() {
        Some(key) => Ok(Admission::Proceed {
            api_key: key.to_string(),
        }),
        None => {
            tracing::error!(endpoint = endpoint.as_str(), "upstream API key is not configured");
            Err(GatewayError::Configuration)
        }
    }
}

fn check_content(state: &AppState, endpoint: Endpoint, text: &str) -> Result<(), GatewayError> {
    if let Some(category) = state.filter.first_match(text) {
        tracing::info!(endpoint = endpoint.as_str(), category = %category, "content rejected");
        return Err(GatewayError::ContentRejected {
            category: category.to_string(),
        });
    }
    Ok(())
}

fn json_body<T>(
    state: &AppState,
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, GatewayError> {
    match payload {
        Ok(Json(inner)) => Ok(inner),
        Err(JsonRejection::BytesRejection(BytesRejection::FailedToBufferBody(
            FailedToBufferBody::LengthLimitError(_),
        ))) => {
            tracing::warn!(limit = ?state.max_request_bytes, "request body exceeded configured limit");
            let message = match state.max_request_bytes {
                Some(limit) => format!("Request too large (body exceeded limit {} bytes)", limit),
                None => "Request too large".to_string(),
            };
            Err(GatewayError::PayloadTooLarge(message))
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "unreadable request body");
            Err(GatewayError::Validation("Invalid request body".into()))
        }
    }
}

/// Turn a rejection into a response, logging and counting it.
fn reject(state: &AppState, endpoint: Endpoint, err: GatewayError) -> Response {
    state.metrics.rejection(&err);
    if let GatewayError::Upstream { source, .. } = &err {
        tracing::error!(endpoint = endpoint.as_str(), error = %source, "upstream call failed");
    } else {
        tracing::debug!(endpoint = endpoint.as_str(), kind = err.kind(), "request rejected");
    }
    err.into_response()
}

fn finish(
    state: &AppState,
    endpoint: Endpoint,
    headers: &HeaderMap,
    outcome: Result<Response, GatewayError>,
) -> Response {
    let mut resp = match outcome {
        Ok(resp) => resp,
        Err(err) => reject(state, endpoint, err),
    };
    state.cors.apply(headers, resp.headers_mut());
    resp
}

fn preflight(state: &AppState) -> Response {
    state.metrics.preflight_total.fetch_add(1, Ordering::Relaxed);
    (StatusCode::OK, "").into_response()
}

/// Handler for the synonym relay.  Forwards the caller's messages and
/// returns the provider's completion object as is.
async fn relay_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<RelayRequest>, JsonRejection>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    let outcome = relay(&state, &method, &headers, peer, payload).await;
    finish(&state, Endpoint::Relay, &headers, outcome)
}

async fn relay(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    payload: Result<Json<RelayRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let api_key = match admit(state, Endpoint::Relay, method, headers, peer).await? {
        Admission::Preflight => return Ok(preflight(state)),
        Admission::Proceed { api_key } => api_key,
    };

    let mut body = json_body(state, payload)?;
    let messages = body
        .messages
        .take()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| GatewayError::Validation("Messages are required".into()))?;
    for message in &messages {
        if let Some(content) = message.content.as_deref() {
            check_content(state, Endpoint::Relay, content)?;
        }
    }

    let req = body.into_completion_request(messages);
    tracing::debug!(model = %req.model, messages = req.messages.len(), "relaying completion");
    let resp = state
        .complete(&api_key, &req)
        .await
        .map_err(|source| GatewayError::Upstream {
            message: Endpoint::Relay.failure_message(),
            source,
        })?;
    if let Some(usage) = &resp.usage {
        tracing::debug!(
            model = ?resp.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "completion relayed"
        );
    }
    Ok((StatusCode::OK, Json(resp.body)).into_response())
}

/// Handler for feedback submissions.  Replies with a short acknowledgment
/// and leaves categorization to a detached task.
async fn feedback_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<FeedbackSubmission>, JsonRejection>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    let outcome = feedback(&state, &method, &headers, peer, payload).await;
    finish(&state, Endpoint::Feedback, &headers, outcome)
}

async fn feedback(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    payload: Result<Json<FeedbackSubmission>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let api_key = match admit(state, Endpoint::Feedback, method, headers, peer).await? {
        Admission::Preflight => return Ok(preflight(state)),
        Admission::Proceed { api_key } => api_key,
    };

    let submission = json_body(state, payload)?;
    let text = submission
        .text()
        .map(str::to_owned)
        .ok_or_else(|| GatewayError::Validation("Feedback is required".into()))?;
    check_content(state, Endpoint::Feedback, &text)?;

    let reply = state
        .complete(&api_key, &acknowledgment_request(&text))
        .await
        .and_then(|resp| resp.trimmed_content().map(str::to_owned))
        .map_err(|source| GatewayError::Upstream {
            message: Endpoint::Feedback.failure_message(),
            source,
        })?;

    // Detached: the handle is dropped and the reply goes out immediately.
    spawn_categorization(CategorizationJob {
        provider: state.provider.clone(),
        sink: state.sink.clone(),
        metrics: state.metrics.clone(),
        api_key,
        submission,
        feedback: text,
        response_sent: reply.clone(),
    });

    Ok((
        StatusCode::OK,
        Json(FeedbackResponse {
            response: reply,
            feedback_type: FeedbackCategory::GeneralFeedback,
        }),
    )
        .into_response())
}

/// Simple health endpoint for container readiness / liveness checks.
async fn healthz_handler(State(state): State<AppState>) -> Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "filterRules": state.filter.len(),
        "upstreamConfigured": state.api_key.is_some(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.render(),
    )
        .into_response()
}
