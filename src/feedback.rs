//! Feedback endpoint specifics: the two prompts, the closed category set and
//! the detached categorization task.
//!
//! The client gets its acknowledgment as soon as the first completion
//! returns.  Categorization runs afterwards on its own task; whatever
//! happens there is logged and recorded, never reported back.  If the task
//! never finishes the record is simply never written.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::upstream::{ChatMessage, CompletionProvider, CompletionRequest, DEFAULT_MODEL};
use crate::sink::FeedbackSink;
use crate::Metrics;

pub const ACKNOWLEDGMENT_SYSTEM_PROMPT: &str = "You are a friendly, casual assistant responding to user feedback about an AI thesaurus website called WordCompass.io.

Your job is to give a short, appreciative response that:
- Thanks the user warmly
- Shows you read their feedback
- Is casual and friendly (not formal)
- Does NOT commit to implementing anything specific
- If it's clearly a bug or serious issue, show extra gratitude

Keep responses under 50 words. Be genuine and warm.";

pub const CATEGORIZATION_SYSTEM_PROMPT: &str = "You are analyzing user feedback for an AI thesaurus website.

Categorize the feedback into one of these types:
1. \"bug\" - Technical issues, errors, broken functionality
2. \"feature_request\" - Suggestions for new features or improvements
3. \"general_feedback\" - General comments, praise, or other feedback

Respond with ONLY the category name (bug, feature_request, or general_feedback).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    Bug,
    FeatureRequest,
    GeneralFeedback,
}

impl FeedbackCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCategory::Bug => "bug",
            FeedbackCategory::FeatureRequest => "feature_request",
            FeedbackCategory::GeneralFeedback => "general_feedback",
        }
    }

    /// Read a model answer.  Case, surrounding whitespace, quotes and
    /// trailing punctuation are ignored; anything outside the set is `None`.
    pub fn parse(answer: &str) -> Option<Self> {
        let cleaned = answer
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
            .trim()
            .to_lowercase();
        match cleaned.as_str() {
            "bug" => Some(FeedbackCategory::Bug),
            "feature_request" => Some(FeedbackCategory::FeatureRequest),
            "general_feedback" => Some(FeedbackCategory::GeneralFeedback),
            _ => None,
        }
    }
}

/// Body of a feedback submission.  `feedback` is kept loose so a
/// non-string value is a validation error rather than a parse error.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    pub feedback: Option<serde_json::Value>,
    pub timestamp: Option<String>,
    pub user_agent: Option<String>,
    pub url: Option<String>,
}

impl FeedbackSubmission {
    /// The feedback text when it is a non-blank string.
    pub fn text(&self) -> Option<&str> {
        self.feedback
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .filter(|f| !f.trim().is_empty())
    }
}

/// What the sink receives once the categorization task is done.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    /// Client-supplied timestamp, or the time the record was written.
    pub timestamp: String,
    /// `None` when categorization failed or produced an unknown label.
    pub feedback_type: Option<FeedbackCategory>,
    pub feedback: String,
    pub user_agent: Option<String>,
    pub url: Option<String>,
    pub response_sent: String,
}

pub fn acknowledgment_request(feedback: &str) -> CompletionRequest {
    CompletionRequest {
        model: DEFAULT_MODEL.to_owned(),
        messages: vec![
            ChatMessage::system(ACKNOWLEDGMENT_SYSTEM_PROMPT),
            ChatMessage::user(format!("User feedback: \"{}\"", feedback)),
        ],
        temperature: 0.8,
        max_tokens: 100,
    }
}

pub fn categorization_request(feedback: &str) -> CompletionRequest {
    CompletionRequest {
        model: DEFAULT_MODEL.to_owned(),
        messages: vec![
            ChatMessage::system(CATEGORIZATION_SYSTEM_PROMPT),
            ChatMessage::user(format!("Feedback: \"{}\"", feedback)),
        ],
        temperature: 0.3,
        max_tokens: 20,
    }
}

/// Everything the detached task needs, owned.
pub struct CategorizationJob {
    pub provider: Arc<dyn CompletionProvider>,
    pub sink: Arc<dyn FeedbackSink>,
    pub metrics: Arc<Metrics>,
    pub api_key: String,
    pub submission: FeedbackSubmission,
    pub feedback: String,
    pub response_sent: String,
}

/// Start categorization on its own task.  Callers normally drop the handle;
/// nothing on the response path waits for it.
pub fn spawn_categorization(job: CategorizationJob) -> JoinHandle<()> {
    tokio::spawn(run_categorization(job))
}

async fn run_categorization(job: CategorizationJob) {
    let req = categorization_request(&job.feedback);
    let category = match job.provider.create_completion(&job.api_key, &req).await {
        Ok(resp) => match resp.trimmed_content() {
            Ok(answer) => {
                let parsed = FeedbackCategory::parse(answer);
                if parsed.is_none() {
                    tracing::warn!(answer = %answer, "categorization returned an unknown label");
                }
                parsed
            }
            Err(err) => {
                tracing::error!(error = %err, "background categorization error");
                None
            }
        },
        Err(err) => {
            tracing::error!(error = %err, "background categorization error");
            None
        }
    };

    if category.is_some() {
        job.metrics.feedback_categorized();
    } else {
        job.metrics.feedback_uncategorized();
    }

    let record = FeedbackRecord {
        timestamp: job
            .submission
            .timestamp
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        feedback_type: category,
        feedback: job.feedback,
        user_agent: job.submission.user_agent,
        url: job.submission.url,
        response_sent: job.response_sent,
    };
    job.sink.record(&record).await;
}
