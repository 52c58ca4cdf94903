#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wordgate::feedback::CATEGORIZATION_SYSTEM_PROMPT;
use wordgate::sink::MemorySink;
use wordgate::upstream::{
    CompletionProvider, CompletionRequest, CompletionResponse, UpstreamError,
};
use wordgate::{AppConfig, AppState};

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// How the stub answers.
#[derive(Clone)]
pub enum StubMode {
    /// Acknowledge with `reply`, categorize with `category`.
    Answer { reply: String, category: String },
    /// Acknowledge normally but fail the categorization call.
    FailCategorization { reply: String },
    /// Every call fails with this HTTP status and body.
    Fail { status: u16, body: String },
}

/// In-process upstream that records every request it receives.
pub struct StubProvider {
    mode: StubMode,
    calls: Mutex<Vec<(String, CompletionRequest)>>,
}

impl StubProvider {
    pub fn answering(reply: &str, category: &str) -> Arc<Self> {
        Arc::new(Self {
            mode: StubMode::Answer {
                reply: reply.into(),
                category: category.into(),
            },
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_mode(mode: StubMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, CompletionRequest)> {
        self.calls.lock().unwrap().clone()
    }
}

fn completion(content: &str) -> CompletionResponse {
    CompletionResponse::from_value(serde_json::json!({
        "id": "chatcmpl-stub",
        "object": "chat.completion",
        "model": "gpt-3.5-turbo-0125",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .unwrap()
}

fn is_categorization(req: &CompletionRequest) -> bool {
    req.messages
        .first()
        .and_then(|m| m.content.as_deref())
        .map(|c| c == CATEGORIZATION_SYSTEM_PROMPT)
        .unwrap_or(false)
}

#[async_trait::async_trait]
impl CompletionProvider for StubProvider {
    async fn create_completion(
        &self,
        api_key: &str,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse, UpstreamError> {
        self.calls
            .lock()
            .unwrap()
            .push((api_key.to_string(), req.clone()));
        match &self.mode {
            StubMode::Answer { reply, category } => {
                if is_categorization(req) {
                    Ok(completion(category))
                } else {
                    Ok(completion(reply))
                }
            }
            StubMode::FailCategorization { reply } => {
                if is_categorization(req) {
                    Err(UpstreamError::Status {
                        status: 503,
                        body: "overloaded".into(),
                    })
                } else {
                    Ok(completion(reply))
                }
            }
            StubMode::Fail { status, body } => Err(UpstreamError::Status {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

/// Default configuration with a key set, wired to `provider` and `sink`.
pub fn state_with(provider: Arc<StubProvider>, sink: &MemorySink) -> AppState {
    let config = AppConfig {
        api_key: Some("sk-test".into()),
        ..AppConfig::default()
    };
    AppState::from_config(config)
        .unwrap()
        .with_provider(provider)
        .with_sink(Arc::new(sink.clone()))
}

/// Poll the sink until it holds `n` records or a second has passed.
pub async fn wait_for_records(sink: &MemorySink, n: usize) {
    for _ in 0..100 {
        if sink.records().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
