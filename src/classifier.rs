//! Optional external content classifier
//!
//! Requests go through a bounded queue to a single worker task, which calls
//! the backend with retries. Callers wait on a reply channel for at most
//! `max_wait`; anything that goes wrong yields an unsafe verdict, which only
//! sends the post to the flagged queue.

use crate::app_config::AiModerationConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub is_safe: bool,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "no reason provided".to_string()
}

impl Verdict {
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            reason: String::new(),
        }
    }

    pub fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug)]
pub enum BackendError {
    /// HTTP 429. Retried with exponential backoff.
    RateLimited,
    /// Any other non-success status.
    Status(u16),
    Transport(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::RateLimited => write!(f, "rate limited"),
            BackendError::Status(code) => write!(f, "API error: {}", code),
            BackendError::Transport(e) => write!(f, "request failed: {}", e),
        }
    }
}

impl std::error::Error for BackendError {}

#[async_trait]
pub trait ModerationBackend: Send + Sync {
    async fn check(&self, text: &str) -> Result<Verdict, BackendError>;
}

/// OpenAI-compatible chat completions backend.
pub struct HttpModerationBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl HttpModerationBackend {
    pub fn new(config: &AiModerationConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn prompt(text: &str) -> String {
        format!(
            "You moderate a school forum. Reject adult sexual content, illegal \
             activity such as drugs or gambling, political content, and \
             discrimination by sex or race. Analyze this post: '{}'\n\n\
             Return JSON with this schema:\n\
             {{\"is_safe\": boolean, \"category\": \"safe\" | \"political\" | \
             \"illegal\" | \"discrimination\", \"reason\": \"short explanation\"}}",
            text
        )
    }
}

#[async_trait]
impl ModerationBackend for HttpModerationBackend {
    async fn check(&self, text: &str) -> Result<Verdict, BackendError> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": Self::prompt(text) }],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();

        // A malformed answer is final, not retried.
        Ok(serde_json::from_str::<Verdict>(content).unwrap_or_else(|_| {
            Verdict::unsafe_because("invalid JSON response from classifier")
        }))
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// First wait after a 429; doubles on each further 429.
    pub initial_backoff: Duration,
    /// Wait after any other failure.
    pub error_pause: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AiModerationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_secs(2),
            error_pause: Duration::from_secs(1),
        }
    }
}

async fn check_with_retries(
    backend: &dyn ModerationBackend,
    text: &str,
    policy: &RetryPolicy,
) -> Verdict {
    let mut backoff = policy.initial_backoff;

    for attempt in 0..=policy.max_retries {
        match backend.check(text).await {
            Ok(verdict) => return verdict,
            Err(BackendError::RateLimited) => {
                log::warn!("Classifier rate limited, cooling down for {:?}", backoff);
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                continue;
            }
            Err(e) => {
                log::warn!("Classifier attempt {} failed: {}", attempt + 1, e);
                if attempt == policy.max_retries {
                    return Verdict::unsafe_because(e.to_string());
                }
            }
        }
        tokio::time::sleep(policy.error_pause).await;
    }

    Verdict::unsafe_because("moderation failed after retries")
}

struct Job {
    text: String,
    reply: oneshot::Sender<Verdict>,
}

/// Handle to the classifier worker. Cheap to clone.
#[derive(Clone)]
pub struct ContentClassifier {
    tx: mpsc::Sender<Job>,
    max_wait: Duration,
}

impl ContentClassifier {
    /// Start the worker task on the current runtime.
    pub fn spawn(
        backend: Arc<dyn ModerationBackend>,
        policy: RetryPolicy,
        queue_capacity: usize,
        max_wait: Duration,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_capacity.max(1));

        actix_web::rt::spawn(async move {
            while let Some(job) = rx.recv().await {
                // The caller already gave up.
                if job.reply.is_closed() {
                    continue;
                }
                let verdict = check_with_retries(backend.as_ref(), &job.text, &policy).await;
                let _ = job.reply.send(verdict);
            }
            log::debug!("Classifier worker stopped");
        });

        Self { tx, max_wait }
    }

    pub fn from_config(config: &AiModerationConfig) -> Result<Self, reqwest::Error> {
        let backend = HttpModerationBackend::new(config)?;
        Ok(Self::spawn(
            Arc::new(backend),
            RetryPolicy::from_config(config),
            config.queue_capacity,
            Duration::from_secs(config.max_wait_seconds),
        ))
    }

    /// Queue `text` and wait for its verdict, queue time included.
    pub async fn classify(&self, text: &str) -> Verdict {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            text: text.to_owned(),
            reply,
        };

        let wait = async {
            self.tx.send(job).await.ok()?;
            rx.await.ok()
        };

        match tokio::time::timeout(self.max_wait, wait).await {
            Ok(Some(verdict)) => verdict,
            Ok(None) => {
                log::warn!("Classifier worker is not running");
                Verdict::unsafe_because("moderation unavailable")
            }
            Err(_) => {
                log::warn!("Classifier gave no verdict within {:?}", self.max_wait);
                Verdict::unsafe_because("moderation timed out")
            }
        }
    }
}
