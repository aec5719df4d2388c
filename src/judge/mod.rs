pub mod http;
pub mod prompt;
pub mod retry;
pub mod types;

use crate::artifact::sniff_image;
use crate::config::{self, Scoring};
use crate::manifest::Sample;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use http::{Credentials, HttpTransport, normalize_api_base};
pub use retry::{Backoff, RetryPolicy, Step};
pub use types::{ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl, MessageContent};

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("artifact missing or undecodable: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("transient judge failure: {message}")]
    Transient {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("judge request rejected (HTTP {status}): {message}")]
    Request { status: u16, message: String },

    #[error("judge retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("malformed judge output: {message}")]
    MalformedOutput { message: String, raw: String },
}

impl JudgeError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, JudgeError::Transient { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            JudgeError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// One chat-completions round trip. Implementations must be stateless
/// across calls so that workers can share a single transport.
pub trait Transport: Sync {
    fn complete(&self, req: &ChatRequest) -> Result<String, JudgeError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn complete(&self, req: &ChatRequest) -> Result<String, JudgeError> {
        (**self).complete(req)
    }
}

#[derive(Debug, Clone)]
pub struct JudgeSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub include_source_image: bool,
    pub include_reasoning_image: bool,
    pub scoring: Scoring,
}

impl JudgeSettings {
    pub fn from_config(cfg: &config::Config) -> Self {
        Self {
            model: cfg.judge.model.clone(),
            temperature: cfg.judge.temperature,
            max_tokens: cfg.judge.max_tokens,
            include_source_image: cfg.judge.include_source_image,
            include_reasoning_image: cfg.judge.include_reasoning_image,
            scoring: cfg.scoring.clone(),
        }
    }
}

pub struct JudgeClient<T: Transport> {
    transport: T,
    settings: JudgeSettings,
    retry: RetryPolicy,
}

impl<T: Transport> JudgeClient<T> {
    pub fn new(transport: T, settings: JudgeSettings, retry: RetryPolicy) -> Self {
        Self {
            transport,
            settings,
            retry,
        }
    }

    pub fn settings(&self) -> &JudgeSettings {
        &self.settings
    }

    /// Reads and encodes every image the sample needs. Fails with
    /// `ArtifactMissing` before anything touches the network.
    pub fn build_request(
        &self,
        sample: &Sample,
        generated: Option<&Path>,
        expected: &Path,
    ) -> Result<ChatRequest, JudgeError> {
        let generated = generated.ok_or_else(|| JudgeError::ArtifactMissing {
            path: expected.to_path_buf(),
        })?;

        let mut images: Vec<(&str, &Path)> = Vec::new();
        if self.settings.include_source_image
            && let Some(src) = sample.source_image.as_deref()
        {
            images.push(("the original image", src));
        }
        images.push(("the edited image to evaluate", generated));
        if self.settings.include_reasoning_image
            && let Some(reasoning) = sample.reasoning_image.as_deref()
        {
            images.push(("the reference answer image", reasoning));
        }

        let roles: Vec<&str> = images.iter().map(|(role, _)| *role).collect();
        let mut parts = vec![ContentPart::Text {
            text: prompt::render_user_prompt(sample, &self.settings.scoring, &roles),
        }];
        for (_, path) in &images {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: encode_data_url(path)?,
                },
            });
        }

        Ok(ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: MessageContent::Text(prompt::SYSTEM_PROMPT.into()),
                },
                ChatMessage {
                    role: "user".into(),
                    content: MessageContent::Parts(parts),
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        })
    }

    /// Sends `req`, retrying transient failures per the retry policy.
    pub fn send(&self, index: u64, req: &ChatRequest) -> Result<String, JudgeError> {
        let mut backoff = Backoff::new(self.retry.clone());
        loop {
            match self.transport.complete(req) {
                Ok(text) => {
                    debug!(index, attempts = backoff.attempts() + 1, "judge responded");
                    return Ok(text);
                }
                Err(err) => match backoff.on_failure(err.is_retriable(), err.retry_after()) {
                    Step::Retry(delay) => {
                        warn!(
                            index,
                            attempt = backoff.attempts(),
                            delay_ms = delay.as_millis() as u64,
                            "retrying judge call: {err}"
                        );
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                    Step::GiveUp if err.is_retriable() => {
                        return Err(JudgeError::RetriesExhausted {
                            attempts: backoff.attempts(),
                            last: err.to_string(),
                        });
                    }
                    Step::GiveUp => return Err(err),
                },
            }
        }
    }

    /// Artifact check, request build and retried send for one sample.
    pub fn judge(
        &self,
        sample: &Sample,
        generated: Option<&Path>,
        expected: &Path,
    ) -> Result<String, JudgeError> {
        let req = self.build_request(sample, generated, expected)?;
        self.send(sample.index, &req)
    }
}

fn encode_data_url(path: &Path) -> Result<String, JudgeError> {
    let missing = || JudgeError::ArtifactMissing {
        path: path.to_path_buf(),
    };
    let bytes = std::fs::read(path).map_err(|_| missing())?;
    let kind = sniff_image(&bytes).ok_or_else(missing)?;
    Ok(format!("data:{};base64,{}", kind.mime(), STANDARD.encode(&bytes)))
}
