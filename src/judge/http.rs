use super::{ChatRequest, ChatResponse, JudgeError, Transport};
use crate::config::{self, DEFAULT_BASE_URL};
use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RETRY_AFTER;
use std::fmt;
use std::time::Duration;
use tracing::debug;

const CHAT_COMPLETIONS: &str = "/chat/completions";

/// Resolved endpoint and bearer key. `Debug` never prints the key.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub endpoint: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Credentials {
    pub fn from_env(cfg: &config::Judge) -> Result<Self> {
        Self::resolve(cfg, |name| std::env::var(name).ok())
    }

    /// Same as [`Credentials::from_env`] with an injectable variable lookup.
    pub fn resolve(cfg: &config::Judge, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(&cfg.api_key_env)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("{} is not set in the environment", cfg.api_key_env))?;

        let base = if !cfg.base_url.trim().is_empty() {
            cfg.base_url.clone()
        } else {
            lookup("OPENAI_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        };

        Ok(Self {
            api_key,
            endpoint: normalize_api_base(&base),
        })
    }
}

/// `https://host/v1` -> `https://host/v1/chat/completions`; full endpoints are kept.
pub fn normalize_api_base(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.ends_with(CHAT_COMPLETIONS) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{CHAT_COMPLETIONS}")
    }
}

pub struct HttpTransport {
    client: Client,
    creds: Credentials,
}

impl HttpTransport {
    pub fn new(creds: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("judgebench/", env!("CARGO_PKG_VERSION")))
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self { client, creds })
    }

    pub fn endpoint(&self) -> &str {
        &self.creds.endpoint
    }
}

impl Transport for HttpTransport {
    fn complete(&self, req: &ChatRequest) -> Result<String, JudgeError> {
        debug!(
            endpoint = %self.creds.endpoint,
            model = %req.model,
            images = req.image_count(),
            "POST chat completion"
        );
        let response = self
            .client
            .post(&self.creds.endpoint)
            .bearer_auth(&self.creds.api_key)
            .json(req)
            .send()
            .map_err(|e| JudgeError::Transient {
                status: None,
                message: if e.is_timeout() {
                    format!("request timed out: {e}")
                } else {
                    format!("request failed: {e}")
                },
                retry_after: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, body, retry_after));
        }

        let body: ChatResponse = response.json().map_err(|e| JudgeError::Transient {
            status: Some(status.as_u16()),
            message: format!("undecodable response body: {e}"),
            retry_after: None,
        })?;

        body.first_content()
            .map(str::to_string)
            .ok_or_else(|| JudgeError::Transient {
                status: Some(status.as_u16()),
                message: "response carried no message content".into(),
                retry_after: None,
            })
    }
}

/// 429 and 5xx are retried; every other non-success status is permanent.
pub fn classify_status(status: StatusCode, body: String, retry_after: Option<Duration>) -> JudgeError {
    let message = format!("HTTP {status}: {}", truncate(&body, 500));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        JudgeError::Transient {
            status: Some(status.as_u16()),
            message,
            retry_after,
        }
    } else {
        JudgeError::Request {
            status: status.as_u16(),
            message,
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
