// src/classify/llm.rs
//! LLM client abstraction: prompt in, raw completion text out.
//!
//! `OpenAiClient` talks to any chat-completions compatible endpoint in JSON-object mode.
//! `RetryLlm` wraps a client with capped exponential backoff plus jitter.
//! `ScriptedLlm` replays canned completions for tests and dry runs.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use metrics::counter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub type LlmFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

pub trait LlmClient: Send + Sync {
    /// One chat call. Returns the completion content verbatim.
    fn complete<'a>(&'a self, prompt: &'a str) -> LlmFuture<'a>;
    fn provider_name(&self) -> &'static str;
}

pub type DynLlm = Arc<dyn LlmClient>;

// ------------------------------------------------------------
// OpenAI-compatible chat completions
// ------------------------------------------------------------

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hangar-watch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("building llm http client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: 0.1,
        })
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            response_format: ResponseFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("llm request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("llm API error ({status}): {body}"));
        }
        let body: Resp = resp.json().await.context("decoding llm response")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow!("llm returned no content"))
    }
}

impl LlmClient for OpenAiClient {
    fn complete<'a>(&'a self, prompt: &'a str) -> LlmFuture<'a> {
        Box::pin(self.chat(prompt))
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Retry decorator
// ------------------------------------------------------------

pub struct RetryLlm<C: LlmClient> {
    inner: C,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<C: LlmClient> RetryLlm<C> {
    pub fn new(inner: C, max_retries: usize) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// `base * 2^(attempt-1)`, capped, plus up to a quarter of that as jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16));
        let capped = exp.min(self.max_delay);
        let jitter_ms = (capped.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    async fn complete_with_retry(&self, prompt: &str) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            match self.inner.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if (attempt as usize) < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        error = ?e,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "llm call failed, retrying"
                    );
                    counter!("llm_retries_total", "provider" => self.inner.provider_name())
                        .increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(e.context(format!("llm failed after {} attempt(s)", attempt + 1)))
                }
            }
        }
    }
}

impl<C: LlmClient> LlmClient for RetryLlm<C> {
    fn complete<'a>(&'a self, prompt: &'a str) -> LlmFuture<'a> {
        Box::pin(self.complete_with_retry(prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

// ------------------------------------------------------------
// Scripted client for tests/local runs
// ------------------------------------------------------------

/// Replays queued completions in order. An `Err` entry simulates a transport failure;
/// an exhausted queue fails every further call.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    /// A well-formed `{"results": [...]}` completion from the given objects.
    pub fn reply_results(self, results: Vec<serde_json::Value>) -> Self {
        let text = serde_json::json!({ "results": results }).to_string();
        self.reply(text)
    }

    fn push(&self, entry: std::result::Result<String, String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(entry);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LlmClient for ScriptedLlm {
    fn complete<'a>(&'a self, prompt: &'a str) -> LlmFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        Box::pin(async move {
            match next {
                Some(Ok(text)) => Ok(text),
                Some(Err(msg)) => Err(anyhow!(msg)),
                None => {
                    debug!("scripted llm exhausted");
                    Err(anyhow!("no scripted reply left"))
                }
            }
        })
    }
    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

impl LlmClient for Arc<ScriptedLlm> {
    fn complete<'a>(&'a self, prompt: &'a str) -> LlmFuture<'a> {
        self.as_ref().complete(prompt)
    }
    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replays_in_order_then_fails() {
        let llm = ScriptedLlm::new().reply("a").fail("boom").reply("b");
        assert_eq!(llm.complete("p1").await.unwrap(), "a");
        assert!(llm.complete("p2").await.is_err());
        assert_eq!(llm.complete("p3").await.unwrap(), "b");
        assert!(llm.complete("p4").await.is_err());
        assert_eq!(llm.calls(), 4);
        assert_eq!(llm.prompts()[1], "p2");
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let inner = Arc::new(ScriptedLlm::new().fail("503").fail("timeout").reply("ok"));
        let llm = RetryLlm::new(inner.clone(), 2).with_delays(Duration::ZERO, Duration::ZERO);
        assert_eq!(llm.complete("p").await.unwrap(), "ok");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_budget() {
        let inner = Arc::new(ScriptedLlm::new().fail("1").fail("2").reply("late"));
        let llm = RetryLlm::new(inner.clone(), 1).with_delays(Duration::ZERO, Duration::ZERO);
        assert!(llm.complete("p").await.is_err());
        assert_eq!(inner.calls(), 2);
    }

    #[test]
    fn backoff_is_capped() {
        let llm = RetryLlm::new(ScriptedLlm::new(), 5)
            .with_delays(Duration::from_millis(100), Duration::from_millis(300));
        assert!(llm.backoff(1) >= Duration::from_millis(100));
        assert!(llm.backoff(1) <= Duration::from_millis(125));
        assert!(llm.backoff(10) <= Duration::from_millis(375));
        assert!(llm.backoff(10) >= Duration::from_millis(300));
    }
}
