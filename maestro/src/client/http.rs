//! HTTP implementation of [`ChatProvider`].
//!
//! Builder-configured reqwest client for any OpenAI-compatible endpoint.
//! Retryable failures (429 honoring `Retry-After`, 5xx, transport errors)
//! are retried with a fixed backoff ladder; everything else surfaces with
//! its distinct error kind. Cancellation is checked before and after every
//! attempt — an aborted call never retries.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt as _;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::usage::{TokenMeter, Usage};

use super::sse::SseParser;
use super::wire::{ChatCompletionRequest, ChatCompletionResponse, StreamOptions, WireMessage};
use super::{ChatOptions, ChatProvider, ChunkStream, Completion};

/// Maximum retries after the initial attempt.
pub const MAX_RETRIES: u32 = 3;

/// Backoff ladder between attempts.
const BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(8),
];

/// Chat client for an OpenAI-compatible provider.
#[derive(Clone)]
pub struct HttpChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for HttpChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl HttpChatClient {
    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> HttpChatClientBuilder {
        HttpChatClientBuilder::default()
    }

    /// Create a client from environment variables.
    ///
    /// Reads `MAESTRO_API_KEY` (required), `MAESTRO_BASE_URL`, and
    /// `MAESTRO_MODEL`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when `MAESTRO_API_KEY` is not set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("MAESTRO_API_KEY")
            .map_err(|_| Error::auth("MAESTRO_API_KEY environment variable not set"))?;
        let mut builder = Self::builder().api_key(api_key);
        if let Ok(base_url) = std::env::var("MAESTRO_BASE_URL") {
            builder = builder.base_url(base_url);
        }
        if let Ok(model) = std::env::var("MAESTRO_MODEL") {
            builder = builder.model(model);
        }
        builder.build()
    }

    /// The configured default model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(&self, opts: &ChatOptions, stream: bool) -> ChatCompletionRequest {
        let messages: Vec<WireMessage> =
            opts.effective_messages().iter().map(WireMessage::from).collect();
        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: opts.temperature,
            top_p: opts.top_p,
            max_tokens: opts.max_tokens,
            stop: opts.stop.clone(),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    /// Issue one request, classifying failures by status.
    async fn send_once(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let text = response.text().await.unwrap_or_default();
        let mut err = Error::from_status(status.as_u16(), text);
        if let Error::RateLimited { retry_after: slot } = &mut err {
            *slot = retry_after;
        }
        Err(err)
    }

    /// Issue a request under the retry policy.
    async fn send_with_retry(
        &self,
        opts: &ChatOptions,
        body: &ChatCompletionRequest,
    ) -> Result<reqwest::Response> {
        with_retry(&opts.cancel, || self.send_once(body)).await
    }
}

/// Run `attempt` under the retry policy.
///
/// Retries only retryable kinds, waiting `Retry-After` when a rate limit
/// reported one and the backoff ladder otherwise. At most
/// `1 + MAX_RETRIES` attempts are made. Cancellation short-circuits the
/// loop before and after each attempt; an aborted call never retries.
async fn with_retry<T, F, Fut>(cancel: &crate::cancel::CancelToken, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut retries = 0u32;
    loop {
        cancel.check()?;
        let result = attempt().await;
        cancel.check()?;

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retries < MAX_RETRIES => {
                let wait = match &err {
                    Error::RateLimited {
                        retry_after: Some(secs),
                    } => Duration::from_secs(*secs),
                    _ => BACKOFF[retries as usize],
                };
                warn!(
                    attempt = retries + 1,
                    wait_secs = wait.as_secs(),
                    error = %err,
                    "Retrying chat completion",
                );
                tokio::select! {
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    () = tokio::time::sleep(wait) => {}
                }
                retries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[async_trait]
impl ChatProvider for HttpChatClient {
    async fn complete(&self, opts: &ChatOptions) -> Result<Completion> {
        let body = self.build_body(opts, false);
        let response = self.send_with_retry(opts, &body).await?;
        let parsed: ChatCompletionResponse = response.json().await?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = parsed.usage.map_or_else(
            || Usage::new(0, Usage::estimate(&text)),
            |u| Usage::new(u.prompt_tokens, u.completion_tokens),
        );
        TokenMeter::global().record(usage);
        debug!(
            chars = text.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Completion finished",
        );
        Ok(Completion { text, usage })
    }

    async fn stream(&self, opts: &ChatOptions) -> Result<ChunkStream> {
        let body = self.build_body(opts, true);
        let response = self.send_with_retry(opts, &body).await?;
        let parser = SseParser::new(response.bytes_stream().boxed());
        Ok(Box::pin(parser))
    }
}

/// Builder for [`HttpChatClient`].
#[derive(Debug, Default)]
pub struct HttpChatClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

impl HttpChatClientBuilder {
    /// Set the API key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set a custom base URL (proxies, local models, gateways).
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the default model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the request timeout in seconds.
    #[must_use]
    pub const fn timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = Some(timeout);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when no API key was provided, or
    /// [`Error::Internal`] when the HTTP client cannot be constructed.
    pub fn build(self) -> Result<HttpChatClient> {
        let api_key = self.api_key.ok_or_else(|| Error::auth("API key is required"))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let http = builder
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(HttpChatClient {
            http,
            api_key,
            base_url: self
                .base_url
                .map_or_else(|| "https://api.openai.com/v1".to_owned(), |url| {
                    url.trim_end_matches('/').to_owned()
                }),
            model: self.model.unwrap_or_else(|| "gpt-4o-mini".to_owned()),
        })
    }
}
