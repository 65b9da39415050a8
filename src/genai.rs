use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::Value;

use crate::narrate::{self, Narration, NoAudioData};
use crate::retry::RetryPolicy;
use crate::translate::{self, Direction};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash-preview-05-20";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Kore";

/// Translation and narration as seen by the chapter pipeline.
#[async_trait]
pub trait ChapterAdapter: Send + Sync {
    async fn translate(&self, text: &str, direction: Direction) -> anyhow::Result<String>;
    async fn narrate(&self, text: &str) -> anyhow::Result<Narration>;
}

#[derive(Debug, Clone)]
pub struct GenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub speech_model: String,
    pub voice: String,
    pub retry: RetryPolicy,
}

impl GenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            text_model: DEFAULT_TEXT_MODEL.to_owned(),
            speech_model: DEFAULT_SPEECH_MODEL.to_owned(),
            voice: DEFAULT_VOICE.to_owned(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
        if api_key.trim().is_empty() {
            anyhow::bail!("GEMINI_API_KEY is empty");
        }

        let mut config = Self::new(api_key.trim());
        if let Some(base_url) = non_empty_env("NOVELVOICE_GEMINI_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = non_empty_env("NOVELVOICE_TEXT_MODEL") {
            config.text_model = model;
        }
        if let Some(model) = non_empty_env("NOVELVOICE_SPEECH_MODEL") {
            config.speech_model = model;
        }
        if let Some(voice) = non_empty_env("NOVELVOICE_VOICE") {
            config.voice = voice;
        }
        if let Some(raw) = non_empty_env("NOVELVOICE_RETRY_ATTEMPTS") {
            let attempts = raw
                .parse::<usize>()
                .with_context(|| format!("invalid NOVELVOICE_RETRY_ATTEMPTS={raw:?}"))?;
            config.retry = RetryPolicy::new(attempts, config.retry.delay);
        }
        if let Some(raw) = non_empty_env("NOVELVOICE_RETRY_DELAY_MS") {
            let delay_ms = raw
                .parse::<u64>()
                .with_context(|| format!("invalid NOVELVOICE_RETRY_DELAY_MS={raw:?}"))?;
            config.retry = RetryPolicy::new(config.retry.attempts, Duration::from_millis(delay_ms));
        }
        Ok(config)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub fn generate_content_endpoint(base_url: &str, model: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/models/{model}:generateContent")
}

/// POSTs a `generateContent` request; a 2xx body that is not JSON comes back as `Null`.
pub async fn generate_content(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    body: &Value,
) -> anyhow::Result<Value> {
    let response = client
        .post(endpoint)
        .header("x-goog-api-key", api_key)
        .json(body)
        .send()
        .await
        .with_context(|| format!("POST {endpoint}"))?;

    let status = response.status();
    let raw = response.text().await.context("read Gemini response body")?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
        anyhow::bail!("Gemini API error ({status}): {message}");
    }

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(%err, "Gemini response is not JSON");
            Ok(Value::Null)
        }
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

pub fn first_part_text(response: &Value) -> Option<&str> {
    response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
}

pub fn first_part_inline_data(response: &Value) -> Option<&str> {
    response
        .pointer("/candidates/0/content/parts/0/inlineData/data")
        .and_then(Value::as_str)
}

pub struct GeminiAdapter {
    client: reqwest::Client,
    config: GenAiConfig,
}

impl GeminiAdapter {
    pub fn new(config: GenAiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("build Gemini http client")?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: GenAiConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &GenAiConfig {
        &self.config
    }
}

#[async_trait]
impl ChapterAdapter for GeminiAdapter {
    async fn translate(&self, text: &str, direction: Direction) -> anyhow::Result<String> {
        let endpoint = generate_content_endpoint(&self.config.base_url, &self.config.text_model);
        let body = translate::text_request(&direction.prompt(text));

        tracing::debug!(direction = direction.label(), chars = text.chars().count(), "translate");
        let response = self
            .config
            .retry
            .run(direction.label(), || {
                generate_content(&self.client, &endpoint, &self.config.api_key, &body)
            })
            .await?;

        Ok(translate::text_or_input(&response, text, direction))
    }

    async fn narrate(&self, text: &str) -> anyhow::Result<Narration> {
        let endpoint = generate_content_endpoint(&self.config.base_url, &self.config.speech_model);
        let body = narrate::speech_request(text, &self.config.voice);

        tracing::debug!(voice = %self.config.voice, chars = text.chars().count(), "narrate");
        let response = self
            .config
            .retry
            .run("narrate", || {
                generate_content(&self.client, &endpoint, &self.config.api_key, &body)
            })
            .await?;

        let payload = first_part_inline_data(&response).ok_or(NoAudioData)?;
        let pcm = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|_| NoAudioData)?;
        if pcm.len() < 2 {
            return Err(NoAudioData.into());
        }

        let wav = narrate::pcm16_to_wav(&pcm).context("encode narration as WAV")?;
        Ok(Narration {
            wav,
            filename: narrate::audio_filename(chrono::Utc::now()),
        })
    }
}
