pub mod error;

pub use error::{SummaryError, SummaryResult};

use analysis_core::{AnalysisResult, ChatTurn, Summarizer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

const SYSTEM_PROMPT: &str = "You review tokens issued on the XRP Ledger. \
Use only the DATA provided and never invent metrics. Point out missing data and keep claims tentative. \
Answer in 5-10 short bullets covering issuer flags and risks (freeze, master key), AMM liquidity and fee, \
holder concentration, order book depth, price trend when a sparkline is present, and red flags. \
Finish with one line labelled Good, Speculative or High Risk with a short reason, \
then a one-line reminder that the data may be incomplete and this is not financial advice.";

/// Follow-up conversations keep only this many prior turns
pub const MAX_HISTORY_TURNS: usize = 6;

/// Configuration for the chat-completions endpoint
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string()),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

/// Assistant message; providers send `"content": null` for empty replies
#[derive(Debug, Clone, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat client used to summarise analysis reports
#[derive(Clone)]
pub struct SummaryClient {
    client: reqwest::Client,
    config: SummaryConfig,
}

impl SummaryClient {
    pub fn new(config: SummaryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, config }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> SummaryResult<Option<String>> {
        if !self.is_enabled() {
            return Err(SummaryError::Disabled);
        }

        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature,
            max_tokens,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SummaryError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }

        let body = response.json::<CompletionResponse>().await?;
        let content = first_content(body);
        tracing::info!(
            duration_ms = started.elapsed().as_millis() as u64,
            has_content = content.is_some(),
            "ai.ok"
        );
        Ok(content)
    }
}

fn first_content(body: CompletionResponse) -> Option<String> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
}

fn data_message(report: &Value) -> ChatMessage {
    ChatMessage::new("user", format!("DATA:\n{}", report))
}

/// System prompt, data, the last [`MAX_HISTORY_TURNS`] turns, then the question
pub fn follow_up_messages(report: &Value, history: &[ChatTurn], question: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new("system", SYSTEM_PROMPT), data_message(report)];

    let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
    for turn in &history[skip..] {
        let role = if turn.from == "ai" { "assistant" } else { "user" };
        messages.push(ChatMessage::new(role, turn.text.clone()));
    }

    messages.push(ChatMessage::new("user", format!("Follow-up: {}", question)));
    messages
}

#[async_trait]
impl Summarizer for SummaryClient {
    async fn summarize(&self, report: &Value) -> AnalysisResult<Option<String>> {
        if !self.is_enabled() {
            tracing::debug!("ai.disabled");
            return Ok(None);
        }
        let messages = [ChatMessage::new("system", SYSTEM_PROMPT), data_message(report)];
        Ok(self.complete(&messages, 0.4, 500).await?)
    }

    async fn follow_up(
        &self,
        report: &Value,
        history: &[ChatTurn],
        question: &str,
    ) -> AnalysisResult<String> {
        let messages = follow_up_messages(report, history, question);
        Ok(self.complete(&messages, 0.5, 400).await?.unwrap_or_default())
    }
}
