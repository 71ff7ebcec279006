//! Natural-language toss parsing.
//!
//! The parser is an external capability: it turns a free-form prompt
//! into `{topic, options, stake}` or a structured error. Two adapters
//! ship here: a deterministic rule-based parser (always available) and
//! an LLM adapter for an OpenAI-compatible endpoint. The LLM proposes,
//! the code validates; a model answer that fails validation is a
//! `ParseError`, never a panic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tossbot_types::UsdcAmount;

/// A successfully parsed toss prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToss {
    pub topic: String,
    pub options: [String; 2],
    pub stake: UsdcAmount,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// The toss-parser capability.
#[async_trait]
pub trait TossParser: Send + Sync {
    async fn parse(&self, prompt: &str) -> Result<ParsedToss, ParseError>;
}

// ======================================================================
// Rule-based parser (deterministic fallback)
// ======================================================================

/// Deterministic parser for prompts like
/// `"Lakers vs Celtics for 1.0"` or `"rain tomorrow"`.
///
/// Rules: a trailing `for <amount>` clause sets the stake (default
/// 0.1); `<a> vs <b>` names the two options (default yes/no); the
/// remaining text is the topic.
#[derive(Default)]
pub struct RuleBasedParser;

impl RuleBasedParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TossParser for RuleBasedParser {
    async fn parse(&self, prompt: &str) -> Result<ParsedToss, ParseError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ParseError::new("tell me what the toss is about"));
        }

        let (body, stake) = split_stake_clause(prompt);
        if body.is_empty() {
            return Err(ParseError::new("tell me what the toss is about"));
        }
        let options = extract_versus_options(body)
            .unwrap_or_else(|| ["yes".to_string(), "no".to_string()]);

        validate(ParsedToss { topic: body.to_string(), options, stake })
    }
}

/// Split a trailing `for <amount>` clause off the prompt.
fn split_stake_clause(prompt: &str) -> (&str, UsdcAmount) {
    let words: Vec<&str> = prompt.split_whitespace().collect();
    if words.len() >= 2 && words[words.len() - 2].eq_ignore_ascii_case("for") {
        let raw = words[words.len() - 1].trim_start_matches('$');
        if let Ok(stake) = UsdcAmount::from_decimal_str(raw) {
            let clause_start = prompt
                .to_ascii_lowercase()
                .rfind(" for ")
                .unwrap_or(prompt.len());
            return (prompt[..clause_start].trim_end(), stake);
        }
    }
    (prompt, UsdcAmount::DEFAULT_STAKE)
}

/// `"... A vs B ..."` → `Some([A, B])`, using the words adjacent to the
/// separator.
fn extract_versus_options(text: &str) -> Option<[String; 2]> {
    let lower = text.to_ascii_lowercase();
    let at = lower.find(" vs ").or_else(|| lower.find(" vs. "))?;
    let separator_len = if lower[at..].starts_with(" vs. ") { 5 } else { 4 };

    let left = text[..at].split_whitespace().last()?;
    let right = text[at + separator_len..].split_whitespace().next()?;
    let clean = |s: &str| s.trim_matches(|c: char| !c.is_alphanumeric()).to_string();
    let (a, b) = (clean(left), clean(right));
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some([a, b])
}

/// Shared validation applied to every parser's output.
fn validate(parsed: ParsedToss) -> Result<ParsedToss, ParseError> {
    if parsed.stake.is_zero() {
        return Err(ParseError::new("the stake must be greater than zero"));
    }
    if parsed.stake > UsdcAmount::MAX_STAKE {
        return Err(ParseError::new(format!(
            "the stake can be at most {}",
            UsdcAmount::MAX_STAKE.to_display_string()
        )));
    }
    if parsed.options[0].eq_ignore_ascii_case(&parsed.options[1]) {
        return Err(ParseError::new("the two options must be different"));
    }
    Ok(parsed)
}

// ======================================================================
// LLM parser (OpenAI-compatible endpoint)
// ======================================================================

/// Configuration for the LLM parser adapter.
#[derive(Debug, Clone)]
pub struct LlmParserConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl LlmParserConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// JSON-mode LLM adapter for the toss-parser capability.
pub struct LlmParser {
    config: LlmParserConfig,
    client: reqwest::Client,
}

const SYSTEM_PROMPT: &str = "You turn a chat message into a wager definition. \
Reply with JSON only: {\"topic\": string, \"options\": [string, string], \"amount\": string}. \
The amount is a decimal USDC stake between 0 and 10; use \"0.1\" when none is given. \
Use [\"yes\", \"no\"] when no options are named.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: serde_json::Value,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ModelToss {
    topic: String,
    options: Vec<String>,
    amount: String,
}

impl LlmParser {
    pub fn new(config: LlmParserConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    fn parse_model_output(content: &str) -> Result<ParsedToss, ParseError> {
        let model: ModelToss = serde_json::from_str(content)
            .map_err(|_| ParseError::new("I could not understand that toss; try 'A vs B for 1.0'"))?;
        let [a, b]: [String; 2] = model
            .options
            .try_into()
            .map_err(|_| ParseError::new("a toss needs exactly two options"))?;
        let stake = UsdcAmount::from_decimal_str(&model.amount)
            .map_err(|e| ParseError::new(e.to_string()))?;
        validate(ParsedToss { topic: model.topic, options: [a, b], stake })
    }
}

#[async_trait]
impl TossParser for LlmParser {
    async fn parse(&self, prompt: &str) -> Result<ParsedToss, ParseError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            response_format: serde_json::json!({"type": "json_object"}),
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ParseError::new(format!("toss parser unavailable: {e}")))?;

        if !response.status().is_success() {
            return Err(ParseError::new(format!(
                "toss parser unavailable: {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ParseError::new(format!("toss parser unavailable: {e}")))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ParseError::new("toss parser returned no answer"))?;

        Self::parse_model_output(content)
    }
}
