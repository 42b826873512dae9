//! Rebuttal generation with an OpenAI-compatible chat model.
//!
//! Keeps one conversation per debate: the system prompt, every prompt sent
//! and every reply received.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::DebateError;
use crate::retry::RetryPolicy;

/// Side of the motion the assistant argues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Arguing in favor of the motion.
    For,
    /// Arguing against the motion.
    Against,
}

impl Position {
    pub fn display_name(&self) -> &str {
        match self {
            Position::For => "for",
            Position::Against => "against",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Position {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "for" => Ok(Position::For),
            "against" => Ok(Position::Against),
            other => Err(DebateError::ConfigError(format!(
                "Position must be 'for' or 'against', got '{}'",
                other
            ))),
        }
    }
}

/// The motion under debate and the assistant's side.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DebateContext {
    motion: String,
    position: Position,
}

/// Generates opening arguments and rebuttals.
pub struct RebuttalGenerator {
    api_base: String,
    api_key: String,
    llm: LlmConfig,
    context: Option<DebateContext>,
    first_round: bool,
    history: Vec<ChatCompletionRequestMessage>,
    retry: RetryPolicy,
}

impl RebuttalGenerator {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, llm: LlmConfig) -> Self {
        let history = vec![system_message(&llm.system_prompt)];
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            llm,
            context: None,
            first_round: true,
            history,
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
        }
    }

    /// Start a debate on `motion`, arguing `position`.
    pub fn set_context(&mut self, position: Position, motion: impl Into<String>) {
        self.context = Some(DebateContext {
            motion: motion.into(),
            position,
        });
        self.first_round = true;
    }

    /// Number of messages in the conversation, system prompt included.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Prompt for the next turn.
    ///
    /// An opponent argument always gets a rebuttal. Without one, the first
    /// turn asks for opening arguments and later turns continue the debate.
    pub fn next_prompt(&self, opponent: Option<&str>) -> Result<String, DebateError> {
        let context = self.context.as_ref().ok_or_else(|| {
            DebateError::ConfigError("Debate context is not set".to_string())
        })?;

        let prompt = match opponent.map(str::trim).filter(|s| !s.is_empty()) {
            Some(argument) => format!(
                "Provide counter arguments to the following argument: {}",
                argument
            ),
            None if self.first_round => format!(
                "As the {} side, present your opening arguments for the motion: '{}'",
                context.position, context.motion
            ),
            None => format!("Continue the debate on the motion: '{}'", context.motion),
        };
        Ok(prompt)
    }

    /// Opening arguments for the current motion.
    pub async fn opening(&mut self) -> Result<String, DebateError> {
        self.respond(None).await
    }

    /// Counter `argument`.
    pub async fn rebut(&mut self, argument: &str) -> Result<String, DebateError> {
        self.respond(Some(argument)).await
    }

    async fn respond(&mut self, opponent: Option<&str>) -> Result<String, DebateError> {
        let prompt = self.next_prompt(opponent)?;
        self.history.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: prompt.into(),
                name: None,
            },
        ));

        // An unanswered prompt is dropped so the next turn does not follow
        // it with a second user message.
        let response = match self.get_completion().await {
            Ok(response) => sanitize_response(&response),
            Err(e) => {
                self.history.pop();
                return Err(e);
            }
        };
        if response.is_empty() {
            self.history.pop();
            return Err(DebateError::ConfigError(
                "Language model returned an empty response".to_string(),
            ));
        }

        self.history.push(ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessage {
                content: Some(response.clone().into()),
                name: None,
                tool_calls: None,
                refusal: None,
                audio: None,
                function_call: None,
            },
        ));
        self.first_round = false;

        Ok(response)
    }

    /// Get a completion for the current history.
    async fn get_completion(&self) -> Result<String, DebateError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                DebateError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(&self.api_key)
            .with_api_base(&self.api_base);

        let client = Client::with_config(config).with_http_client(http_client);

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.llm.model)
            .max_completion_tokens(self.llm.max_tokens)
            .temperature(self.llm.temperature)
            .messages(self.history.clone())
            .build()?;

        self.retry
            .run(
                |_| {
                    let client = &client;
                    let request = request.clone();
                    async move {
                        let response = client.chat().create(request).await?;
                        let content = response
                            .choices
                            .first()
                            .and_then(|c| c.message.content.clone())
                            .unwrap_or_default();
                        debug!("Completion returned {} chars", content.len());
                        Ok(content)
                    }
                },
                |attempt, e| warn!("Completion attempt {} failed: {}", attempt, e),
            )
            .await
    }
}

fn system_message(prompt: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: prompt.to_string().into(),
        name: None,
    })
}

/// Make model output speakable: strip reasoning blocks, stray tags and
/// markdown emphasis, and collapse whitespace.
pub fn sanitize_response(response: &str) -> String {
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratch",
        "scratchpad",
        "plan",
        "analysis",
    ];

    let mut result = response.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    result = result.replace(['*', '#'], "");

    if let Ok(ws_re) = regex::Regex::new(r"\s+") {
        result = ws_re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}
