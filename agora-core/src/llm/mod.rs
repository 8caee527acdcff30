//! # Schema-Guided LLM Client
//!
//! Queries an OpenAI-compatible chat endpoint and coerces the completion into
//! a [`NextStep`] decision object. Providers do not reliably honor structured
//! output, so the client carries a recovery ladder ported from hard-won
//! operational experience:
//!
//! 1. request with the `json_schema` response format (falling back to
//!    `json_object` when the provider rejects schemas)
//! 2. extract the first complete JSON object from noisy content
//! 3. plain retry with an "invalid JSON" reminder
//! 4. a dedicated repair prompt
//! 5. direct-tool fallback for models that return the bare tool object
//!
//! Every call yields a [`QueryMeta`] describing which rung was needed, fed
//! into session metrics.

pub mod rate_limit;

use std::time::Instant;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
        ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
        ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        ChatCompletionToolType, CompletionUsage, CreateChatCompletionRequest, FunctionCall,
        ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::schema::{next_step_schema, NextStep, ToolCall};
use rate_limit::RateLimiter;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(#[from] async_openai::error::OpenAIError),
    #[error("model returned no content")]
    EmptyResponse,
    #[error("failed to parse model output: {0}")]
    Parse(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Provider-agnostic conversation message, converted to the wire types only
/// inside the client. Keeps the agent loop and its tests free of SDK types.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        tool_call: Option<ToolInvocation>,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// Which recovery rung produced the accepted decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveredBy {
    Initial,
    Retry,
    Repair,
    ToolFallback,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ParseAttempts {
    pub initial: u32,
    pub retry: u32,
    pub repair: u32,
    pub tool_fallback: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryMeta {
    pub model: String,
    pub latency_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub json_valid_first_try: bool,
    pub recovered_by: RecoveredBy,
    pub parse_attempts: ParseAttempts,
    pub json_extracted: bool,
    pub schema_fallback: bool,
}

/// Seam between the reasoning loop and the hosted model.
#[async_trait]
pub trait DecisionModel: Send + Sync {
    async fn decide(&self, messages: &[ChatMessage]) -> LlmResult<(NextStep, QueryMeta)>;

    fn model_name(&self) -> &str;
}

pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    rate_limiter: RateLimiter,
}

impl LlmClient {
    pub fn new(config: &LlmConfig, api_key: &SecretString) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_base(&config.base_url)
            .with_api_key(api_key.expose_secret());
        info!(
            model = %config.model,
            base_url = %config.base_url,
            "LLM client configured"
        );
        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            rate_limiter: RateLimiter::from_config(config),
        }
    }

    /// One-shot probe used at startup: can this model produce a valid
    /// decision object at all?
    pub async fn check_schema_capability(&self) -> bool {
        let messages = vec![
            ChatMessage::System {
                content: "You are running a schema compliance check. Reply with JSON only."
                    .to_string(),
            },
            ChatMessage::User {
                content: "Return a minimal valid JSON object for the schema. If the schema \
                          includes a completion tool, use it."
                    .to_string(),
            },
        ];
        match self.decide(&messages).await {
            Ok((_, meta)) => {
                if !meta.json_valid_first_try {
                    warn!("model schema check required recovery; tool calls may be unstable");
                }
                true
            }
            Err(error) => {
                warn!(%error, "model schema capability check failed");
                false
            }
        }
    }

    async fn create_completion(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        response_format: ResponseFormat,
    ) -> LlmResult<(String, Option<CompletionUsage>)> {
        self.rate_limiter.acquire().await;

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            max_completion_tokens: self.max_tokens,
            response_format: Some(response_format),
            ..Default::default()
        };

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(LlmError::EmptyResponse)?;
        Ok((content, response.usage))
    }

    fn schema_response_format() -> ResponseFormat {
        ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: "next_step".to_string(),
                schema: Some(next_step_schema()),
                strict: Some(true),
            },
        }
    }

    fn convert_messages(messages: &[ChatMessage]) -> Vec<ChatCompletionRequestMessage> {
        messages.iter().map(convert_message).collect()
    }
}

fn convert_message(message: &ChatMessage) -> ChatCompletionRequestMessage {
    match message {
        ChatMessage::System { content } => {
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(content.clone()),
                name: None,
            })
        }
        ChatMessage::User { content } => {
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(content.clone()),
                name: None,
            })
        }
        ChatMessage::Assistant { content, tool_call } => {
            let tool_calls = tool_call.as_ref().map(|invocation| {
                vec![ChatCompletionMessageToolCall {
                    id: invocation.call_id.clone(),
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionCall {
                        name: invocation.name.clone(),
                        arguments: invocation.arguments.clone(),
                    },
                }]
            });
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                    content.clone(),
                )),
                tool_calls,
                ..Default::default()
            })
        }
        ChatMessage::ToolResult { call_id, content } => {
            ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(content.clone()),
                tool_call_id: call_id.clone(),
            })
        }
    }
}

/// Finds the first complete top-level JSON object in free-form text,
/// tolerating strings containing braces.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[async_trait]
impl DecisionModel for LlmClient {
    #[tracing::instrument(level = "debug", skip(self, messages))]
    async fn decide(&self, messages: &[ChatMessage]) -> LlmResult<(NextStep, QueryMeta)> {
        let started = Instant::now();
        let mut attempts = ParseAttempts::default();
        let mut prompt_tokens = 0u32;
        let mut completion_tokens = 0u32;
        let mut json_valid_first_try = true;
        let mut json_extracted = false;
        let mut schema_fallback = false;

        let accumulate = |usage: &Option<CompletionUsage>,
                              prompt_tokens: &mut u32,
                              completion_tokens: &mut u32| {
            if let Some(usage) = usage {
                *prompt_tokens += usage.prompt_tokens;
                *completion_tokens += usage.completion_tokens;
            }
        };

        let schema_json = next_step_schema();
        let json_hint = format!(
            "CRITICAL: Return ONLY valid JSON matching this schema: {}. \
             No conversational filler, no markdown backticks, no other text.",
            schema_json
        );

        let mut wire_messages = vec![convert_message(&ChatMessage::System {
            content: "Return ONLY valid JSON. No markdown, no prose, no extra keys.".to_string(),
        })];
        wire_messages.extend(Self::convert_messages(messages));
        wire_messages.push(convert_message(&ChatMessage::User { content: json_hint }));

        // Schema-constrained request, with a plain-JSON fallback for
        // providers that reject the json_schema format outright.
        let (mut content, usage) = match self
            .create_completion(wire_messages.clone(), Self::schema_response_format())
            .await
        {
            Ok(result) => result,
            Err(LlmError::Api(error)) => {
                debug!(%error, "json_schema response format failed, falling back to json_object");
                schema_fallback = true;
                self.create_completion(wire_messages.clone(), ResponseFormat::JsonObject)
                    .await?
            }
            Err(error) => return Err(error),
        };
        accumulate(&usage, &mut prompt_tokens, &mut completion_tokens);

        if let Some(extracted) = extract_json_object(&content) {
            json_extracted = extracted.len() != content.len();
            content = extracted.to_string();
        }

        attempts.initial += 1;
        let retry_format = || {
            if schema_fallback {
                ResponseFormat::JsonObject
            } else {
                Self::schema_response_format()
            }
        };

        match serde_json::from_str::<NextStep>(&content) {
            Ok(mut step) => {
                if !step.plan_len_ok() {
                    debug!("plan length out of bounds, retrying with reminder");
                    json_valid_first_try = false;
                    let mut reminder_messages = wire_messages.clone();
                    reminder_messages.push(convert_message(&ChatMessage::User {
                        content: "plan must contain between 1 and 5 entries".to_string(),
                    }));
                    attempts.retry += 1;
                    if let Ok((retry_content, retry_usage)) = self
                        .create_completion(reminder_messages, retry_format())
                        .await
                    {
                        accumulate(&retry_usage, &mut prompt_tokens, &mut completion_tokens);
                        let retry_content = extract_json_object(&retry_content)
                            .unwrap_or(&retry_content)
                            .to_string();
                        if let Ok(retried) = serde_json::from_str::<NextStep>(&retry_content) {
                            if retried.plan_len_ok() {
                                let meta = QueryMeta {
                                    model: self.model.clone(),
                                    latency_ms: started.elapsed().as_millis() as u64,
                                    prompt_tokens,
                                    completion_tokens,
                                    json_valid_first_try,
                                    recovered_by: RecoveredBy::Retry,
                                    parse_attempts: attempts,
                                    json_extracted,
                                    schema_fallback,
                                };
                                return Ok((retried, meta));
                            }
                        }
                    }
                    // Last resort: clamp rather than burn further requests.
                    warn!("plan still out of bounds after retry, truncating");
                    step.plan.truncate(crate::schema::PLAN_MAX_LEN);
                    if step.plan.is_empty() {
                        step.plan.push("continue".to_string());
                    }
                }
                let meta = QueryMeta {
                    model: self.model.clone(),
                    latency_ms: started.elapsed().as_millis() as u64,
                    prompt_tokens,
                    completion_tokens,
                    json_valid_first_try,
                    recovered_by: RecoveredBy::Initial,
                    parse_attempts: attempts,
                    json_extracted,
                    schema_fallback,
                };
                Ok((step, meta))
            }
            Err(parse_error) => {
                json_valid_first_try = false;
                debug!(%parse_error, "schema validation failed, entering recovery ladder");

                // Rung 1: plain retry with a reminder.
                attempts.retry += 1;
                let mut retry_messages = wire_messages.clone();
                retry_messages.push(convert_message(&ChatMessage::User {
                    content: "Your last response was invalid JSON. Return ONLY valid JSON \
                              for the schema."
                        .to_string(),
                }));
                if let Ok((retry_content, retry_usage)) =
                    self.create_completion(retry_messages, retry_format()).await
                {
                    accumulate(&retry_usage, &mut prompt_tokens, &mut completion_tokens);
                    let retry_content = extract_json_object(&retry_content)
                        .unwrap_or(&retry_content)
                        .to_string();
                    if let Ok(step) = serde_json::from_str::<NextStep>(&retry_content) {
                        debug!("JSON recovered on retry");
                        let meta = QueryMeta {
                            model: self.model.clone(),
                            latency_ms: started.elapsed().as_millis() as u64,
                            prompt_tokens,
                            completion_tokens,
                            json_valid_first_try,
                            recovered_by: RecoveredBy::Retry,
                            parse_attempts: attempts,
                            json_extracted,
                            schema_fallback,
                        };
                        return Ok((step, meta));
                    }
                }

                // Rung 2: dedicated repair prompt.
                attempts.repair += 1;
                let repair_messages = vec![
                    convert_message(&ChatMessage::System {
                        content: "You repair invalid JSON. Return ONLY valid JSON matching the \
                                  provided schema."
                            .to_string(),
                    }),
                    convert_message(&ChatMessage::User {
                        content: format!(
                            "Schema:\n{}\n\nBad output:\n{}\n\nReturn only corrected JSON.",
                            schema_json, content
                        ),
                    }),
                ];
                if let Ok((repaired, repair_usage)) = self
                    .create_completion(repair_messages, ResponseFormat::JsonObject)
                    .await
                {
                    accumulate(&repair_usage, &mut prompt_tokens, &mut completion_tokens);
                    let repaired = extract_json_object(&repaired).unwrap_or(&repaired).to_string();
                    if let Ok(step) = serde_json::from_str::<NextStep>(&repaired) {
                        debug!("JSON recovered via repair");
                        let meta = QueryMeta {
                            model: self.model.clone(),
                            latency_ms: started.elapsed().as_millis() as u64,
                            prompt_tokens,
                            completion_tokens,
                            json_valid_first_try,
                            recovered_by: RecoveredBy::Repair,
                            parse_attempts: attempts,
                            json_extracted,
                            schema_fallback,
                        };
                        return Ok((step, meta));
                    }
                }

                // Rung 3: maybe the model returned the bare tool object.
                attempts.tool_fallback += 1;
                if let Ok(call) = serde_json::from_str::<ToolCall>(&content) {
                    if matches!(call, ToolCall::ReportCompletion { .. }) {
                        debug!("recovered a directly-returned completion tool");
                        let step = NextStep {
                            current_state: "Auto-extracted from direct return".to_string(),
                            plan: vec!["Directly returning tool".to_string()],
                            task_completed: true,
                            function: call,
                        };
                        let meta = QueryMeta {
                            model: self.model.clone(),
                            latency_ms: started.elapsed().as_millis() as u64,
                            prompt_tokens,
                            completion_tokens,
                            json_valid_first_try,
                            recovered_by: RecoveredBy::ToolFallback,
                            parse_attempts: attempts,
                            json_extracted,
                            schema_fallback,
                        };
                        return Ok((step, meta));
                    }
                }

                debug!(content = %content, "all recovery rungs exhausted");
                Err(LlmError::Parse(parse_error.to_string()))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_extract_json_object_plain() {
        let text = r#"{"a": 1}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_json_object_with_noise() {
        let text = "Sure! Here is the JSON:\n```json\n{\"a\": {\"b\": 2}}\n``` hope it helps";
        assert_eq!(extract_json_object(text), Some(r#"{"a": {"b": 2}}"#));
    }

    #[test]
    fn test_extract_json_object_ignores_braces_in_strings() {
        let text = r#"{"code": "'}{'[::-1]"} trailing"#;
        assert_eq!(extract_json_object(text), Some(r#"{"code": "'}{'[::-1]"}"#));
    }

    #[test]
    fn test_extract_json_object_incomplete() {
        assert_eq!(extract_json_object("{\"a\": 1"), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_message_conversion_preserves_tool_linkage() {
        let invocation = ToolInvocation {
            call_id: "step_0".to_string(),
            name: "compute".to_string(),
            arguments: r#"{"code": "1 + 1"}"#.to_string(),
        };
        let converted = convert_message(&ChatMessage::Assistant {
            content: "Thought: add".to_string(),
            tool_call: Some(invocation),
        });
        match converted {
            ChatCompletionRequestMessage::Assistant(message) => {
                let calls = message.tool_calls.expect("tool calls");
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "step_0");
                assert_eq!(calls[0].function.name, "compute");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
