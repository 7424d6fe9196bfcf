#![allow(clippy::missing_docs_in_private_items)]
//! LLM Client (spec §4.8 "Prompt A/B"): a single place that turns a
//! system/user prompt pair plus a JSON schema into a parsed `serde_json::Value`,
//! with temperature 0, a bounded timeout, retry with backoff (longer when the
//! provider signals a rate limit), and a best-effort repair pass for
//! responses that are almost-but-not-quite valid JSON. Grounded in
//! `ingestion-pipeline/src/pipeline/services.rs`'s `prepare_llm_request`/
//! `perform_analysis` and `common/src/utils/embedding.rs`'s retry idiom.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use tokio_retry::strategy::jitter;
use tracing::warn;

use crate::{error::AppError, utils::config::AppConfig};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 200;
const RATE_LIMIT_BASE_MS: u64 = 2_000;
const TEMPERATURE: f32 = 0.0;

pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout_secs: u64,
}

impl LlmClient {
    pub fn from_config(config: &AppConfig, client: Client<OpenAIConfig>, model: &str) -> Self {
        Self {
            client,
            model: model.to_owned(),
            timeout_secs: config.llm_timeout_seconds,
        }
    }

    /// Issues a JSON-schema-constrained chat completion and parses the
    /// result. On a malformed response, attempts a best-effort repair with
    /// `json-stream-parser` before giving up with `LLMInvalidResponse`.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        let mut last_err = None;
        for attempt in 0..RETRY_ATTEMPTS {
            if attempt > 0 {
                let rate_limited = matches!(last_err, Some(AppError::LLMRateLimited(_)));
                let base = if rate_limited {
                    RATE_LIMIT_BASE_MS
                } else {
                    RETRY_BASE_MS
                };
                let delay = jitter(Duration::from_millis(
                    base.saturating_mul(1u64 << attempt.min(5)),
                ));
                tokio::time::sleep(delay).await;
            }

            match self
                .complete_once(system_prompt, user_prompt, schema_name, &schema)
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    warn!(attempt, error = %err, "llm completion attempt failed, retrying");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            AppError::LLMInvalidResponse("llm completion exhausted retries".into())
        }))
    }

    async fn complete_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(TEMPERATURE)
            .messages([
                ChatCompletionRequestSystemMessage::from(system_prompt).into(),
                ChatCompletionRequestUserMessage::from(user_prompt).into(),
            ])
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: schema_name.to_owned(),
                    schema: Some(schema.clone()),
                    strict: Some(true),
                },
            })
            .build()
            .map_err(AppError::OpenAI)?;

        let duration = Duration::from_secs(self.timeout_secs);
        let response = match tokio::time::timeout(duration, self.client.chat().create(request))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(classify_openai_error(err)),
            Err(_) => {
                return Err(AppError::LLMTimeout(format!(
                    "llm completion timed out after {}s",
                    self.timeout_secs
                )))
            }
        };

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::LLMInvalidResponse("no content in llm response".into()))?;

        parse_or_repair(content)
    }
}

fn classify_openai_error(err: OpenAIError) -> AppError {
    if let OpenAIError::ApiError(ref api_err) = err {
        let is_rate_limited = api_err
            .code
            .as_deref()
            .is_some_and(|c| c.contains("rate_limit"))
            || api_err.r#type.as_deref().is_some_and(|t| t.contains("rate_limit"));
        if is_rate_limited {
            return AppError::LLMRateLimited(api_err.message.clone());
        }
    }
    AppError::OpenAI(err)
}

/// Parses `raw` as JSON; on failure, falls back to
/// `json_stream_parser::parse_stream`'s best-effort repair (it tolerates
/// truncated/near-miss JSON the way a cut-off completion sometimes is).
fn parse_or_repair(raw: &str) -> Result<serde_json::Value, AppError> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Ok(value);
    }
    json_stream_parser::parse_stream(raw)
        .map_err(|e| AppError::LLMInvalidResponse(format!("unrepairable llm output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_repair_accepts_valid_json() {
        let value = parse_or_repair(r#"{"a": 1}"#).expect("valid json parses");
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn parse_or_repair_repairs_truncated_json() {
        let value = parse_or_repair(r#"{"a": "hello", "b": [1, 2"#).expect("repairable");
        assert_eq!(value["a"], "hello");
    }

    #[test]
    fn parse_or_repair_fails_on_garbage() {
        let err = parse_or_repair("not json at all }{").unwrap_err();
        assert!(matches!(err, AppError::LLMInvalidResponse(_)));
    }
}
