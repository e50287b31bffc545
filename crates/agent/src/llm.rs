use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use rfpdesk_core::collaborators::CollaboratorError;
use rfpdesk_core::config::{LlmConfig, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const RETRY_BASE_DELAY_MS: u64 = 250;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat completions against an OpenAI-compatible endpoint or an Ollama server.
///
/// Connection errors, 429 and 5xx responses are retried up to `max_retries` times
/// with doubling delays; any other non-success status fails at once.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let endpoint = match config.provider {
            LlmProvider::OpenAi => format!(
                "{}/chat/completions",
                config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL).trim_end_matches('/')
            ),
            LlmProvider::Ollama => format!(
                "{}/api/generate",
                config.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL).trim_end_matches('/')
            ),
            LlmProvider::Rules => bail!("llm provider `rules` does not use a model client"),
        };
        if config.provider == LlmProvider::OpenAi && config.api_key.is_none() {
            bail!("llm provider `openai` requires llm.api_key");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            client,
            provider: config.provider,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, prompt: &str) -> Value {
        match self.provider {
            LlmProvider::Ollama => json!({ "model": self.model, "prompt": prompt, "stream": false }),
            _ => json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": 0,
            }),
        }
    }

    async fn attempt(&self, body: &Value) -> Result<String, AttemptError> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| AttemptError::Retryable(anyhow!(error).context("llm request failed")))?;
        let status = response.status();
        if !status.is_success() {
            let error = anyhow!("llm endpoint returned {status}");
            return Err(if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                AttemptError::Retryable(error)
            } else {
                AttemptError::Fatal(error)
            });
        }

        let payload: Value = response.json().await.map_err(|error| {
            AttemptError::Fatal(anyhow!(error).context("llm response was not json"))
        })?;
        completion_text(self.provider, &payload).map_err(AttemptError::Fatal)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = self.request_body(prompt);
        let mut attempt = 0;
        loop {
            match self.attempt(&body).await {
                Ok(text) => {
                    debug!(
                        event_name = "agent.llm.completed",
                        provider = self.provider.as_str(),
                        model = %self.model,
                        attempt,
                        "llm completion received"
                    );
                    return Ok(text);
                }
                Err(AttemptError::Retryable(error)) if attempt < self.max_retries => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << attempt.min(6));
                    warn!(
                        event_name = "agent.llm.retry",
                        provider = self.provider.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying llm completion"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptError::Retryable(error)) | Err(AttemptError::Fatal(error)) => {
                    return Err(error)
                }
            }
        }
    }
}

fn completion_text(provider: LlmProvider, payload: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::Ollama => payload.get("response").and_then(Value::as_str),
        _ => payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str),
    };
    text.map(str::to_string).ok_or_else(|| anyhow!("llm response carried no completion text"))
}

/// Model failures surface to the engine as an unavailable collaborator.
pub(crate) fn unavailable(error: anyhow::Error) -> CollaboratorError {
    CollaboratorError::Unavailable(format!("{error:#}"))
}

/// Drops a surrounding markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// First JSON object in a model reply, tolerating code fences and prose around it.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fence(raw);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(cleaned) {
        return Some(value);
    }
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use secrecy::SecretString;
    use serde_json::json;

    use rfpdesk_core::config::{AppConfig, LlmProvider};

    use super::{completion_text, extract_json_object, strip_code_fence, HttpLlmClient, LlmClient};

    /// Replays canned replies in order; `Err` entries simulate a failed call.
    #[derive(Default)]
    pub(crate) struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub(crate) fn replying(replies: &[&str]) -> Self {
            let llm = Self::default();
            for reply in replies {
                llm.replies.lock().expect("replies").push_back(Ok(reply.to_string()));
            }
            llm
        }

        pub(crate) fn failing(message: &str) -> Self {
            let llm = Self::default();
            llm.replies.lock().expect("replies").push_back(Err(message.to_string()));
            llm
        }

        pub(crate) fn last_prompt(&self) -> String {
            self.prompts.lock().expect("prompts").last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().expect("prompts").push(prompt.to_string());
            match self.replies.lock().expect("replies").pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(anyhow!(message)),
                None => Err(anyhow!("no scripted reply left")),
            }
        }
    }

    #[test]
    fn endpoints_follow_provider_defaults_and_overrides() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::Ollama;
        let client = HttpLlmClient::from_config(&config).expect("ollama");
        assert_eq!(client.endpoint(), "http://localhost:11434/api/generate");

        config.provider = LlmProvider::OpenAi;
        config.api_key = Some(SecretString::from("sk-test".to_string()));
        config.base_url = Some("https://llm.internal/v1/".to_string());
        let client = HttpLlmClient::from_config(&config).expect("openai");
        assert_eq!(client.endpoint(), "https://llm.internal/v1/chat/completions");
    }

    #[test]
    fn rules_provider_and_keyless_openai_are_rejected() {
        let mut config = AppConfig::default().llm;
        assert!(HttpLlmClient::from_config(&config).is_err());
        config.provider = LlmProvider::OpenAi;
        config.api_key = None;
        assert!(HttpLlmClient::from_config(&config).is_err());
    }

    #[test]
    fn completion_text_reads_both_payload_shapes() {
        let openai = json!({ "choices": [{ "message": { "role": "assistant", "content": "hi" } }] });
        assert_eq!(completion_text(LlmProvider::OpenAi, &openai).expect("openai"), "hi");
        let ollama = json!({ "model": "llama3", "response": "hello", "done": true });
        assert_eq!(completion_text(LlmProvider::Ollama, &ollama).expect("ollama"), "hello");
        assert!(completion_text(LlmProvider::OpenAi, &ollama).is_err());
    }

    #[test]
    fn json_object_is_found_inside_fences_and_prose() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json_object("```\n{\"a\":1}\n```"), Some(json!({ "a": 1 })));
        assert_eq!(
            extract_json_object("Sure! Here it is: {\"a\": {\"b\": 2}} Let me know."),
            Some(json!({ "a": { "b": 2 } }))
        );
        assert_eq!(extract_json_object("no structure here"), None);
        assert_eq!(extract_json_object("[1, 2]"), None);
    }
}
