/**
 * LLM Gateway (§4.A)
 *
 * DESIGN DECISION: one chokepoint for every model call, parameterized by a
 * pluggable `LlmProvider` trait rather than a concrete HTTP client baked into
 * the call sites
 * WHY: the decomposition engine and every curation phase need to call the
 * model; a single gateway is where retry, timeout, concurrency, and
 * JSON-format enforcement live exactly once
 *
 * REASONING CHAIN (retry policy):
 * 1. Transport failures (network errors, 5xx, timeouts) are worth retrying -
 *    they are often transient.
 * 2. Malformed model output is not a transport failure and is not retried by
 *    the gateway - the caller decides whether to re-prompt.
 * 3. Exponential backoff with a cap bounds worst-case latency at
 *    attempts * cap rather than growing unboundedly.
 *
 * PATTERN: single outbound chokepoint with bounded concurrency - a global
 * semaphore caps total in-flight calls, and a per-task-name semaphore keeps
 * a flood of one task (bulk scoring) from starving another (decomposition)
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A hand-written validator per call-site schema (required keys/types), not a
/// generic JSON-Schema engine - the schemas this system needs
/// (`task_decomposition`, `intent_analysis`, `relevance_scoring`, …) are small
/// and call-site-specific.
pub type SchemaValidator = dyn Fn(&serde_json::Value) -> std::result::Result<(), String> + Send + Sync;

/// The external model provider's wire contract (§6): `POST` with
/// `{model, messages, temperature, response_format}`, returning a string.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f64,
        format: OutputFormat,
    ) -> Result<String>;
}

/// Default provider: a plain `reqwest` POST against the configured endpoint.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpLlmProvider {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is always valid");
        Self { client, endpoint, api_key }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    content: String,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f64,
        format: OutputFormat,
    ) -> Result<String> {
        let body = ChatRequest {
            model,
            messages,
            temperature,
            response_format: match format {
                OutputFormat::Text => "text",
                OutputFormat::Json => "json",
            },
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidModelOutput(e.to_string()))?;
        Ok(parsed.content)
    }
}

/// Per-task-name concurrency cap, independent of `gateway_concurrency`'s
/// global cap. Keeps a flood of bulk scoring/meta-prompt calls from taking
/// every global permit and starving a latency-sensitive task like
/// `task_decomposition` at the head of the line.
const PER_TASK_CONCURRENCY: usize = 4;

pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
    concurrency: Arc<Semaphore>,
    task_concurrency: tokio::sync::Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        let concurrency = Arc::new(Semaphore::new(config.gateway_concurrency));
        Self { provider, config, concurrency, task_concurrency: tokio::sync::Mutex::new(HashMap::new()) }
    }

    async fn task_semaphore(&self, task_name: &str) -> Arc<Semaphore> {
        let mut semaphores = self.task_concurrency.lock().await;
        Arc::clone(semaphores.entry(task_name.to_string()).or_insert_with(|| Arc::new(Semaphore::new(PER_TASK_CONCURRENCY))))
    }

    fn resolve_model(&self, task_name: &str) -> String {
        self.config
            .task_model_map
            .get(task_name)
            .cloned()
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.config.retry_base_secs.saturating_mul(1u64 << attempt.min(4));
        Duration::from_secs(exp.min(self.config.retry_cap_secs))
    }

    /// Implements §4.A's `call` contract: model selection, timeout, retry with
    /// exponential backoff, and (for `format = json`) fence-stripping, parsing,
    /// and schema validation.
    pub async fn call(
        &self,
        user_prompt: &str,
        system_prompt: Option<&str>,
        task_name: &str,
        format: OutputFormat,
        schema: Option<&SchemaValidator>,
        temperature: f64,
    ) -> Result<String> {
        let model = self.resolve_model(task_name);
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(Message { role: Role::System, content: system.to_string() });
        }
        messages.push(Message { role: Role::User, content: user_prompt.to_string() });

        let _permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|_| Error::Internal("gateway semaphore closed".to_string()))?;

        let task_semaphore = self.task_semaphore(task_name).await;
        let _task_permit = task_semaphore
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("gateway task semaphore closed".to_string()))?;

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let mut last_error = Error::Internal("no attempts made".to_string());

        for attempt in 0..self.config.max_retries {
            let call = self.provider.complete(&model, &messages, temperature, format);
            match tokio::time::timeout(timeout_duration, call).await {
                Ok(Ok(raw)) => return self.finalize(raw, format, schema),
                Ok(Err(err)) => {
                    last_error = err;
                }
                Err(_) => {
                    last_error = Error::Timeout(timeout_duration);
                }
            }

            if attempt + 1 < self.config.max_retries {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }

        Err(last_error)
    }

    fn finalize(&self, raw: String, format: OutputFormat, schema: Option<&SchemaValidator>) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(raw),
            OutputFormat::Json => {
                let stripped = strip_code_fences(&raw);
                let value: serde_json::Value = serde_json::from_str(&stripped)
                    .map_err(|e| Error::InvalidModelOutput(format!("{e}: {stripped}")))?;

                if let Some(validator) = schema {
                    validator(&value).map_err(Error::SchemaViolation)?;
                }

                serde_json::to_string(&value).map_err(Error::from)
            }
        }
    }
}

/// Strips a single leading/trailing markdown code fence
/// (```` ```json … ``` ````), if present.
fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(body) = rest.strip_suffix("```") {
            return body.trim().to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        fail_times: AtomicU32,
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[Message],
            _temperature: f64,
            _format: OutputFormat,
        ) -> Result<String> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::ProviderUnavailable("flaky".to_string()));
            }
            Ok(self.response.clone())
        }
    }

    fn test_config() -> LlmConfig {
        LlmConfig {
            endpoint: "http://localhost".to_string(),
            api_key: None,
            default_model: "default".to_string(),
            task_model_map: HashMap::from([("special_task".to_string(), "special-model".to_string())]),
            timeout_secs: 5,
            max_retries: 3,
            retry_base_secs: 0,
            retry_cap_secs: 0,
            gateway_concurrency: 2,
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_resolve_model_mapping() {
        let provider = Arc::new(FlakyProvider { fail_times: AtomicU32::new(0), response: "{}".to_string() });
        let gateway = LlmGateway::new(provider, test_config());
        assert_eq!(gateway.resolve_model("special_task"), "special-model");
        assert_eq!(gateway.resolve_model("other_task"), "default");
    }

    #[tokio::test]
    async fn test_task_semaphore_is_per_task_name_and_cached() {
        let provider = Arc::new(FlakyProvider { fail_times: AtomicU32::new(0), response: "{}".to_string() });
        let gateway = LlmGateway::new(provider, test_config());

        let a1 = gateway.task_semaphore("relevance_scoring").await;
        let a2 = gateway.task_semaphore("relevance_scoring").await;
        let b = gateway.task_semaphore("task_decomposition").await;

        assert!(Arc::ptr_eq(&a1, &a2), "same task name must reuse the same semaphore");
        assert!(!Arc::ptr_eq(&a1, &b), "different task names must not share a semaphore");
        assert_eq!(a1.available_permits(), PER_TASK_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_call_retries_then_succeeds() {
        let provider = Arc::new(FlakyProvider {
            fail_times: AtomicU32::new(2),
            response: "{\"ok\":true}".to_string(),
        });
        let gateway = LlmGateway::new(provider, test_config());

        let result = gateway
            .call("prompt", None, "task", OutputFormat::Json, None, 0.1)
            .await
            .unwrap();
        assert!(result.contains("ok"));
    }

    #[tokio::test]
    async fn test_call_exhausts_retries() {
        let provider = Arc::new(FlakyProvider { fail_times: AtomicU32::new(10), response: String::new() });
        let gateway = LlmGateway::new(provider, test_config());

        let result = gateway.call("prompt", None, "task", OutputFormat::Text, None, 0.1).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_schema_validation_failure() {
        let provider = Arc::new(FlakyProvider {
            fail_times: AtomicU32::new(0),
            response: "{\"missing\":true}".to_string(),
        });
        let gateway = LlmGateway::new(provider, test_config());
        let validator: &SchemaValidator = &|value| {
            if value.get("required_field").is_some() {
                Ok(())
            } else {
                Err("missing required_field".to_string())
            }
        };

        let result = gateway
            .call("prompt", None, "task", OutputFormat::Json, Some(validator), 0.1)
            .await;
        assert!(matches!(result, Err(Error::SchemaViolation(_))));
    }
}
