/**
 * LLM Intent Fallback (§4.E)
 *
 * DESIGN DECISION: a `RwLock<HashMap<String, (result, Instant)>>` TTL cache,
 * not a dedicated caching crate
 * WHY: the cache is keyed by normalized text with a single fixed TTL and a
 * size-bounded LRU eviction; a `HashMap` plus a manual oldest-wins eviction on
 * overflow covers this without a new dependency
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::llm_gateway::{LlmGateway, OutputFormat, SchemaValidator};
use crate::types::{ConfidenceLevel, Entity, Intent, IntentCandidate, IntentRecognitionResult, RecognitionMetadata, RecognitionMethod};

const SYSTEM_PROMPT: &str = "You are an intent classifier for a software-engineering task orchestration system. \
Given a user utterance, respond with JSON describing the single best-matching intent from the supported set, \
a confidence between 0 and 1, any extracted parameters, and relevant context. \
If nothing in the supported set applies, respond with intent \"unrecognized_intent\". \
If the utterance is ambiguous, respond with intent \"clarification_needed\".";

#[derive(Debug, Deserialize)]
struct FallbackResponse {
    intent: String,
    confidence: f64,
    #[serde(default)]
    parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    alternatives: Vec<FallbackAlternative>,
}

#[derive(Debug, Deserialize)]
struct FallbackAlternative {
    intent: String,
    confidence: f64,
}

fn response_schema() -> &'static SchemaValidator {
    fn validator(value: &serde_json::Value) -> std::result::Result<(), String> {
        if value.get("intent").and_then(|v| v.as_str()).is_none() {
            return Err("missing required field: intent".to_string());
        }
        if value.get("confidence").and_then(|v| v.as_f64()).is_none() {
            return Err("missing required field: confidence".to_string());
        }
        Ok(())
    }
    &validator
}

struct CacheEntry {
    result: IntentRecognitionResult,
    inserted_at: Instant,
}

pub struct FallbackConfig {
    pub ttl: Duration,
    pub max_cache_size: usize,
    pub max_retries: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(300), max_cache_size: 100, max_retries: 3 }
    }
}

pub struct IntentFallback {
    gateway: Arc<LlmGateway>,
    config: FallbackConfig,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl IntentFallback {
    pub fn new(gateway: Arc<LlmGateway>, config: FallbackConfig) -> Self {
        Self { gateway, config, cache: RwLock::new(HashMap::new()) }
    }

    fn normalize(text: &str) -> String {
        text.trim().to_lowercase()
    }

    /// Implements the §4.E algorithm: cache lookup, prompt construction, a
    /// gateway call, intent-set rewriting, and entity conversion.
    pub async fn recognize(&self, text: &str, context: Option<&HashMap<String, String>>) -> Result<IntentRecognitionResult> {
        let key = Self::normalize(text);

        if let Some(entry) = self.cache.read().await.get(&key) {
            if entry.inserted_at.elapsed() < self.config.ttl {
                return Ok(entry.result.clone());
            }
        }

        let started = Instant::now();
        let user_prompt = build_user_prompt(text, context);

        let raw = self
            .gateway
            .call(&user_prompt, Some(SYSTEM_PROMPT), "intent_fallback", OutputFormat::Json, Some(response_schema()), 0.1)
            .await?;

        let parsed: FallbackResponse = serde_json::from_str(&raw).map_err(|e| Error::InvalidModelOutput(e.to_string()))?;

        let (intent, confidence) = rewrite_intent(&parsed.intent, parsed.confidence);
        let entities = parsed
            .parameters
            .into_iter()
            .map(|(key, value)| Entity { entity_type: key, value: value_to_string(&value), confidence: 0.8 })
            .collect();

        let alternatives = parsed
            .alternatives
            .into_iter()
            .filter_map(|a| Intent::parse(&a.intent).map(|intent| IntentCandidate { intent, confidence: a.confidence }))
            .collect();

        let result = IntentRecognitionResult {
            intent,
            confidence,
            confidence_level: ConfidenceLevel::from_confidence(confidence),
            entities,
            original_input: text.to_string(),
            processed_input: key.clone(),
            alternatives,
            metadata: RecognitionMetadata {
                processing_time_ms: started.elapsed().as_millis() as u64,
                method: RecognitionMethod::Llm,
                model_used: Some(self.gateway_model_name()),
                timestamp: chrono::Utc::now(),
            },
        };

        self.insert(key, result.clone()).await;
        Ok(result)
    }

    fn gateway_model_name(&self) -> String {
        "intent_fallback".to_string()
    }

    async fn insert(&self, key: String, result: IntentRecognitionResult) {
        let mut cache = self.cache.write().await;
        if cache.len() >= self.config.max_cache_size && !cache.contains_key(&key) {
            if let Some(oldest_key) = cache
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest_key);
            }
        }
        cache.insert(key, CacheEntry { result, inserted_at: Instant::now() });
    }
}

fn build_user_prompt(text: &str, context: Option<&HashMap<String, String>>) -> String {
    let mut prompt = format!("Utterance: \"{text}\"");
    if let Some(context) = context {
        if !context.is_empty() {
            prompt.push_str("\nContext:\n");
            for (key, value) in context {
                prompt.push_str(&format!("- {key}: {value}\n"));
            }
        }
    }
    prompt
}

/// Rewrites any intent outside the closed set, or either sentinel value
/// (`unrecognized_intent`, `clarification_needed`), to `Unknown` and caps
/// confidence at 0.3.
fn rewrite_intent(raw: &str, confidence: f64) -> (Intent, f64) {
    match Intent::parse(raw) {
        Some(Intent::ClarificationNeeded) => (Intent::Unknown, confidence.min(0.3)),
        Some(_) if raw.eq_ignore_ascii_case("unrecognized_intent") => (Intent::Unknown, confidence.min(0.3)),
        Some(intent) => (intent, confidence),
        None => (Intent::Unknown, confidence.min(0.3)),
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm_gateway::{LlmProvider, Message};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider {
        response: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        async fn complete(&self, _model: &str, _messages: &[Message], _temperature: f64, _format: OutputFormat) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn gateway(response: &str) -> (Arc<LlmGateway>, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider { response: response.to_string(), calls: AtomicU32::new(0) });
        (Arc::new(LlmGateway::new(provider.clone(), LlmConfig::default())), provider)
    }

    #[test]
    fn test_rewrite_intent_unknown_string() {
        let (intent, confidence) = rewrite_intent("not_a_real_intent", 0.9);
        assert_eq!(intent, Intent::Unknown);
        assert!(confidence <= 0.3);
    }

    #[test]
    fn test_rewrite_intent_clarification_needed() {
        let (intent, confidence) = rewrite_intent("clarification_needed", 0.95);
        assert_eq!(intent, Intent::Unknown);
        assert!(confidence <= 0.3);
    }

    #[test]
    fn test_rewrite_intent_known_passthrough() {
        let (intent, confidence) = rewrite_intent("create_project", 0.8);
        assert_eq!(intent, Intent::CreateProject);
        assert_eq!(confidence, 0.8);
    }

    #[tokio::test]
    async fn test_recognize_caches_result() {
        let (gw, provider) = gateway(r#"{"intent":"create_project","confidence":0.9,"parameters":{}}"#);
        let fallback = IntentFallback::new(gw, FallbackConfig::default());

        let first = fallback.recognize("start a new project", None).await.unwrap();
        assert_eq!(first.intent, Intent::CreateProject);

        let second = fallback.recognize("start a new project", None).await.unwrap();
        assert_eq!(second.intent, Intent::CreateProject);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recognize_rewrites_unsupported_intent() {
        let (gw, _provider) = gateway(r#"{"intent":"do_the_impossible","confidence":0.95,"parameters":{}}"#);
        let fallback = IntentFallback::new(gw, FallbackConfig::default());

        let result = fallback.recognize("do something weird", None).await.unwrap();
        assert_eq!(result.intent, Intent::Unknown);
        assert!(result.confidence <= 0.3);
    }
}
