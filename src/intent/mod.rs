/**
 * Intent Recognition (§4.D, §4.E, §4.F)
 *
 * `IntentEngine` is the chokepoint other components call: try the
 * deterministic pattern engine first, fall back to the LLM only when the
 * pattern engine's best match is below `min_pattern_confidence` (default 0.7).
 */

pub mod dispatcher;
pub mod entities;
pub mod fallback;
pub mod patterns;

use std::collections::HashMap;
use std::time::Instant;

use crate::error::Result;
use crate::types::{IntentCandidate, IntentRecognitionResult, RecognitionMetadata, RecognitionMethod};

pub use dispatcher::{ContentBlock, Dispatcher, DispatchResponse, ExecutionContext, Handler, HandlerResult};
pub use fallback::{FallbackConfig, IntentFallback};
pub use patterns::{match_intent, IntentMatch};

pub struct IntentEngineConfig {
    pub min_pattern_confidence: f64,
    pub min_match_confidence: f64,
}

impl Default for IntentEngineConfig {
    fn default() -> Self {
        Self { min_pattern_confidence: 0.7, min_match_confidence: 0.3 }
    }
}

pub struct IntentEngine {
    fallback: IntentFallback,
    config: IntentEngineConfig,
}

impl IntentEngine {
    pub fn new(fallback: IntentFallback, config: IntentEngineConfig) -> Self {
        Self { fallback, config }
    }

    /// Runs the pattern engine; if the best match's confidence is below
    /// `min_pattern_confidence`, defers to the LLM fallback instead.
    pub async fn recognize(&self, text: &str, context: Option<&HashMap<String, String>>) -> Result<IntentRecognitionResult> {
        let started = Instant::now();
        let matches = match_intent(text, self.config.min_match_confidence);

        let best = matches.first();
        let meets_threshold = best.map(|m| m.confidence >= self.config.min_pattern_confidence).unwrap_or(false);

        if meets_threshold {
            let best = best.unwrap();
            let alternatives = matches
                .iter()
                .skip(1)
                .map(|m| IntentCandidate { intent: m.intent, confidence: m.confidence })
                .collect();

            return Ok(IntentRecognitionResult {
                intent: best.intent,
                confidence: best.confidence,
                confidence_level: best.confidence_level,
                entities: best.entities.clone(),
                original_input: text.to_string(),
                processed_input: text.trim().to_lowercase(),
                alternatives,
                metadata: RecognitionMetadata {
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    method: RecognitionMethod::Pattern,
                    model_used: None,
                    timestamp: chrono::Utc::now(),
                },
            });
        }

        self.fallback.recognize(text, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm_gateway::{LlmGateway, LlmProvider, Message, OutputFormat};
    use crate::types::Intent;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedProvider {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn complete(&self, _model: &str, _messages: &[Message], _temperature: f64, _format: OutputFormat) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    fn engine(fallback_response: &str) -> IntentEngine {
        let provider = Arc::new(FixedProvider { response: fallback_response.to_string() });
        let gateway = Arc::new(LlmGateway::new(provider, LlmConfig::default()));
        let fallback = IntentFallback::new(gateway, FallbackConfig::default());
        IntentEngine::new(fallback, IntentEngineConfig::default())
    }

    #[tokio::test]
    async fn test_recognize_uses_pattern_when_confident() {
        let engine = engine(r#"{"intent":"unknown","confidence":0.1,"parameters":{}}"#);
        let result = engine.recognize("create a new project called widgets", None).await.unwrap();
        assert_eq!(result.intent, Intent::CreateProject);
        assert_eq!(result.metadata.method, RecognitionMethod::Pattern);
    }

    #[tokio::test]
    async fn test_recognize_falls_back_when_pattern_weak() {
        let engine = engine(r#"{"intent":"get_help","confidence":0.95,"parameters":{}}"#);
        let result = engine.recognize("uh, do the thing with the stuff please", None).await.unwrap();
        assert_eq!(result.intent, Intent::GetHelp);
        assert_eq!(result.metadata.method, RecognitionMethod::Llm);
    }
}
