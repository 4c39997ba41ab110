/**
 * Command Dispatcher (§4.F)
 *
 * DESIGN DECISION: handlers are registered as boxed async closures keyed by
 * intent, not a trait object per handler
 * WHY: most handlers are a thin call into one other component; a closure map
 * avoids a one-struct-per-intent ceremony for what is, in every case, a single
 * async function
 */

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Intent, SessionId};

/// Built once per inbound request (§9): never ambient/global state.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub session_id: SessionId,
    pub current_project: Option<String>,
    pub runtime_config: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerResult {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub success: bool,
    pub result: HandlerResult,
    #[serde(default)]
    pub follow_up_suggestions: Vec<String>,
}

pub type ToolParams = serde_json::Value;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<DispatchResponse>> + Send>>;
pub type Handler = Arc<dyn Fn(ToolParams, ExecutionContext) -> HandlerFuture + Send + Sync>;

/// Looks up a handler by intent and invokes it with `(toolParams,
/// executionContext)`. Handlers must be idempotent and must not mutate
/// anything other than through the other components' own contracts.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<Intent, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, intent: Intent, handler: Handler) {
        self.handlers.insert(intent, handler);
    }

    pub async fn dispatch(&self, intent: Intent, params: ToolParams, context: ExecutionContext) -> Result<DispatchResponse> {
        let handler = self
            .handlers
            .get(&intent)
            .ok_or_else(|| Error::ResourceNotFound(format!("no handler registered for intent {intent:?}")))?;
        handler(params, context).await
    }
}

pub fn text_result(text: impl Into<String>) -> HandlerResult {
    HandlerResult { content: vec![ContentBlock { block_type: "text".to_string(), text: text.into() }], is_error: false }
}

pub fn error_result(text: impl Into<String>) -> HandlerResult {
    HandlerResult { content: vec![ContentBlock { block_type: "text".to_string(), text: text.into() }], is_error: true }
}
