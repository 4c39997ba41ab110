/**
 * Composition root (§9)
 *
 * DESIGN DECISION: `App::bootstrap` builds every component once, explicitly,
 * and wires dispatcher handlers as thin closures into the other components
 * WHY: §9 calls for no ambient singletons - every component receives its
 * collaborators through its constructor, and the dispatcher is the only place
 * that knows how an intent maps to a component call
 */

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::curation::{CurationPipeline, CurationRequest, OutputFormatKind};
use crate::decomposition::{DecompositionEngine, DerivedEpicResolver};
use crate::error::Result;
use crate::intent::dispatcher::{error_result, text_result, ExecutionContext};
use crate::intent::{Dispatcher, FallbackConfig, IntentEngine, IntentEngineConfig, IntentFallback};
use crate::llm_gateway::{HttpLlmProvider, LlmGateway, LlmProvider};
use crate::types::Intent;

use crate::code_map::{CodeMapGenerator, CodeMapProvider};

/// A fully wired instance: the LLM gateway, code-map provider, decomposition
/// engine, and curation pipeline, plus the intent engine and dispatcher that
/// sit in front of them.
pub struct App {
    pub config: Config,
    pub gateway: Arc<LlmGateway>,
    pub code_map: Arc<CodeMapProvider>,
    pub decomposition: Arc<DecompositionEngine>,
    pub curation: Arc<CurationPipeline>,
    pub intent_engine: Arc<IntentEngine>,
    pub dispatcher: Dispatcher,
}

impl App {
    /// Builds every component from `config`, using the default HTTP LLM
    /// provider and the given code-map generator collaborator (the generator
    /// is an external process this crate does not implement - see §6).
    pub fn bootstrap(config: Config, code_map_generator: Arc<dyn CodeMapGenerator>) -> Result<Self> {
        init_logging(&config.log_level);

        let provider: Arc<dyn LlmProvider> =
            Arc::new(HttpLlmProvider::new(config.llm.endpoint.clone(), config.llm.api_key.clone(), std::time::Duration::from_secs(config.llm.timeout_secs)));
        let gateway = Arc::new(LlmGateway::new(provider, config.llm.clone()));

        let code_map = Arc::new(CodeMapProvider::new(config.output_dir.clone(), code_map_generator));

        let decomposition = Arc::new(DecompositionEngine::new(Arc::clone(&gateway), Arc::new(DerivedEpicResolver)));

        let curation = Arc::new(CurationPipeline::new(Arc::clone(&gateway), Arc::clone(&code_map), config.allowed_project_root.clone(), config.output_dir.clone()));

        let fallback = IntentFallback::new(Arc::clone(&gateway), FallbackConfig::default());
        let intent_engine = Arc::new(IntentEngine::new(fallback, IntentEngineConfig::default()));

        let dispatcher = build_dispatcher(Arc::clone(&decomposition), Arc::clone(&curation));

        Ok(Self { config, gateway, code_map, decomposition, curation, intent_engine, dispatcher })
    }

    /// Recognizes the intent behind `text`, then dispatches it with `params`.
    pub async fn handle(&self, text: &str, params: serde_json::Value, context: ExecutionContext) -> Result<crate::intent::DispatchResponse> {
        let recognized = self.intent_engine.recognize(text, None).await?;
        self.dispatcher.dispatch(recognized.intent, params, context).await
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Registers the handlers this crate owns directly. A deployment with its own
/// project/task storage registers the remaining intents (`CreateProject`,
/// `ListTasks`, …) itself; this dispatcher only wires the two components
/// built in this crate.
fn build_dispatcher(decomposition: Arc<DecompositionEngine>, curation: Arc<CurationPipeline>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();

    dispatcher.register(
        Intent::DecomposeTask,
        Arc::new(move |params, _ctx| {
            let decomposition = Arc::clone(&decomposition);
            Box::pin(async move { decompose_task_handler(decomposition, params).await })
        }),
    );

    dispatcher.register(Intent::SearchFiles, {
        let curation = Arc::clone(&curation);
        Arc::new(move |params, _ctx| {
            let curation = Arc::clone(&curation);
            Box::pin(async move { curate_context_handler(curation, params).await })
        })
    });

    dispatcher.register(
        Intent::SearchContent,
        Arc::new(move |params, _ctx| {
            let curation = Arc::clone(&curation);
            Box::pin(async move { curate_context_handler(curation, params).await })
        }),
    );

    dispatcher
}

async fn decompose_task_handler(decomposition: Arc<DecompositionEngine>, params: serde_json::Value) -> Result<crate::intent::DispatchResponse> {
    let session_id = match params.get("session_id").and_then(|v| v.as_str()) {
        Some(raw) => crate::types::SessionId(raw.to_string()),
        None => return Ok(error_response("decompose_task requires a session_id from a prior start call")),
    };

    match decomposition.get_session(&session_id).await {
        Some(session) => Ok(crate::intent::DispatchResponse {
            success: session.status == crate::types::SessionStatus::Completed,
            result: text_result(format!("{:?}", session.status)),
            follow_up_suggestions: Vec::new(),
        }),
        None => Ok(error_response(&format!("no decomposition session found for {session_id}"))),
    }
}

async fn curate_context_handler(curation: Arc<CurationPipeline>, params: serde_json::Value) -> Result<crate::intent::DispatchResponse> {
    let prompt = match params.get("prompt").and_then(|v| v.as_str()) {
        Some(p) => p.to_string(),
        None => return Ok(error_response("search_files/search_content requires a prompt")),
    };
    let project_path = match params.get("project_path").and_then(|v| v.as_str()) {
        Some(p) => std::path::PathBuf::from(p),
        None => return Ok(error_response("search_files/search_content requires a project_path")),
    };

    let mut request = CurationRequest::new(prompt, project_path);
    if let Some(task_type) = params.get("task_type").and_then(|v| v.as_str()) {
        request.task_type = task_type.to_string();
    }
    if let Some(max_files) = params.get("max_files").and_then(|v| v.as_u64()) {
        request.max_files = max_files as usize;
    }
    if let Some(budget) = params.get("max_token_budget").and_then(|v| v.as_u64()) {
        request.max_token_budget = budget as usize;
    }
    if params.get("output_format").and_then(|v| v.as_str()) == Some("json") {
        request.output_format = OutputFormatKind::Json;
    }

    match curation.run(request).await {
        Ok((_, summary)) => Ok(crate::intent::DispatchResponse {
            success: true,
            result: text_result(format!(
                "curated {} files ({} tokens) -> {}",
                summary.total_files,
                summary.total_tokens,
                summary.output_path.display()
            )),
            follow_up_suggestions: Vec::new(),
        }),
        Err(err) => Ok(error_response(&err.to_string())),
    }
}

fn error_response(message: &str) -> crate::intent::DispatchResponse {
    crate::intent::DispatchResponse { success: false, result: error_result(message), follow_up_suggestions: Vec::new() }
}
