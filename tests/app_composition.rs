//! Exercises `App::bootstrap` + `App::handle` end to end through the real
//! pattern engine and dispatcher. Every trigger phrase here is confident
//! enough to resolve via the pattern engine alone, so none of these reach the
//! HTTP LLM provider `App::bootstrap` wires in - no network involved.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use curator_core::code_map::{CodeMapGenerator, GeneratorConfig, GeneratorOutput, GeneratorParams};
use curator_core::config::Config;
use curator_core::error::Result;
use curator_core::intent::ExecutionContext;
use curator_core::types::SessionId;
use curator_core::app::App;

struct UnusedGenerator {
    calls: AtomicU32,
}

#[async_trait]
impl CodeMapGenerator for UnusedGenerator {
    async fn generate(&self, _params: &GeneratorParams, _config: &GeneratorConfig, _session_context: &str, _job_id: &str) -> Result<GeneratorOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratorOutput { is_error: false, content: String::new() })
    }
}

fn context() -> ExecutionContext {
    ExecutionContext { session_id: SessionId("test-session".to_string()), current_project: None, runtime_config: HashMap::new() }
}

fn bootstrap(root: &std::path::Path) -> (App, Arc<UnusedGenerator>) {
    let generator = Arc::new(UnusedGenerator { calls: AtomicU32::new(0) });
    let config = Config { output_dir: root.join("out"), allowed_project_root: root.to_path_buf(), ..Config::default() };
    let app = App::bootstrap(config, generator.clone()).unwrap();
    (app, generator)
}

#[tokio::test]
async fn test_decompose_task_phrase_routes_to_decomposition_handler() {
    let root = tempfile::tempdir().unwrap();
    let (app, generator) = bootstrap(root.path());

    let response = app.handle("break down this task", serde_json::json!({}), context()).await.unwrap();

    assert!(!response.success);
    let text = response.result.content.first().map(|b| b.text.as_str()).unwrap_or_default();
    assert!(text.contains("session_id"), "expected a missing-session_id error, got: {text}");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0, "no code map generation should happen for a decompose_task request");
}

#[tokio::test]
async fn test_search_files_phrase_routes_to_curation_handler() {
    let root = tempfile::tempdir().unwrap();
    let (app, _generator) = bootstrap(root.path());

    let response = app.handle("find files related to the login bug", serde_json::json!({}), context()).await.unwrap();

    assert!(!response.success);
    let text = response.result.content.first().map(|b| b.text.as_str()).unwrap_or_default();
    assert!(text.contains("prompt"), "expected a missing-prompt error, got: {text}");
}

#[tokio::test]
async fn test_search_content_phrase_routes_to_curation_handler() {
    let root = tempfile::tempdir().unwrap();
    let (app, _generator) = bootstrap(root.path());

    let response = app.handle("search for login in the auth module", serde_json::json!({"prompt": "login handling"}), context()).await.unwrap();

    assert!(!response.success);
    let text = response.result.content.first().map(|b| b.text.as_str()).unwrap_or_default();
    assert!(text.contains("project_path"), "expected a missing-project_path error, got: {text}");
}
