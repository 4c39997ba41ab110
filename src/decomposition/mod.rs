/**
 * Decomposition Engine (§4.G)
 *
 * DESIGN DECISION: `start_decomposition` spawns the recursive procedure onto
 * the runtime and returns a session id immediately; the session itself lives
 * behind `Arc<RwLock<_>>` in an engine-owned table so `get_session` always
 * returns a consistent snapshot without the caller holding a lock
 * WHY: §4.G's `startDecomposition` contract is async-fire-and-poll
 * (`getSession(id)` returns a snapshot, a caller sets `cancelled` from another
 * task) - a session that had to be awaited directly could not be cancelled
 * from outside that await
 */

pub mod cycle;
pub mod epic;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;

pub use epic::{DerivedEpicResolver, EpicResolver, MapEpicResolver};

use crate::error::{Error, Result};
use crate::llm_gateway::{LlmGateway, OutputFormat, SchemaValidator};
use crate::types::{
    AtomicTask, DecompositionOptions, DecompositionResult, DecompositionSession, ProjectContext, SessionId,
    SessionStatus, TaskId, TaskPriority, TaskType,
};

const SYSTEM_PROMPT: &str = "You are a software delivery planner. Split the given task into an ordered list \
of sub-tasks small enough to each be completed independently. Respond with JSON only.";

const STRICTER_SYSTEM_PROMPT: &str = "You are a software delivery planner. Split the given task into an ordered \
list of sub-tasks small enough to each be completed independently. The `dependencies` field of each sub-task is a \
list of zero-based indices into this same array; it must not contain a cycle - every sub-task's dependencies must \
themselves have no dependency (directly or transitively) back on that sub-task. Respond with JSON only.";

#[derive(Debug, Clone, Deserialize)]
struct SubTaskSpec {
    title: String,
    description: String,
    #[serde(default, rename = "type")]
    task_type: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    estimated_hours: f64,
    #[serde(default)]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    file_paths: Vec<String>,
    #[serde(default)]
    dependencies: Vec<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DecomposeResponse {
    #[serde(default, rename = "subTasks")]
    sub_tasks: Vec<SubTaskSpec>,
}

fn schema_validator() -> &'static SchemaValidator {
    fn validator(value: &serde_json::Value) -> std::result::Result<(), String> {
        let sub_tasks = value
            .get("subTasks")
            .and_then(|v| v.as_array())
            .ok_or_else(|| "missing required field: subTasks (array)".to_string())?;
        for (i, entry) in sub_tasks.iter().enumerate() {
            if entry.get("title").and_then(|v| v.as_str()).is_none() {
                return Err(format!("subTasks[{i}] missing required field: title"));
            }
            if entry.get("description").and_then(|v| v.as_str()).is_none() {
                return Err(format!("subTasks[{i}] missing required field: description"));
            }
        }
        Ok(())
    }
    &validator
}

fn parse_priority(raw: Option<&str>) -> Option<TaskPriority> {
    match raw?.to_lowercase().as_str() {
        "low" => Some(TaskPriority::Low),
        "medium" => Some(TaskPriority::Medium),
        "high" => Some(TaskPriority::High),
        "critical" => Some(TaskPriority::Critical),
        _ => None,
    }
}

fn parse_task_type(raw: Option<&str>) -> Option<TaskType> {
    match raw?.to_lowercase().as_str() {
        "development" => Some(TaskType::Development),
        "testing" => Some(TaskType::Testing),
        "documentation" => Some(TaskType::Documentation),
        "research" => Some(TaskType::Research),
        "deployment" => Some(TaskType::Deployment),
        "review" => Some(TaskType::Review),
        _ => None,
    }
}

fn build_user_prompt(task: &AtomicTask, project: &ProjectContext) -> String {
    format!(
        "Project: {}\nTask: {}\nDescription: {}\nEstimated hours: {}\nAcceptance criteria: {:?}\n\
        Respond with JSON: {{\"subTasks\": [{{\"title\", \"description\", \"type\", \"priority\", \
        \"estimatedHours\", \"acceptanceCriteria\": [], \"filePaths\": [], \"dependencies\": []}}]}}",
        project.project_name, task.title, task.description, task.estimated_hours, task.acceptance_criteria
    )
}

type SessionHandle = Arc<RwLock<DecompositionSession>>;
type DecomposeFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<DecompositionResult>>> + Send + 'a>>;

pub struct DecompositionEngine {
    gateway: Arc<LlmGateway>,
    epic_resolver: Arc<dyn EpicResolver>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl DecompositionEngine {
    pub fn new(gateway: Arc<LlmGateway>, epic_resolver: Arc<dyn EpicResolver>) -> Self {
        Self { gateway, epic_resolver, sessions: RwLock::new(HashMap::new()) }
    }

    /// Implements `startDecomposition`: creates the session (`pending`),
    /// spawns the async run, and returns the session id immediately.
    pub async fn start_decomposition(
        self: &Arc<Self>,
        task: AtomicTask,
        project_context: ProjectContext,
        options: DecompositionOptions,
    ) -> SessionId {
        let session = DecompositionSession::new(task, project_context, options);
        let id = session.id.clone();
        let handle: SessionHandle = Arc::new(RwLock::new(session));

        self.sessions.write().await.insert(id.clone(), handle.clone());

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            Self::run_session(engine, handle).await;
        });

        id
    }

    pub async fn get_session(&self, id: &SessionId) -> Option<DecompositionSession> {
        let sessions = self.sessions.read().await;
        match sessions.get(id) {
            Some(handle) => Some(handle.read().await.clone()),
            None => None,
        }
    }

    /// A caller may cancel a running session; the engine observes this between
    /// recursion levels and terminates with `status = failed, error = "cancelled"`.
    pub async fn cancel_session(&self, id: &SessionId) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(id) {
            Some(handle) => {
                handle.write().await.cancelled = true;
                true
            }
            None => false,
        }
    }

    async fn run_session(engine: Arc<Self>, handle: SessionHandle) {
        {
            let mut session = handle.write().await;
            session.status = SessionStatus::InProgress;
            session.started_at = Some(Utc::now());
        }

        let (task, project_context, options) = {
            let session = handle.read().await;
            (session.originating_task.clone(), session.project_context.clone(), session.options.clone())
        };

        let outcome = engine.decompose(&task, 0, &project_context, &options, &handle).await;

        let mut session = handle.write().await;
        match outcome {
            Ok(results) => {
                session.results = results;
                session.status = SessionStatus::Completed;
            }
            Err(err) => {
                session.error = Some(format!("{:?}: {err}", err.kind()));
                session.status = SessionStatus::Failed;
            }
        }
        session.finished_at = Some(Utc::now());
    }

    fn leaf(task: &AtomicTask, depth: u8) -> Vec<DecompositionResult> {
        vec![DecompositionResult { parent: task.clone(), sub_tasks: vec![task.clone()], depth }]
    }

    fn decompose<'a>(
        &'a self,
        task: &'a AtomicTask,
        depth: u8,
        project_context: &'a ProjectContext,
        options: &'a DecompositionOptions,
        handle: &'a SessionHandle,
    ) -> DecomposeFuture<'a> {
        Box::pin(async move {
            if handle.read().await.cancelled {
                return Err(Error::Cancelled);
            }

            if depth >= options.max_depth || (task.estimated_hours <= options.max_hours && !options.force_decomposition) {
                return Ok(Self::leaf(task, depth));
            }

            if task.is_atomic(options.min_hours, options.max_hours) && !options.force_decomposition {
                return Ok(Self::leaf(task, depth));
            }

            let specs = self.call_llm_for_subtasks(task, project_context, false).await?;
            if specs.is_empty() {
                return Ok(Self::leaf(task, depth));
            }

            let specs = match Self::cycle_free(&specs) {
                true => specs,
                false => {
                    let retry = self.call_llm_for_subtasks(task, project_context, true).await?;
                    if retry.is_empty() || !Self::cycle_free(&retry) {
                        return Ok(Self::leaf(task, depth));
                    }
                    retry
                }
            };

            let sub_tasks = self.materialize(task, &specs, options).await?;

            let mut results = vec![DecompositionResult { parent: task.clone(), sub_tasks: sub_tasks.clone(), depth }];
            for sub_task in &sub_tasks {
                if handle.read().await.cancelled {
                    return Err(Error::Cancelled);
                }
                let child_results = self.decompose(sub_task, depth + 1, project_context, options, handle).await?;
                results.extend(child_results);
            }

            Ok(results)
        })
    }

    fn cycle_free(specs: &[SubTaskSpec]) -> bool {
        let edges: Vec<Vec<usize>> = specs.iter().map(|s| s.dependencies.clone()).collect();
        !cycle::has_cycle(&edges)
    }

    async fn call_llm_for_subtasks(&self, task: &AtomicTask, project: &ProjectContext, stricter: bool) -> Result<Vec<SubTaskSpec>> {
        let system_prompt = if stricter { STRICTER_SYSTEM_PROMPT } else { SYSTEM_PROMPT };
        let user_prompt = build_user_prompt(task, project);

        let raw = self
            .gateway
            .call(&user_prompt, Some(system_prompt), "task_decomposition", OutputFormat::Json, Some(schema_validator()), 0.1)
            .await?;

        let parsed: DecomposeResponse = serde_json::from_str(&raw).map_err(|e| Error::InvalidModelOutput(e.to_string()))?;
        Ok(parsed.sub_tasks)
    }

    async fn materialize(&self, parent: &AtomicTask, specs: &[SubTaskSpec], options: &DecompositionOptions) -> Result<Vec<AtomicTask>> {
        let now = Utc::now();
        let mut tasks = Vec::with_capacity(specs.len());

        for (index, spec) in specs.iter().enumerate() {
            let epic_id = self.epic_resolver.resolve(&parent.project_id).await?;

            let mut estimated_hours = spec.estimated_hours;
            let mut tags = Vec::new();
            if estimated_hours > parent.estimated_hours {
                estimated_hours = parent.estimated_hours.min(options.max_hours);
                tags.push("warning:estimated_hours_clamped".to_string());
            }

            let dependencies = spec
                .dependencies
                .iter()
                .filter(|&&dep| dep != index)
                .map(|&dep| TaskId::new(format!("{}.{}", parent.id, dep + 1)))
                .collect();

            tasks.push(AtomicTask {
                id: TaskId::new(format!("{}.{}", parent.id, index + 1)),
                title: spec.title.clone(),
                description: spec.description.clone(),
                status: crate::types::TaskStatus::Pending,
                priority: parse_priority(spec.priority.as_deref()).unwrap_or(parent.priority),
                task_type: parse_task_type(spec.task_type.as_deref()).unwrap_or(parent.task_type),
                estimated_hours,
                actual_hours: None,
                project_id: parent.project_id.clone(),
                epic_id,
                dependencies,
                dependents: Vec::new(),
                file_paths: spec.file_paths.clone(),
                acceptance_criteria: spec.acceptance_criteria.clone(),
                criteria: Default::default(),
                validation_methods: Vec::new(),
                assigned_agent: None,
                created_at: now,
                updated_at: now,
                started_at: None,
                completed_at: None,
                created_by: parent.created_by.clone(),
                tags,
                metadata: HashMap::new(),
            });
        }

        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm_gateway::{LlmProvider, Message};
    use crate::types::{CodebaseSize, Complexity, ContextSource, EpicId, ProjectContextMetadata, ProjectId, QualityCriteria, TaskStatus};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::time::Duration;

    struct ScriptedProvider {
        responses: tokio::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(&self, _model: &str, _messages: &[Message], _temperature: f64, _format: OutputFormat) -> Result<String> {
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                return Ok(r#"{"subTasks":[]}"#.to_string());
            }
            Ok(responses.remove(0))
        }
    }

    fn gateway(responses: Vec<&str>) -> Arc<LlmGateway> {
        let provider = Arc::new(ScriptedProvider {
            responses: tokio::sync::Mutex::new(responses.into_iter().map(String::from).collect()),
        });
        Arc::new(LlmGateway::new(provider, LlmConfig { max_retries: 1, ..LlmConfig::default() }))
    }

    fn engine(responses: Vec<&str>) -> Arc<DecompositionEngine> {
        Arc::new(DecompositionEngine::new(gateway(responses), Arc::new(DerivedEpicResolver)))
    }

    fn sample_task(id: &str, hours: f64, description: &str, criteria: Vec<String>) -> AtomicTask {
        AtomicTask {
            id: TaskId::new(id),
            title: "sample".to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            task_type: TaskType::Development,
            estimated_hours: hours,
            actual_hours: None,
            project_id: ProjectId::new("P1"),
            epic_id: EpicId::new("E1"),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            file_paths: Vec::new(),
            acceptance_criteria: criteria,
            criteria: QualityCriteria::default(),
            validation_methods: Vec::new(),
            assigned_agent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
            created_by: "test".to_string(),
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    fn sample_project() -> ProjectContext {
        ProjectContext {
            project_id: ProjectId::new("P1"),
            project_path: PathBuf::from("/tmp/p"),
            project_name: "p".to_string(),
            description: String::new(),
            detected: Default::default(),
            existing_tasks_summary: String::new(),
            codebase_size: CodebaseSize::Small,
            team_size: 1,
            complexity: Complexity::Low,
            structure: Default::default(),
            dependencies: Default::default(),
            codebase_context: Default::default(),
            metadata: ProjectContextMetadata { created_at: Utc::now(), updated_at: Utc::now(), version: "1".to_string(), source: ContextSource::Auto },
        }
    }

    async fn wait_for_completion(engine: &Arc<DecompositionEngine>, id: &SessionId) -> DecompositionSession {
        for _ in 0..200 {
            let session = engine.get_session(id).await.unwrap();
            if matches!(session.status, SessionStatus::Completed | SessionStatus::Failed) {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session did not finish in time");
    }

    #[tokio::test]
    async fn test_atomic_task_is_a_single_leaf() {
        let engine = engine(vec![]);
        let task = sample_task("T1", 2.0, "Add a login button to the nav", vec!["visible on mobile".to_string()]);

        let id = engine.start_decomposition(task.clone(), sample_project(), DecompositionOptions::default()).await;
        let session = wait_for_completion(&engine, &id).await;

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.results.len(), 1);
        assert_eq!(session.results[0].sub_tasks.len(), 1);
        assert_eq!(session.results[0].sub_tasks[0].id, task.id);
    }

    #[tokio::test]
    async fn test_recursive_decomposition_produces_atomic_leaves() {
        let level1 = r#"{"subTasks":[
            {"title":"design","description":"design the auth schema end to end","estimatedHours":8,"dependencies":[]},
            {"title":"implement","description":"implement the auth endpoints and middleware","estimatedHours":10,"dependencies":[0]}
        ]}"#;
        let level2a = r#"{"subTasks":[
            {"title":"design-a","description":"design the user table and session store","estimatedHours":3,"acceptanceCriteria":["schema reviewed"],"dependencies":[]},
            {"title":"design-b","description":"design the token rotation policy in detail","estimatedHours":3,"acceptanceCriteria":["policy documented"],"dependencies":[]}
        ]}"#;
        let level2b = r#"{"subTasks":[
            {"title":"impl-a","description":"implement the login and logout endpoints","estimatedHours":3,"acceptanceCriteria":["tests pass"],"dependencies":[]},
            {"title":"impl-b","description":"implement the session refresh middleware","estimatedHours":3,"acceptanceCriteria":["tests pass"],"dependencies":[]}
        ]}"#;

        let engine = engine(vec![level1, level2a, level2b]);
        let task = sample_task("T2", 20.0, "implement full auth", vec![]);
        let options = DecompositionOptions { max_depth: 3, min_hours: 0.1, max_hours: 4.0, force_decomposition: false };

        let id = engine.start_decomposition(task, sample_project(), options).await;
        let session = wait_for_completion(&engine, &id).await;

        assert_eq!(session.status, SessionStatus::Completed);
        let leaves: Vec<_> = session.results.iter().filter(|r| r.sub_tasks.len() == 1 && r.sub_tasks[0].id == r.parent.id).collect();
        assert!(leaves.len() >= 3);
        for leaf in &leaves {
            assert!(leaf.sub_tasks[0].estimated_hours <= 4.0);
            assert!(leaf.depth <= 3);
        }
    }

    #[tokio::test]
    async fn test_cycle_triggers_retry_then_leaf_fallback() {
        let cyclic = r#"{"subTasks":[
            {"title":"a","description":"a description that is definitely long enough here","estimatedHours":3,"dependencies":[1]},
            {"title":"b","description":"a description that is definitely long enough here","estimatedHours":3,"dependencies":[0]}
        ]}"#;

        let engine = engine(vec![cyclic, cyclic]);
        let task = sample_task("T3", 10.0, "a description that is definitely long enough here", vec![]);
        let options = DecompositionOptions { max_depth: 3, min_hours: 0.1, max_hours: 4.0, force_decomposition: false };

        let id = engine.start_decomposition(task.clone(), sample_project(), options).await;
        let session = wait_for_completion(&engine, &id).await;

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.results.len(), 1);
        assert_eq!(session.results[0].sub_tasks[0].id, task.id);
    }

    #[tokio::test]
    async fn test_empty_subtasks_falls_back_to_leaf() {
        let engine = engine(vec![r#"{"subTasks":[]}"#]);
        let task = sample_task("T4", 10.0, "a description with no acceptance criteria at all", vec![]);

        let id = engine.start_decomposition(task.clone(), sample_project(), DecompositionOptions::default()).await;
        let session = wait_for_completion(&engine, &id).await;

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.results[0].sub_tasks[0].id, task.id);
    }

    #[tokio::test]
    async fn test_cancellation_fails_session() {
        let engine = engine(vec![r#"{"subTasks":[{"title":"x","description":"a long enough description for a subtask","estimatedHours":3,"dependencies":[]}]}"#]);
        let task = sample_task("T5", 20.0, "needs real decomposition work across modules", vec![]);

        let id = engine.start_decomposition(task, sample_project(), DecompositionOptions::default()).await;
        engine.cancel_session(&id).await;
        let session = wait_for_completion(&engine, &id).await;

        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.error.as_deref(), Some("Cancelled: cancelled"));
    }

    #[tokio::test]
    async fn test_subtask_hours_clamped_to_parent() {
        let engine = engine(vec![
            r#"{"subTasks":[{"title":"x","description":"a long enough description for a subtask","estimatedHours":99,"acceptanceCriteria":["done"],"dependencies":[]}]}"#,
        ]);
        let task = sample_task("T6", 10.0, "a description long enough to not be a leaf right away", vec![]);
        let options = DecompositionOptions { max_depth: 1, min_hours: 0.1, max_hours: 4.0, force_decomposition: false };

        let id = engine.start_decomposition(task, sample_project(), options).await;
        let session = wait_for_completion(&engine, &id).await;

        let sub_task = &session.results[0].sub_tasks[0];
        assert!(sub_task.estimated_hours <= 4.0);
        assert!(sub_task.tags.contains(&"warning:estimated_hours_clamped".to_string()));
    }

    #[test]
    fn test_parse_priority_and_task_type() {
        assert_eq!(parse_priority(Some("high")), Some(TaskPriority::High));
        assert_eq!(parse_priority(Some("not-a-priority")), None);
        assert_eq!(parse_task_type(Some("testing")), Some(TaskType::Testing));
        assert_eq!(parse_task_type(None), None);
    }
}
