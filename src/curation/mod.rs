/**
 * Context Curation Pipeline (§4.H)
 *
 * DESIGN DECISION: one `CurationPipeline::run` orchestrates eight phase
 * functions sequentially, threading a `PipelineContext` accumulator so a
 * later phase can read an earlier phase's output
 * WHY: §5's ordering guarantee - "within a single session, phase outputs are
 * visible to later phases in pipeline order" - is easiest to honor as a
 * straight-line function over a single mutable struct rather than scattering
 * intermediate state across the phase modules themselves
 */

pub mod assembly;
pub mod discovery;
pub mod intent_analysis;
pub mod meta_prompt;
pub mod output;
pub mod refinement;
pub mod scoring;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::code_map::CodeMapProvider;
use crate::error::{Error, Result};
use crate::llm_gateway::LlmGateway;
use crate::secure_path::validate_path;
use crate::types::{ContextPackage, ProjectContext};

pub use discovery::FileCandidate;
pub use intent_analysis::{AnalysisScope, IntentAnalysisResult, LanguageAnalysisResult, ProjectTypeAnalysisResult, RiskLevel};
pub use output::CurationSummary;
pub use scoring::{RelevanceTier, ScoredFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatKind {
    Xml,
    Json,
}

#[derive(Debug, Clone)]
pub struct CurationRequest {
    pub prompt: String,
    pub project_path: PathBuf,
    pub task_type: String,
    pub max_files: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub focus_areas: Vec<String>,
    pub max_token_budget: usize,
    pub output_format: OutputFormatKind,
    pub use_code_map_cache: bool,
    pub cache_max_age_minutes: u32,
}

impl CurationRequest {
    pub fn new(prompt: impl Into<String>, project_path: PathBuf) -> Self {
        Self {
            prompt: prompt.into(),
            project_path,
            task_type: "general".to_string(),
            max_files: 100,
            include_patterns: vec!["**/*".to_string()],
            exclude_patterns: vec!["node_modules/**".to_string(), ".git/**".to_string(), "dist/**".to_string(), "build/**".to_string()],
            focus_areas: Vec::new(),
            max_token_budget: 250_000,
            output_format: OutputFormatKind::Xml,
            use_code_map_cache: true,
            cache_max_age_minutes: 60,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(1..=1000).contains(&self.max_files) {
            return Err(Error::InvalidInput("max_files must be between 1 and 1000".to_string()));
        }
        if !(1_000..=500_000).contains(&self.max_token_budget) {
            return Err(Error::InvalidInput("max_token_budget must be between 1000 and 500000".to_string()));
        }
        if !(1..=1440).contains(&self.cache_max_age_minutes) {
            return Err(Error::InvalidInput("cache_max_age_minutes must be between 1 and 1440".to_string()));
        }
        Ok(())
    }
}

/// Accumulates each phase's output so later phases (and the final summary)
/// can read earlier results, per §5's pipeline ordering guarantee.
pub(crate) struct PipelineContext {
    pub job_id: String,
    pub started_at: Instant,
    pub codemap_path: PathBuf,
    pub codemap_content: String,
    pub codemap_cache_used: bool,
    pub intent: IntentAnalysisResult,
    pub project_analysis: ProjectTypeAnalysisResult,
    pub language_analysis: LanguageAnalysisResult,
    pub refined_prompt: String,
    pub candidates: Vec<FileCandidate>,
    pub scored: Vec<ScoredFile>,
    pub chunking_used: bool,
    pub meta_prompt: crate::types::MetaPrompt,
}

pub struct CurationPipeline {
    gateway: Arc<LlmGateway>,
    code_map: Arc<CodeMapProvider>,
    allowed_root: PathBuf,
    output_dir: PathBuf,
}

impl CurationPipeline {
    pub fn new(gateway: Arc<LlmGateway>, code_map: Arc<CodeMapProvider>, allowed_root: PathBuf, output_dir: PathBuf) -> Self {
        Self { gateway, code_map, allowed_root, output_dir }
    }

    /// Runs all eight phases in order. On any phase's failure, the pipeline
    /// short-circuits and returns that phase's error; per §4.H, the failing
    /// phase name is folded into the error message so it surfaces to the
    /// caller without a separate out-of-band channel.
    pub async fn run(&self, request: CurationRequest) -> Result<(ContextPackage, CurationSummary)> {
        request.validate()?;
        let job_id = uuid::Uuid::new_v4().to_string();
        let started_at = Instant::now();

        let project_context = self.bootstrap_project_context(&request).await?;

        let (codemap_path, codemap_content, codemap_cache_used) =
            self.phase1_initialization(&request).await.map_err(|e| phase_error("initialization", e))?;

        let mut ctx = PipelineContext {
            job_id,
            started_at,
            codemap_path,
            codemap_content,
            codemap_cache_used,
            intent: IntentAnalysisResult::default(),
            project_analysis: ProjectTypeAnalysisResult::default(),
            language_analysis: LanguageAnalysisResult::default(),
            refined_prompt: String::new(),
            candidates: Vec::new(),
            scored: Vec::new(),
            chunking_used: false,
            meta_prompt: crate::types::MetaPrompt {
                task_type: request.task_type.clone(),
                system_prompt: String::new(),
                user_prompt: String::new(),
                context_summary: String::new(),
                task_decomposition: serde_json::json!({}),
                guidelines: Vec::new(),
                estimated_complexity: String::new(),
                quality_score: 0.0,
                ai_agent_response_format: None,
            },
        };

        let (intent, project_analysis, language_analysis) = intent_analysis::run(&self.gateway, &request, &ctx.codemap_content)
            .await
            .map_err(|e| phase_error("intent_analysis", e))?;
        ctx.intent = intent;
        ctx.project_analysis = project_analysis;
        ctx.language_analysis = language_analysis;

        ctx.refined_prompt =
            refinement::run(&self.gateway, &request.prompt, &ctx.intent).await.map_err(|e| phase_error("prompt_refinement", e))?;

        ctx.candidates = discovery::run(&request, &project_context, &ctx.codemap_content, &ctx.refined_prompt)
            .await
            .map_err(|e| phase_error("file_discovery", e))?;

        let (scored, chunking_used) = scoring::run(&self.gateway, &request, &ctx.candidates, &ctx.refined_prompt)
            .await
            .map_err(|e| phase_error("relevance_scoring", e))?;
        ctx.scored = scored;
        ctx.chunking_used = chunking_used;

        ctx.meta_prompt = meta_prompt::run(&self.gateway, &request, &ctx.intent, &ctx.scored)
            .await
            .map_err(|e| phase_error("meta_prompt_generation", e))?;

        let package =
            assembly::run(&request, &project_context, &ctx).await.map_err(|e| phase_error("package_assembly", e))?;

        let summary = output::run(&self.output_dir, &self.allowed_root, &request, &ctx, &package)
            .await
            .map_err(|e| phase_error("output_generation", e))?;

        Ok((package, summary))
    }

    /// Phase 1: validate the project path, then reuse a fresh cached code map
    /// or invoke the generator.
    async fn phase1_initialization(&self, request: &CurationRequest) -> Result<(PathBuf, String, bool)> {
        validate_path(&request.project_path, &self.allowed_root)?;

        if request.use_code_map_cache {
            if let Some(info) = self.code_map.detect_existing(&request.project_path).await {
                if !info.is_stale(chrono::Duration::minutes(request.cache_max_age_minutes as i64)) {
                    let content = self.code_map.read_content(&info)?;
                    return Ok((info.file_path, content, true));
                }
            }
        }

        let info = self
            .code_map
            .refresh(&request.project_path, request.cache_max_age_minutes, !request.use_code_map_cache)
            .await?;
        let content = self.code_map.read_content(&info)?;
        Ok((info.file_path, content, false))
    }

    /// Builds a minimal read-only project-context snapshot used by discovery
    /// and assembly; a full application composes this once per session from
    /// richer sources (PRD/task-list via C, prior sessions, …) and would pass
    /// it in rather than rebuilding it here, but the pipeline needs at least
    /// `project_path`/`project_id` to run standalone.
    async fn bootstrap_project_context(&self, request: &CurationRequest) -> Result<ProjectContext> {
        use crate::types::{CodebaseContextSnapshot, CodebaseSize, Complexity, ContextSource, ProjectContextMetadata, ProjectDependencies, ProjectId, ProjectStructure};

        let name = request.project_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "project".to_string());

        Ok(ProjectContext {
            project_id: ProjectId::new(name.clone()),
            project_path: request.project_path.clone(),
            project_name: name,
            description: String::new(),
            detected: Default::default(),
            existing_tasks_summary: String::new(),
            codebase_size: CodebaseSize::Medium,
            team_size: 1,
            complexity: Complexity::Medium,
            structure: ProjectStructure::default(),
            dependencies: ProjectDependencies::default(),
            codebase_context: CodebaseContextSnapshot::default(),
            metadata: ProjectContextMetadata { created_at: chrono::Utc::now(), updated_at: chrono::Utc::now(), version: "1".to_string(), source: ContextSource::Auto },
        })
    }
}

/// Tags an error with the phase it failed in, preserving its variant so
/// callers can still match on `kind()`/`recoverable()`.
fn phase_error(phase: &str, err: Error) -> Error {
    match err {
        Error::InvalidInput(msg) => Error::InvalidInput(format!("[{phase}] {msg}")),
        Error::ResourceNotFound(msg) => Error::ResourceNotFound(format!("[{phase}] {msg}")),
        Error::ProviderUnavailable(msg) => Error::ProviderUnavailable(format!("[{phase}] {msg}")),
        Error::InvalidModelOutput(msg) => Error::InvalidModelOutput(format!("[{phase}] {msg}")),
        Error::SchemaViolation(msg) => Error::SchemaViolation(format!("[{phase}] {msg}")),
        Error::Internal(msg) => Error::Internal(format!("[{phase}] {msg}")),
        Error::Timeout(d) => Error::Timeout(d),
        Error::Cancelled => Error::Cancelled,
    }
}
