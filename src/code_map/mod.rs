/**
 * Code-Map Provider (§4.B)
 *
 * DESIGN DECISION: the external code-map generator is modeled as a trait, so
 * the provider is unit-testable without an external process
 * WHY: `generate` must invoke "the external code-map generator"; in this
 * codebase that is a collaborator we do not control and only talk to through
 * the narrow contract in §6
 *
 * PATTERN: callback-style update subscriptions replaced with an explicit event
 * channel, per §9
 */

pub mod markdown;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tokio::sync::{broadcast, Mutex};

use crate::error::{Error, Result};
use crate::types::CodeMapInfo;

pub use markdown::{extract_architectural_info, extract_dependency_info, extract_relevant_files, ArchitecturalInfo, DependencyInfo};

#[derive(Debug, Clone)]
pub struct GeneratorParams {
    pub allowed_mapping_directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub max_depth: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct GeneratorOutput {
    pub is_error: bool,
    pub content: String,
}

/// The external generator's contract (§6): `generate(params, config,
/// sessionContext, jobId) -> {isError, content}`.
#[async_trait]
pub trait CodeMapGenerator: Send + Sync {
    async fn generate(
        &self,
        params: &GeneratorParams,
        config: &GeneratorConfig,
        session_context: &str,
        job_id: &str,
    ) -> Result<GeneratorOutput>;
}

#[derive(Debug, Clone)]
pub enum CodeMapEvent {
    Generated { project_path: PathBuf, file_path: PathBuf },
    Refreshed { project_path: PathBuf },
    Validated { project_path: PathBuf },
    Error { project_path: PathBuf, message: String },
}

fn output_path_regexes() -> &'static [Regex] {
    use std::sync::OnceLock;
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            Regex::new(r"Generated code map:\s*(\S+)").unwrap(),
            Regex::new(r"\*\*Output saved to:\*\*\s*(\S+)").unwrap(),
            Regex::new(r"Output file:\s*(\S+)").unwrap(),
        ]
    })
}

/// Extracts the generated `.md` path from the generator's freeform output text
/// by matching one of a small set of documented phrases.
pub fn extract_output_path(content: &str) -> Option<PathBuf> {
    for re in output_path_regexes() {
        if let Some(caps) = re.captures(content) {
            return Some(PathBuf::from(caps.get(1).unwrap().as_str()));
        }
    }
    None
}

pub struct CodeMapProvider {
    output_dir: PathBuf,
    generator: Arc<dyn CodeMapGenerator>,
    cache: Mutex<HashMap<PathBuf, CodeMapInfo>>,
    generation_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    events: broadcast::Sender<CodeMapEvent>,
}

impl CodeMapProvider {
    pub fn new(output_dir: PathBuf, generator: Arc<dyn CodeMapGenerator>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            output_dir,
            generator,
            cache: Mutex::new(HashMap::new()),
            generation_locks: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CodeMapEvent> {
        self.events.subscribe()
    }

    /// Scans `output_dir` for the most-recent `.md` file whose first 20 lines
    /// mention the absolute project path or its basename. Never returns a
    /// path outside the configured output base.
    pub async fn detect_existing(&self, project_path: &Path) -> Option<CodeMapInfo> {
        if let Some(cached) = self.cache.lock().await.get(project_path) {
            return Some(cached.clone());
        }

        let basename = project_path.file_name()?.to_string_lossy().to_string();
        let absolute = project_path.to_string_lossy().to_string();

        let mut candidates: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        for entry in walkdir::WalkDir::new(&self.output_dir).into_iter().flatten() {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(entry.path()) else { continue };
            let header: String = contents.lines().take(20).collect::<Vec<_>>().join("\n");
            if header.contains(&absolute) || header.contains(&basename) {
                if let Ok(metadata) = entry.metadata() {
                    if let Ok(modified) = metadata.modified() {
                        candidates.push((entry.path().to_path_buf(), modified));
                    }
                }
            }
        }

        candidates.sort_by_key(|(_, modified)| *modified);
        let (path, modified) = candidates.pop()?;
        let file_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        let info = CodeMapInfo {
            file_path: path,
            generated_at: chrono::DateTime::<Utc>::from(modified),
            project_path: project_path.to_path_buf(),
            file_size,
        };
        self.cache.lock().await.insert(project_path.to_path_buf(), info.clone());
        Some(info)
    }

    pub async fn is_stale(&self, project_path: &Path, max_age_minutes: u32) -> bool {
        match self.detect_existing(project_path).await {
            None => true,
            Some(info) => info.is_stale(chrono::Duration::minutes(max_age_minutes as i64)),
        }
    }

    async fn lock_for(&self, project_path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.generation_locks.lock().await;
        locks
            .entry(project_path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Invokes the external generator; per-project generation is serialized
    /// via a per-path mutex so concurrent callers share the single in-flight
    /// attempt's result rather than racing the generator.
    pub async fn generate(&self, project_path: &Path, config: GeneratorConfig) -> Result<CodeMapInfo> {
        let lock = self.lock_for(project_path).await;
        let _guard = lock.lock().await;

        let job_id = uuid::Uuid::new_v4().to_string();
        let params = GeneratorParams { allowed_mapping_directory: self.output_dir.clone() };
        let output = self
            .generator
            .generate(&params, &config, &project_path.to_string_lossy(), &job_id)
            .await;

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                let _ = self.events.send(CodeMapEvent::Error {
                    project_path: project_path.to_path_buf(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        if output.is_error {
            let message = output.content.clone();
            let _ = self.events.send(CodeMapEvent::Error { project_path: project_path.to_path_buf(), message: message.clone() });
            return Err(Error::ProviderUnavailable(message));
        }

        let file_path = extract_output_path(&output.content)
            .ok_or_else(|| Error::InvalidModelOutput("generator output did not contain a map path".to_string()))?;

        let file_size = std::fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);
        let info = CodeMapInfo {
            file_path: file_path.clone(),
            generated_at: Utc::now(),
            project_path: project_path.to_path_buf(),
            file_size,
        };

        self.cache.lock().await.insert(project_path.to_path_buf(), info.clone());
        let _ = self.events.send(CodeMapEvent::Generated { project_path: project_path.to_path_buf(), file_path });

        Ok(info)
    }

    /// No-op if fresh and not forced; otherwise regenerates.
    pub async fn refresh(&self, project_path: &Path, max_age_minutes: u32, force: bool) -> Result<CodeMapInfo> {
        if !force {
            if let Some(info) = self.detect_existing(project_path).await {
                if !info.is_stale(chrono::Duration::minutes(max_age_minutes as i64)) {
                    return Ok(info);
                }
            }
        }
        let info = self.generate(project_path, GeneratorConfig { max_depth: None }).await?;
        let _ = self.events.send(CodeMapEvent::Refreshed { project_path: project_path.to_path_buf() });
        Ok(info)
    }

    pub fn read_content(&self, info: &CodeMapInfo) -> Result<String> {
        std::fs::read_to_string(&info.file_path).map_err(Error::from)
    }
}
