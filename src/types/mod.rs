/**
 * Data model module (see §3) — re-exports the shared record types used across
 * every component.
 */

pub mod context_package;
pub mod intent;
pub mod project;
pub mod session;
pub mod task;

pub use context_package::{
    CodeMapInfo, ContentSection, ContextPackage, ContextPackageMetadata, FileReference, MetaPrompt,
    ModificationLikelihood, PackagedFile, Priority as FilePriority, RelevanceScore, SectionKind, SubScore,
};
pub use intent::{
    ConfidenceLevel, Entity, Intent, IntentCandidate, IntentRecognitionResult, RecognitionMetadata,
    RecognitionMethod,
};
pub use project::{
    CodebaseContextSnapshot, CodebaseSize, Complexity, ContextSource, DetectedStack, ProjectContext,
    ProjectContextMetadata, ProjectDependencies, ProjectStructure,
};
pub use session::{
    DecompositionOptions, DecompositionResult, DecompositionSession, SessionId, SessionStatus,
};
pub use task::{AtomicTask, EpicId, Priority as TaskPriority, ProjectId, QualityCriteria, TaskId, TaskStatus, TaskType};

/// The heuristic used crate-wide to approximate model token counts from
/// character length, reused from the corpus's existing context-loading code.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() as f64 / 4.0).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
