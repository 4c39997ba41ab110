/**
 * Epic-context resolver (§4.G step 4: "resolving epicId through an
 * epic-context resolver (projectId -> epic)")
 *
 * DESIGN DECISION: a trait, not a concrete lookup
 * WHY: the engine resolves an epic per sub-task at every recursion level (see
 * DESIGN.md's Open Question resolution), so the resolution strategy - a flat
 * per-project epic, a persisted epic store, whatever a deployment wires up -
 * is a pluggable collaborator rather than something the engine owns.
 */

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{EpicId, ProjectId};

#[async_trait]
pub trait EpicResolver: Send + Sync {
    async fn resolve(&self, project_id: &ProjectId) -> Result<EpicId>;
}

/// Resolves every project to a single derived epic id (`<projectId>-epic`).
/// A reasonable default when a deployment has no separate epic-tracking store.
pub struct DerivedEpicResolver;

#[async_trait]
impl EpicResolver for DerivedEpicResolver {
    async fn resolve(&self, project_id: &ProjectId) -> Result<EpicId> {
        Ok(EpicId::new(format!("{project_id}-epic")))
    }
}

/// Backed by an explicit `projectId -> epicId` table, falling back to
/// `DerivedEpicResolver` for any project not in the table. Idempotent:
/// resolving the same project id always returns the same epic.
pub struct MapEpicResolver {
    table: RwLock<HashMap<ProjectId, EpicId>>,
}

impl MapEpicResolver {
    pub fn new(table: HashMap<ProjectId, EpicId>) -> Self {
        Self { table: RwLock::new(table) }
    }

    pub async fn set(&self, project_id: ProjectId, epic_id: EpicId) {
        self.table.write().await.insert(project_id, epic_id);
    }
}

#[async_trait]
impl EpicResolver for MapEpicResolver {
    async fn resolve(&self, project_id: &ProjectId) -> Result<EpicId> {
        if let Some(epic_id) = self.table.read().await.get(project_id) {
            return Ok(epic_id.clone());
        }
        DerivedEpicResolver.resolve(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_derived_resolver_is_deterministic() {
        let resolver = DerivedEpicResolver;
        let project = ProjectId::new("P1");
        let first = resolver.resolve(&project).await.unwrap();
        let second = resolver.resolve(&project).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_map_resolver_uses_table_then_falls_back() {
        let mut table = HashMap::new();
        table.insert(ProjectId::new("P1"), EpicId::new("custom-epic"));
        let resolver = MapEpicResolver::new(table);

        assert_eq!(resolver.resolve(&ProjectId::new("P1")).await.unwrap(), EpicId::new("custom-epic"));
        assert_eq!(resolver.resolve(&ProjectId::new("P2")).await.unwrap(), EpicId::new("P2-epic"));
    }
}
