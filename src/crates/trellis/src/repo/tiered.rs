//! Two-tier repositories: in-memory cache in front of the durable store.
//!
//! Policy, identical for every operation family:
//! - writes go to memory (errors ignored) then to the durable store (errors
//!   returned);
//! - reads hit memory first and fall back to the durable store, caching the
//!   result;
//! - lists prefer the durable store and fall back to memory with a logged
//!   warning.
//!
//! The wrapper is only installed when a durable store is configured, so an
//! unreachable database degrades the product to memory-only instead of
//! failing user operations.

use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineRun};
use crate::repo::{PipelineRepository, PipelineRunRepository, WorkflowRepository};
use async_trait::async_trait;
use engine::WorkflowDefinition;
use std::sync::Arc;
use tracing::warn;

/// Two-tier workflow store.
pub struct TieredWorkflowRepository {
    memory: Arc<dyn WorkflowRepository>,
    durable: Arc<dyn WorkflowRepository>,
}

impl TieredWorkflowRepository {
    pub fn new(
        memory: Arc<dyn WorkflowRepository>,
        durable: Arc<dyn WorkflowRepository>,
    ) -> Self {
        Self { memory, durable }
    }
}

#[async_trait]
impl WorkflowRepository for TieredWorkflowRepository {
    async fn create(&self, definition: &WorkflowDefinition) -> Result<()> {
        let _ = self.memory.create(definition).await;
        self.durable.create(definition).await
    }

    async fn get(&self, name: &str) -> Result<Option<WorkflowDefinition>> {
        if let Some(found) = self.memory.get(name).await? {
            return Ok(Some(found));
        }
        match self.durable.get(name).await? {
            Some(found) => {
                let _ = self.memory.create(&found).await;
                Ok(Some(found))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>> {
        match self.durable.list().await {
            Ok(all) => Ok(all),
            Err(err) => {
                warn!(%err, "durable workflow list failed, serving from memory");
                self.memory.list().await
            }
        }
    }

    async fn update(&self, definition: &WorkflowDefinition) -> Result<()> {
        let _ = self.memory.update(definition).await;
        self.durable.update(definition).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let _ = self.memory.delete(name).await;
        self.durable.delete(name).await
    }
}

/// Two-tier pipeline store.
pub struct TieredPipelineRepository {
    memory: Arc<dyn PipelineRepository>,
    durable: Arc<dyn PipelineRepository>,
}

impl TieredPipelineRepository {
    pub fn new(
        memory: Arc<dyn PipelineRepository>,
        durable: Arc<dyn PipelineRepository>,
    ) -> Self {
        Self { memory, durable }
    }
}

#[async_trait]
impl PipelineRepository for TieredPipelineRepository {
    async fn create(&self, pipeline: &Pipeline) -> Result<()> {
        let _ = self.memory.create(pipeline).await;
        self.durable.create(pipeline).await
    }

    async fn get(&self, id: &str) -> Result<Option<Pipeline>> {
        if let Some(found) = self.memory.get(id).await? {
            return Ok(Some(found));
        }
        match self.durable.get(id).await? {
            Some(found) => {
                let _ = self.memory.create(&found).await;
                Ok(Some(found))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Pipeline>> {
        match self.durable.list().await {
            Ok(all) => Ok(all),
            Err(err) => {
                warn!(%err, "durable pipeline list failed, serving from memory");
                self.memory.list().await
            }
        }
    }

    async fn update(&self, pipeline: &Pipeline) -> Result<()> {
        let _ = self.memory.update(pipeline).await;
        self.durable.update(pipeline).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _ = self.memory.delete(id).await;
        self.durable.delete(id).await
    }
}

/// Two-tier pipeline-run store.
pub struct TieredPipelineRunRepository {
    memory: Arc<dyn PipelineRunRepository>,
    durable: Arc<dyn PipelineRunRepository>,
}

impl TieredPipelineRunRepository {
    pub fn new(
        memory: Arc<dyn PipelineRunRepository>,
        durable: Arc<dyn PipelineRunRepository>,
    ) -> Self {
        Self { memory, durable }
    }
}

#[async_trait]
impl PipelineRunRepository for TieredPipelineRunRepository {
    async fn create(&self, run: &PipelineRun) -> Result<()> {
        let _ = self.memory.create(run).await;
        self.durable.create(run).await
    }

    async fn get(&self, id: &str) -> Result<Option<PipelineRun>> {
        if let Some(found) = self.memory.get(id).await? {
            return Ok(Some(found));
        }
        match self.durable.get(id).await? {
            Some(found) => {
                let _ = self.memory.create(&found).await;
                Ok(Some(found))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, run: &PipelineRun) -> Result<()> {
        let _ = self.memory.update(run).await;
        self.durable.update(run).await
    }

    async fn list_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<PipelineRun>> {
        match self.durable.list_for_pipeline(pipeline_id).await {
            Ok(runs) => Ok(runs),
            Err(err) => {
                warn!(%err, "durable run list failed, serving from memory");
                self.memory.list_for_pipeline(pipeline_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::repo::MemoryWorkflowRepository;

    /// Durable stand-in that always fails, for degradation tests.
    struct BrokenWorkflowRepository;

    #[async_trait]
    impl WorkflowRepository for BrokenWorkflowRepository {
        async fn create(&self, _d: &WorkflowDefinition) -> Result<()> {
            Err(ServerError::Database("connection refused".to_string()))
        }
        async fn get(&self, _n: &str) -> Result<Option<WorkflowDefinition>> {
            Err(ServerError::Database("connection refused".to_string()))
        }
        async fn list(&self) -> Result<Vec<WorkflowDefinition>> {
            Err(ServerError::Database("connection refused".to_string()))
        }
        async fn update(&self, _d: &WorkflowDefinition) -> Result<()> {
            Err(ServerError::Database("connection refused".to_string()))
        }
        async fn delete(&self, _n: &str) -> Result<()> {
            Err(ServerError::Database("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_read_through_cache_fill() {
        let memory = Arc::new(MemoryWorkflowRepository::new());
        let durable = Arc::new(MemoryWorkflowRepository::new());
        durable.create(&WorkflowDefinition::new("wf")).await.unwrap();

        let tiered =
            TieredWorkflowRepository::new(Arc::clone(&memory) as _, Arc::clone(&durable) as _);

        // Miss in memory, hit in durable, then cached.
        assert!(tiered.get("wf").await.unwrap().is_some());
        assert!(memory.get("wf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_errors_surface_from_durable_only() {
        let memory = Arc::new(MemoryWorkflowRepository::new());
        let tiered = TieredWorkflowRepository::new(
            Arc::clone(&memory) as _,
            Arc::new(BrokenWorkflowRepository) as _,
        );

        let err = tiered.create(&WorkflowDefinition::new("wf")).await;
        assert!(err.is_err());
        // The memory tier still took the write.
        assert!(memory.get("wf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_falls_back_to_memory() {
        let memory = Arc::new(MemoryWorkflowRepository::new());
        memory.create(&WorkflowDefinition::new("wf")).await.unwrap();
        let tiered = TieredWorkflowRepository::new(
            Arc::clone(&memory) as _,
            Arc::new(BrokenWorkflowRepository) as _,
        );

        assert_eq!(tiered.list().await.unwrap().len(), 1);
    }
}
