//! In-memory repository implementations.

use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineRun};
use crate::repo::{PipelineRepository, PipelineRunRepository, WorkflowRepository};
use async_trait::async_trait;
use engine::WorkflowDefinition;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Workflow definitions in a mutex-guarded map.
#[derive(Default)]
pub struct MemoryWorkflowRepository {
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl MemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for MemoryWorkflowRepository {
    async fn create(&self, definition: &WorkflowDefinition) -> Result<()> {
        self.workflows
            .write()
            .insert(definition.name.clone(), definition.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<WorkflowDefinition>> {
        Ok(self.workflows.read().get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>> {
        let mut all: Vec<WorkflowDefinition> = self.workflows.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn update(&self, definition: &WorkflowDefinition) -> Result<()> {
        self.workflows
            .write()
            .insert(definition.name.clone(), definition.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.workflows.write().remove(name);
        Ok(())
    }
}

/// Pipeline definitions in a mutex-guarded map.
#[derive(Default)]
pub struct MemoryPipelineRepository {
    pipelines: RwLock<HashMap<String, Pipeline>>,
}

impl MemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRepository for MemoryPipelineRepository {
    async fn create(&self, pipeline: &Pipeline) -> Result<()> {
        self.pipelines
            .write()
            .insert(pipeline.id.clone(), pipeline.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Pipeline>> {
        Ok(self.pipelines.read().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Pipeline>> {
        let mut all: Vec<Pipeline> = self.pipelines.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn update(&self, pipeline: &Pipeline) -> Result<()> {
        self.pipelines
            .write()
            .insert(pipeline.id.clone(), pipeline.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.pipelines.write().remove(id);
        Ok(())
    }
}

/// Pipeline runs in a mutex-guarded map.
#[derive(Default)]
pub struct MemoryPipelineRunRepository {
    runs: RwLock<HashMap<String, PipelineRun>>,
}

impl MemoryPipelineRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRunRepository for MemoryPipelineRunRepository {
    async fn create(&self, run: &PipelineRun) -> Result<()> {
        self.runs.write().insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PipelineRun>> {
        Ok(self.runs.read().get(id).cloned())
    }

    async fn update(&self, run: &PipelineRun) -> Result<()> {
        self.runs.write().insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn list_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<PipelineRun>> {
        let mut runs: Vec<PipelineRun> = self
            .runs
            .read()
            .values()
            .filter(|r| r.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workflow_crud() {
        let repo = MemoryWorkflowRepository::new();
        let def = WorkflowDefinition::new("wf");
        repo.create(&def).await.unwrap();

        assert!(repo.get("wf").await.unwrap().is_some());
        assert_eq!(repo.list().await.unwrap().len(), 1);

        repo.delete("wf").await.unwrap();
        assert!(repo.get("wf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_runs_scoped_to_pipeline() {
        let repo = MemoryPipelineRunRepository::new();
        let pipeline_a = Pipeline::new("a", vec![]);
        let pipeline_b = Pipeline::new("b", vec![]);

        repo.create(&PipelineRun::new(&pipeline_a)).await.unwrap();
        repo.create(&PipelineRun::new(&pipeline_a)).await.unwrap();
        repo.create(&PipelineRun::new(&pipeline_b)).await.unwrap();

        assert_eq!(
            repo.list_for_pipeline(&pipeline_a.id).await.unwrap().len(),
            2
        );
        assert_eq!(
            repo.list_for_pipeline(&pipeline_b.id).await.unwrap().len(),
            1
        );
    }
}
