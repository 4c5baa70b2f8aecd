//! Repository contract for persisted definitions and run history.
//!
//! Every store comes in three flavours: in-memory (always present), durable
//! (sqlite, optional), and a two-tier wrapper that writes through memory to
//! the durable store and degrades gracefully when the durable store is
//! unavailable.

mod durable;
mod memory;
mod tiered;

pub use durable::{Database, DurablePipelineRepository, DurablePipelineRunRepository,
    DurableWorkflowRepository};
pub use memory::{MemoryPipelineRepository, MemoryPipelineRunRepository, MemoryWorkflowRepository};
pub use tiered::{TieredPipelineRepository, TieredPipelineRunRepository, TieredWorkflowRepository};

use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineRun};
use async_trait::async_trait;
use engine::WorkflowDefinition;

/// Store of workflow definitions, keyed by name.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create(&self, definition: &WorkflowDefinition) -> Result<()>;
    async fn get(&self, name: &str) -> Result<Option<WorkflowDefinition>>;
    async fn list(&self) -> Result<Vec<WorkflowDefinition>>;
    async fn update(&self, definition: &WorkflowDefinition) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Store of pipeline definitions, keyed by id.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn create(&self, pipeline: &Pipeline) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Pipeline>>;
    async fn list(&self) -> Result<Vec<Pipeline>>;
    async fn update(&self, pipeline: &Pipeline) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Store of pipeline runs, keyed by id.
#[async_trait]
pub trait PipelineRunRepository: Send + Sync {
    async fn create(&self, run: &PipelineRun) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<PipelineRun>>;
    async fn update(&self, run: &PipelineRun) -> Result<()>;
    async fn list_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<PipelineRun>>;
}
