//! Durable repository implementations over sqlite.
//!
//! Definitions and run state are stored as JSON text columns; the schema is
//! bootstrapped on connect so a fresh database file works out of the box.

use crate::error::{Result, ServerError};
use crate::pipeline::{Pipeline, PipelineRun, PipelineStage, RunStatus, StageResult};
use crate::repo::{PipelineRepository, PipelineRunRepository, WorkflowRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine::WorkflowDefinition;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    name        TEXT PRIMARY KEY,
    version     INTEGER NOT NULL,
    definition  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pipelines (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    stages      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pipeline_runs (
    id            TEXT PRIMARY KEY,
    pipeline_id   TEXT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
    status        TEXT NOT NULL,
    current_stage TEXT NOT NULL DEFAULT '',
    stage_results TEXT NOT NULL DEFAULT '{}',
    started_at    TEXT NOT NULL,
    completed_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_pipeline_runs_pipeline ON pipeline_runs(pipeline_id);
"#;

/// Sqlite connection pool with the trellis schema applied.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database at the given path and
    /// bootstrap the schema.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&pool).await?;
            }
        }
        info!(path = %path.as_ref().display(), "durable store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ServerError::Database(format!("bad timestamp '{}': {}", raw, e)))
}

/// Workflow definitions in sqlite.
pub struct DurableWorkflowRepository {
    db: Arc<Database>,
}

impl DurableWorkflowRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WorkflowRepository for DurableWorkflowRepository {
    async fn create(&self, definition: &WorkflowDefinition) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO workflows (name, version, definition, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                version = excluded.version,
                definition = excluded.definition,
                updated_at = excluded.updated_at",
        )
        .bind(&definition.name)
        .bind(definition.version)
        .bind(serde_json::to_string(definition)?)
        .bind(&now)
        .bind(&now)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<WorkflowDefinition>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE name = ?")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.get("definition");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>> {
        let rows = sqlx::query("SELECT definition FROM workflows ORDER BY name")
            .fetch_all(self.db.pool())
            .await?;
        rows.into_iter()
            .map(|row| {
                let raw: String = row.get("definition");
                serde_json::from_str(&raw).map_err(ServerError::from)
            })
            .collect()
    }

    async fn update(&self, definition: &WorkflowDefinition) -> Result<()> {
        self.create(definition).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM workflows WHERE name = ?")
            .bind(name)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}

/// Pipeline definitions in sqlite.
pub struct DurablePipelineRepository {
    db: Arc<Database>,
}

impl DurablePipelineRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Pipeline> {
        let stages_raw: String = row.get("stages");
        let stages: Vec<PipelineStage> = serde_json::from_str(&stages_raw)?;
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");
        Ok(Pipeline {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            stages,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

#[async_trait]
impl PipelineRepository for DurablePipelineRepository {
    async fn create(&self, pipeline: &Pipeline) -> Result<()> {
        sqlx::query(
            "INSERT INTO pipelines (id, name, description, stages, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                stages = excluded.stages,
                updated_at = excluded.updated_at",
        )
        .bind(&pipeline.id)
        .bind(&pipeline.name)
        .bind(&pipeline.description)
        .bind(serde_json::to_string(&pipeline.stages)?)
        .bind(pipeline.created_at.to_rfc3339())
        .bind(pipeline.updated_at.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Pipeline>> {
        let row = sqlx::query("SELECT * FROM pipelines WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|r| Self::from_row(&r)).transpose()
    }

    async fn list(&self) -> Result<Vec<Pipeline>> {
        let rows = sqlx::query("SELECT * FROM pipelines ORDER BY created_at")
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn update(&self, pipeline: &Pipeline) -> Result<()> {
        self.create(pipeline).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pipelines WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}

/// Pipeline runs in sqlite.
pub struct DurablePipelineRunRepository {
    db: Arc<Database>,
}

impl DurablePipelineRunRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PipelineRun> {
        let status_raw: String = row.get("status");
        let status: RunStatus = serde_json::from_value(Value::String(status_raw))?;
        let results_raw: String = row.get("stage_results");
        let stage_results: HashMap<String, StageResult> = serde_json::from_str(&results_raw)?;
        let started_at: String = row.get("started_at");
        let completed_at: Option<String> = row.get("completed_at");
        Ok(PipelineRun {
            id: row.get("id"),
            pipeline_id: row.get("pipeline_id"),
            status,
            current_stage: row.get("current_stage"),
            stage_results,
            started_at: parse_timestamp(&started_at)?,
            completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

#[async_trait]
impl PipelineRunRepository for DurablePipelineRunRepository {
    async fn create(&self, run: &PipelineRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO pipeline_runs
                (id, pipeline_id, status, current_stage, stage_results, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                current_stage = excluded.current_stage,
                stage_results = excluded.stage_results,
                completed_at = excluded.completed_at",
        )
        .bind(&run.id)
        .bind(&run.pipeline_id)
        .bind(run.status.as_str())
        .bind(&run.current_stage)
        .bind(serde_json::to_string(&run.stage_results)?)
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PipelineRun>> {
        let row = sqlx::query("SELECT * FROM pipeline_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|r| Self::from_row(&r)).transpose()
    }

    async fn update(&self, run: &PipelineRun) -> Result<()> {
        self.create(run).await
    }

    async fn list_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<PipelineRun>> {
        let rows = sqlx::query(
            "SELECT * FROM pipeline_runs WHERE pipeline_id = ? ORDER BY started_at",
        )
        .bind(pipeline_id)
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(Self::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageStatus;
    use serde_json::json;

    async fn database() -> (tempfile::TempDir, Arc<Database>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis-test.db");
        let db = Arc::new(Database::connect(path).await.unwrap());
        (dir, db)
    }

    #[tokio::test]
    async fn test_workflow_round_trip() {
        let (_dir, db) = database().await;
        let repo = DurableWorkflowRepository::new(db);

        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "wf",
            "version": 2,
            "nodes": [{"id": "in", "type": "input", "config": {}}],
            "edges": []
        }))
        .unwrap();
        repo.create(&def).await.unwrap();

        let loaded = repo.get("wf").await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.nodes[0].id, "in");
        assert!(repo.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_round_trip_preserves_stage_results() {
        let (_dir, db) = database().await;
        let pipelines = DurablePipelineRepository::new(Arc::clone(&db));
        let runs = DurablePipelineRunRepository::new(db);

        let pipeline = Pipeline::new(
            "p",
            vec![crate::pipeline::PipelineStage::new(
                "collect",
                "workflow",
                json!({"workflow_name": "collect"}),
            )],
        );
        pipelines.create(&pipeline).await.unwrap();

        let mut run = PipelineRun::new(&pipeline);
        run.status = RunStatus::Waiting;
        run.stage_results.insert(
            "collect".to_string(),
            StageResult {
                status: StageStatus::Completed,
                output: Some(json!({"x": 1})),
                error: None,
                started_at: Some(Utc::now()),
                completed_at: Some(Utc::now()),
            },
        );
        runs.create(&run).await.unwrap();

        let loaded = runs.get(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Waiting);
        assert_eq!(
            loaded.stage_results["collect"].output,
            Some(json!({"x": 1}))
        );
        assert_eq!(runs.list_for_pipeline(&pipeline.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let (_dir, db) = database().await;
        let pipelines = DurablePipelineRepository::new(Arc::clone(&db));
        let runs = DurablePipelineRunRepository::new(db);

        let pipeline = Pipeline::new("p", vec![]);
        pipelines.create(&pipeline).await.unwrap();
        runs.create(&PipelineRun::new(&pipeline)).await.unwrap();

        pipelines.delete(&pipeline.id).await.unwrap();
        assert!(runs
            .list_for_pipeline(&pipeline.id)
            .await
            .unwrap()
            .is_empty());
    }
}
