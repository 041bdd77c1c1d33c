//! `sqlx`-backed [`Store`] implementation. Migrations are applied by hand
//! (read the schema file, split on `;`, execute each statement) rather than
//! via `sqlx::migrate!`, so the schema stays a single readable file with no
//! generated migration-runner state.

use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::definition::Definition;
use crate::domain::submission::{Submission, SubmissionStatus, TaskResult};
use crate::domain::task::{Task, TaskEvalStatus};
use crate::error::AppError;
use crate::store::models::{DefinitionRow, SubmissionRow, TaskResultRow};
use crate::store::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: &str) -> Result<Self, AppError> {
        if let Some(parent) = PathBuf::from(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("create db directory: {e}")))?;
            }
        }

        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{db_path}")
        };

        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid database path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), AppError> {
        let migration_sql = include_str!("../../migrations/001_create_schema.sql");

        let mut cleaned = String::new();
        for line in migration_sql.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            let without_comment = match trimmed.find("--") {
                Some(pos) => &trimmed[..pos],
                None => trimmed,
            };
            cleaned.push_str(without_comment.trim());
            cleaned.push(' ');
        }

        for statement in cleaned.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn row_to_task_result(row: TaskResultRow) -> Result<TaskResult, AppError> {
        let status = TaskEvalStatus::from_db_str(&row.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("unknown task result status '{}'", row.status))
        })?;
        let result = row
            .result
            .map(|r| serde_json::from_str::<Value>(&r))
            .transpose()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("decode task result payload: {e}")))?;
        Ok(TaskResult {
            definition_id: row.definition_id,
            task_id: row.task_id,
            task_submission_id: row.task_submission_id,
            status,
            result,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_definition(&self, mut definition: Definition) -> Result<Definition, AppError> {
        definition.validate()?;
        let tasks_json = serde_json::to_string(&definition.tasks)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO definition (name, description, tasks) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(&tasks_json)
        .fetch_one(&self.pool)
        .await?;

        definition.id = id;
        Ok(definition)
    }

    async fn get_definition(&self, id: i64) -> Result<Definition, AppError> {
        let row: DefinitionRow =
            sqlx::query_as("SELECT id, name, description, tasks FROM definition WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("definition {id}")))?;

        let tasks: Vec<Task> = serde_json::from_str(&row.tasks)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("decode stored tasks: {e}")))?;

        Ok(Definition {
            id: row.id,
            name: row.name,
            description: row.description,
            tasks,
        })
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO submission (id, definition_id, status, created_at) VALUES (?, ?, ?, strftime('%s','now'))")
            .bind(submission.id.to_string())
            .bind(submission.definition_id)
            .bind(submission.status.as_db_str())
            .execute(&mut *tx)
            .await?;

        for result in &submission.task_results {
            let payload = result
                .result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

            sqlx::query(
                "INSERT INTO task_result (submission_id, definition_id, task_id, task_submission_id, status, result) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(submission.id.to_string())
            .bind(result.definition_id)
            .bind(result.task_id)
            .bind(&result.task_submission_id)
            .bind(result.status.as_db_str())
            .bind(payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_submission(&self, id: Uuid) -> Result<Submission, AppError> {
        let sub_row: SubmissionRow =
            sqlx::query_as("SELECT id, definition_id, status, created_at FROM submission WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("submission {id}")))?;

        let result_rows: Vec<TaskResultRow> = sqlx::query_as(
            "SELECT submission_id, definition_id, task_id, task_submission_id, status, result \
             FROM task_result WHERE submission_id = ? ORDER BY task_id",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let status = SubmissionStatus::from_db_str(&sub_row.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("unknown submission status '{}'", sub_row.status))
        })?;

        let task_results = result_rows
            .into_iter()
            .map(Self::row_to_task_result)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Submission {
            id,
            definition_id: sub_row.definition_id,
            status,
            task_results,
        })
    }

    async fn find_task_result_by_task_submission_id(
        &self,
        task_submission_id: &str,
    ) -> Result<Option<TaskResult>, AppError> {
        let row: Option<TaskResultRow> = sqlx::query_as(
            "SELECT submission_id, definition_id, task_id, task_submission_id, status, result \
             FROM task_result WHERE task_submission_id = ?",
        )
        .bind(task_submission_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_task_result).transpose()
    }

    async fn apply_task_result(
        &self,
        task_submission_id: &str,
        status: TaskEvalStatus,
        result: Option<Value>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT submission_id, status FROM task_result WHERE task_submission_id = ?",
        )
        .bind(task_submission_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(AppError::StaleResult(task_submission_id.to_string()));
        };

        let submission_id: String = row.try_get("submission_id")?;
        let current_status: String = row.try_get("status")?;

        if current_status != TaskEvalStatus::Pending.as_db_str() {
            tracing::warn!(
                task_submission_id,
                current_status,
                "ignoring result for a task already in a terminal state"
            );
            tx.commit().await?;
            return Ok(());
        }

        let payload = result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        sqlx::query("UPDATE task_result SET status = ?, result = ? WHERE task_submission_id = ?")
            .bind(status.as_db_str())
            .bind(payload)
            .bind(task_submission_id)
            .execute(&mut *tx)
            .await?;

        let sibling_statuses: Vec<String> =
            sqlx::query_scalar("SELECT status FROM task_result WHERE submission_id = ?")
                .bind(&submission_id)
                .fetch_all(&mut *tx)
                .await?;

        let aggregate = if sibling_statuses
            .iter()
            .any(|s| s == TaskEvalStatus::Pending.as_db_str())
        {
            SubmissionStatus::Pending
        } else if sibling_statuses
            .iter()
            .all(|s| s == TaskEvalStatus::Success.as_db_str())
        {
            SubmissionStatus::Ok
        } else {
            SubmissionStatus::Fail
        };

        sqlx::query("UPDATE submission SET status = ? WHERE id = ?")
            .bind(aggregate.as_db_str())
            .bind(&submission_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::short_answer::ShortAnswerTask;
    use crate::domain::task::TaskPayload;
    use serde_json::json;

    async fn test_store() -> SqliteStore {
        SqliteStore::new(":memory:").await.unwrap()
    }

    fn sample_definition() -> Definition {
        Definition {
            id: 0,
            name: "contest".to_string(),
            description: "".to_string(),
            tasks: vec![Task {
                id: 1,
                autograde: true,
                payload: TaskPayload::ShortAnswer(ShortAnswerTask {
                    prompt: "2 + 2?".to_string(),
                }),
            }],
        }
    }

    #[tokio::test]
    async fn round_trips_a_definition() {
        let store = test_store().await;
        let created = store.create_definition(sample_definition()).await.unwrap();
        assert!(created.id > 0);
        let fetched = store.get_definition(created.id).await.unwrap();
        assert_eq!(fetched.tasks.len(), 1);
    }

    #[tokio::test]
    async fn applying_a_stale_result_is_rejected() {
        let store = test_store().await;
        let err = store
            .apply_task_result("does-not-exist", TaskEvalStatus::Success, Some(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StaleResult(_)));
    }

    #[tokio::test]
    async fn result_transitions_submission_to_ok() {
        let store = test_store().await;
        let definition = store.create_definition(sample_definition()).await.unwrap();

        let submission = Submission {
            id: Uuid::new_v4(),
            definition_id: definition.id,
            status: SubmissionStatus::Pending,
            task_results: vec![TaskResult {
                definition_id: definition.id,
                task_id: 1,
                task_submission_id: Some("corr-1".to_string()),
                status: TaskEvalStatus::Pending,
                result: None,
            }],
        };
        store.create_submission(&submission).await.unwrap();

        store
            .apply_task_result("corr-1", TaskEvalStatus::Success, Some(json!(25)))
            .await
            .unwrap();

        let fetched = store.get_submission(submission.id).await.unwrap();
        assert_eq!(fetched.status, SubmissionStatus::Ok);
        assert_eq!(fetched.task_results[0].status, TaskEvalStatus::Success);
    }

    #[tokio::test]
    async fn double_delivery_is_a_noop() {
        let store = test_store().await;
        let definition = store.create_definition(sample_definition()).await.unwrap();
        let submission = Submission {
            id: Uuid::new_v4(),
            definition_id: definition.id,
            status: SubmissionStatus::Pending,
            task_results: vec![TaskResult {
                definition_id: definition.id,
                task_id: 1,
                task_submission_id: Some("corr-2".to_string()),
                status: TaskEvalStatus::Pending,
                result: None,
            }],
        };
        store.create_submission(&submission).await.unwrap();

        store
            .apply_task_result("corr-2", TaskEvalStatus::Success, Some(json!(1)))
            .await
            .unwrap();
        store
            .apply_task_result("corr-2", TaskEvalStatus::Fail, Some(json!("late")))
            .await
            .unwrap();

        let fetched = store.get_submission(submission.id).await.unwrap();
        assert_eq!(fetched.task_results[0].status, TaskEvalStatus::Success);
    }
}
