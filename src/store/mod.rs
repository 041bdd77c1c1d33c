//! Durable storage seam. `Store` is the narrow contract the orchestrator
//! and listener depend on; `sqlite` is the only adapter shipped.

pub mod models;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::definition::Definition;
use crate::domain::submission::{Submission, TaskResult};
use crate::error::AppError;

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_definition(&self, definition: Definition) -> Result<Definition, AppError>;

    async fn get_definition(&self, id: i64) -> Result<Definition, AppError>;

    /// Persist a submission and all its task results in a single atomic
    /// write. Must complete before any PENDING task result is dispatched.
    async fn create_submission(&self, submission: &Submission) -> Result<(), AppError>;

    async fn get_submission(&self, id: Uuid) -> Result<Submission, AppError>;

    /// Look up the unique task result currently correlated to a runner
    /// submission id. Returns `None` for a stale/unknown correlation id.
    async fn find_task_result_by_task_submission_id(
        &self,
        task_submission_id: &str,
    ) -> Result<Option<TaskResult>, AppError>;

    /// Idempotently transition one task result to a terminal state and
    /// recompute the enclosing submission's aggregate status, in one
    /// transaction. A no-op (with a warning logged) if the task result is
    /// already terminal.
    async fn apply_task_result(
        &self,
        task_submission_id: &str,
        status: crate::domain::task::TaskEvalStatus,
        result: Option<serde_json::Value>,
    ) -> Result<(), AppError>;
}
