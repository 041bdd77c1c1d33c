//! Row shapes for the sqlite adapter. These mirror the table layout in
//! `migrations/001_create_schema.sql`, not the domain types directly —
//! conversion happens in `store::sqlite`.

use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct DefinitionRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub tasks: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct SubmissionRow {
    pub id: String,
    pub definition_id: i64,
    pub status: String,
    #[allow(dead_code)]
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskResultRow {
    pub submission_id: String,
    pub definition_id: i64,
    pub task_id: i64,
    pub task_submission_id: Option<String>,
    pub status: String,
    pub result: Option<String>,
}
