//! Task: a polymorphic unit of grading inside a definition.
//!
//! Represented as a tagged variant dispatched through a small match-based
//! handler table rather than a trait-object hierarchy, per the design
//! notes: "avoid deep inheritance".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::programming::{ProgrammingTask, RunnerRequest};
use crate::domain::short_answer::ShortAnswerTask;
use crate::error::AppError;

/// Discriminator for the task payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Programming,
    ShortAnswer,
}

/// The kind-specific payload carried by a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPayload {
    Programming(ProgrammingTask),
    ShortAnswer(ShortAnswerTask),
}

/// One graded unit within a definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub autograde: bool,
    #[serde(flatten)]
    pub payload: TaskPayload,
}

/// Outcome status of evaluating one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEvalStatus {
    Pending,
    Success,
    Fail,
    Skipped,
}

impl TaskEvalStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskEvalStatus::Pending => "PENDING",
            TaskEvalStatus::Success => "SUCCESS",
            TaskEvalStatus::Fail => "FAIL",
            TaskEvalStatus::Skipped => "SKIPPED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TaskEvalStatus::Pending),
            "SUCCESS" => Some(TaskEvalStatus::Success),
            "FAIL" => Some(TaskEvalStatus::Fail),
            "SKIPPED" => Some(TaskEvalStatus::Skipped),
            _ => None,
        }
    }
}

/// The result of evaluating one task within a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvalResult {
    pub task_id: i64,
    pub status: TaskEvalStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

/// What evaluating a task produced: either a terminal result, or a
/// terminal-looking PENDING result paired with the request that still
/// needs to be dispatched once the caller has durably persisted it.
///
/// Splitting dispatch out of `run` is what lets the orchestrator enforce
/// commit-before-publish: the request travels alongside the result instead
/// of being fired as a side effect of evaluation.
#[derive(Debug)]
pub enum TaskRunOutcome {
    Terminal(TaskEvalResult),
    PendingDispatch {
        result: TaskEvalResult,
        request: RunnerRequest,
    },
}

impl Task {
    pub fn task_type(&self) -> TaskType {
        match self.payload {
            TaskPayload::Programming(_) => TaskType::Programming,
            TaskPayload::ShortAnswer(_) => TaskType::ShortAnswer,
        }
    }

    /// Parse a raw user-supplied input value into the kind-specific shape.
    /// Validation errors are reported, never panicked on.
    pub fn validate_user_input(&self, raw: &Value) -> Result<Value, AppError> {
        match &self.payload {
            TaskPayload::Programming(t) => t.validate_user_input(raw),
            TaskPayload::ShortAnswer(t) => t.validate_user_input(raw),
        }
    }

    /// Parse a raw expected-answer value into the kind-specific shape.
    pub fn validate_expected_answer(&self, raw: &Value) -> Result<Value, AppError> {
        match &self.payload {
            TaskPayload::Programming(t) => t.validate_expected_answer(raw),
            TaskPayload::ShortAnswer(t) => t.validate_expected_answer(raw),
        }
    }

    /// Run the task to completion or to a pending dispatch.
    pub fn run(
        &self,
        user_input: Value,
        expected_answer: Option<Value>,
    ) -> Result<TaskRunOutcome, AppError> {
        match &self.payload {
            TaskPayload::Programming(t) => t.run(self.id, user_input),
            TaskPayload::ShortAnswer(t) => {
                t.run(self.id, user_input, expected_answer).map(TaskRunOutcome::Terminal)
            }
        }
    }
}
