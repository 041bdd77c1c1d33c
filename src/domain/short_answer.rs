//! The short-answer task variant: a synchronous, value-equality grading
//! path supplementing the programming task kind. Never dispatched to a
//! runner — it resolves to a terminal status immediately.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::task::{TaskEvalResult, TaskEvalStatus};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortAnswerTask {
    pub prompt: String,
}

/// A short answer accepts any `Primitive` (int, float, string, or bool —
/// spec.md §3), not just strings.
fn is_primitive(raw: &Value) -> bool {
    raw.is_string() || raw.is_number() || raw.is_boolean()
}

impl ShortAnswerTask {
    pub fn validate_user_input(&self, raw: &Value) -> Result<Value, AppError> {
        if !is_primitive(raw) {
            return Err(AppError::ValidationFailed(
                "short answer input must be a primitive (int, float, string, or bool)".to_string(),
            ));
        }
        Ok(raw.clone())
    }

    pub fn validate_expected_answer(&self, raw: &Value) -> Result<Value, AppError> {
        if !is_primitive(raw) {
            return Err(AppError::ValidationFailed(
                "short answer expected answer must be a primitive (int, float, string, or bool)"
                    .to_string(),
            ));
        }
        Ok(raw.clone())
    }

    /// Grade immediately: no expected answer means ungraded-but-accepted.
    pub fn run(
        &self,
        task_id: i64,
        user_input: Value,
        expected_answer: Option<Value>,
    ) -> Result<TaskEvalResult, AppError> {
        let status = match expected_answer {
            None => TaskEvalStatus::Success,
            Some(expected) if expected == user_input => TaskEvalStatus::Success,
            Some(_) => TaskEvalStatus::Fail,
        };
        Ok(TaskEvalResult {
            task_id,
            status,
            result: Some(user_input),
        })
    }
}
