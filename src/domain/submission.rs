//! Submission: one evaluation attempt against a definition, and the
//! per-task results the listener mutates as runner replies arrive.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::task::TaskEvalStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Ok,
    Fail,
}

impl SubmissionStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "PENDING",
            SubmissionStatus::Ok => "OK",
            SubmissionStatus::Fail => "FAIL",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SubmissionStatus::Pending),
            "OK" => Some(SubmissionStatus::Ok),
            "FAIL" => Some(SubmissionStatus::Fail),
            _ => None,
        }
    }
}

/// The per-task outcome inside a submission; the unit of listener update.
///
/// `task_submission_id` is set iff `status = PENDING` and is unique across
/// all task results — it is the correlation key the listener matches
/// incoming runner messages against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub definition_id: i64,
    pub task_id: i64,
    #[serde(default)]
    pub task_submission_id: Option<String>,
    pub status: TaskEvalStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub definition_id: i64,
    pub status: SubmissionStatus,
    pub task_results: Vec<TaskResult>,
}

impl Submission {
    /// PENDING if any task result is PENDING, else OK iff every task result
    /// is SUCCESS, else FAIL.
    pub fn aggregate_status(task_results: &[TaskResult]) -> SubmissionStatus {
        if task_results
            .iter()
            .any(|r| r.status == TaskEvalStatus::Pending)
        {
            SubmissionStatus::Pending
        } else if task_results
            .iter()
            .all(|r| r.status == TaskEvalStatus::Success)
        {
            SubmissionStatus::Ok
        } else {
            SubmissionStatus::Fail
        }
    }

    pub fn recompute_status(&mut self) {
        self.status = Self::aggregate_status(&self.task_results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: TaskEvalStatus) -> TaskResult {
        TaskResult {
            definition_id: 1,
            task_id: 1,
            task_submission_id: None,
            status,
            result: None,
        }
    }

    #[test]
    fn any_pending_keeps_submission_pending() {
        let results = vec![result(TaskEvalStatus::Success), result(TaskEvalStatus::Pending)];
        assert_eq!(Submission::aggregate_status(&results), SubmissionStatus::Pending);
    }

    #[test]
    fn all_success_is_ok() {
        let results = vec![result(TaskEvalStatus::Success), result(TaskEvalStatus::Success)];
        assert_eq!(Submission::aggregate_status(&results), SubmissionStatus::Ok);
    }

    #[test]
    fn any_terminal_failure_is_fail() {
        let results = vec![result(TaskEvalStatus::Success), result(TaskEvalStatus::Fail)];
        assert_eq!(Submission::aggregate_status(&results), SubmissionStatus::Fail);
    }

    #[test]
    fn second_result_arriving_out_of_order_flips_to_ok() {
        let mut sub = Submission {
            id: Uuid::new_v4(),
            definition_id: 1,
            status: SubmissionStatus::Pending,
            task_results: vec![result(TaskEvalStatus::Success), result(TaskEvalStatus::Pending)],
        };
        sub.recompute_status();
        assert_eq!(sub.status, SubmissionStatus::Pending);
        sub.task_results[1].status = TaskEvalStatus::Success;
        sub.recompute_status();
        assert_eq!(sub.status, SubmissionStatus::Ok);
    }
}
