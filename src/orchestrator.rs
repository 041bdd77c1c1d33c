//! Submission orchestrator: evaluates every requested task against a
//! definition, persists the submission and its task results in one atomic
//! write, then — only after that commit — hands PENDING tasks to the
//! dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::domain::submission::{Submission, TaskResult};
use crate::domain::task::{TaskEvalStatus, TaskRunOutcome};
use crate::error::AppError;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct UserInput {
    pub task_id: i64,
    pub user_input: Value,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedAnswer {
    pub task_id: i64,
    pub expected_answer: Value,
}

pub async fn run_submission(
    store: &dyn Store,
    dispatcher: &dyn Dispatcher,
    definition_id: i64,
    user_inputs: Vec<UserInput>,
    expected_answers: Vec<ExpectedAnswer>,
    task_id_filter: Option<i64>,
) -> Result<Submission, AppError> {
    let definition = store.get_definition(definition_id).await?;

    let user_input_index: HashMap<i64, &Value> =
        user_inputs.iter().map(|ui| (ui.task_id, &ui.user_input)).collect();
    let expected_answer_index: HashMap<i64, &Value> = expected_answers
        .iter()
        .map(|ea| (ea.task_id, &ea.expected_answer))
        .collect();

    let tasks_to_run: Vec<_> = definition
        .tasks
        .iter()
        .filter(|t| task_id_filter.is_none_or(|id| t.id == id))
        .collect();

    let mut task_results = Vec::with_capacity(tasks_to_run.len());
    let mut pending_dispatches: Vec<(i64, crate::domain::programming::RunnerRequest)> = Vec::new();

    for task in tasks_to_run {
        let Some(raw_input) = user_input_index.get(&task.id) else {
            tracing::warn!(task_id = task.id, "task has no user input, skipping");
            task_results.push(TaskResult {
                definition_id,
                task_id: task.id,
                task_submission_id: None,
                status: TaskEvalStatus::Skipped,
                result: None,
            });
            continue;
        };

        if !expected_answer_index.contains_key(&task.id) {
            tracing::warn!(task_id = task.id, "task has no expected answer");
        }

        let outcome = evaluate_task(task, raw_input, expected_answer_index.get(&task.id).copied());

        match outcome {
            Ok(TaskRunOutcome::Terminal(result)) => {
                task_results.push(TaskResult {
                    definition_id,
                    task_id: task.id,
                    task_submission_id: None,
                    status: result.status,
                    result: result.result,
                });
            }
            Ok(TaskRunOutcome::PendingDispatch { result, request }) => {
                task_results.push(TaskResult {
                    definition_id,
                    task_id: task.id,
                    task_submission_id: Some(request.submission_id.to_string()),
                    status: result.status,
                    result: None,
                });
                pending_dispatches.push((task.id, request));
            }
            Err(e) => {
                tracing::warn!(task_id = task.id, error = %e, "task evaluation failed");
                task_results.push(TaskResult {
                    definition_id,
                    task_id: task.id,
                    task_submission_id: None,
                    status: TaskEvalStatus::Fail,
                    result: Some(Value::String(e.to_string())),
                });
            }
        }
    }

    let status = Submission::aggregate_status(&task_results);
    let submission = Submission {
        id: Uuid::new_v4(),
        definition_id,
        status,
        task_results,
    };

    store.create_submission(&submission).await?;

    let mut submission = submission;
    for (task_id, request) in pending_dispatches {
        let submission_id = request.submission_id.to_string();
        if let Err(e) = dispatcher.dispatch(request).await {
            tracing::error!(task_id, error = %e, "dispatch failed after exhausting retries");
            let failure = Value::String(e.to_string());
            store
                .apply_task_result(&submission_id, TaskEvalStatus::Fail, Some(failure.clone()))
                .await?;

            if let Some(task_result) = submission
                .task_results
                .iter_mut()
                .find(|r| r.task_submission_id.as_deref() == Some(submission_id.as_str()))
            {
                task_result.status = TaskEvalStatus::Fail;
                task_result.result = Some(failure);
            }
        }
    }
    submission.recompute_status();

    Ok(submission)
}

fn evaluate_task(
    task: &crate::domain::task::Task,
    raw_input: &Value,
    raw_expected: Option<&Value>,
) -> Result<TaskRunOutcome, AppError> {
    let user_input = task.validate_user_input(raw_input)?;
    let expected_answer = raw_expected.map(|v| task.validate_expected_answer(v)).transpose()?;
    task.run(user_input, expected_answer)
}

pub type SharedStore = Arc<dyn Store>;
pub type SharedDispatcher = Arc<dyn Dispatcher>;
