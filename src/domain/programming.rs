//! The programming task variant — the only task kind with
//! a fully specified external contract: it assembles one runner package per
//! test case and hands the batch to the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::artifact::{Artifact, File};
use crate::domain::graph::ComputeGraph;
use crate::domain::step::{Step, StepSocket, StepType};
use crate::domain::task::{TaskEvalResult, TaskEvalStatus, TaskRunOutcome};
use crate::error::AppError;

/// A user-supplied (or literal, pre-seeded) required input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredInput {
    pub id: String,
    pub data: Artifact,
}

/// The sandboxed runtime a package should be executed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerEnvironment {
    pub language: String,
    pub version: String,
}

/// One test case's assembled, self-contained program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerPackage {
    pub id: i64,
    pub entrypoint: String,
    pub files: Vec<File>,
}

/// The envelope published to the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerRequest {
    pub submission_id: Uuid,
    pub environment: RunnerEnvironment,
    pub packages: Vec<RunnerPackage>,
}

impl RunnerRequest {
    pub fn create(packages: Vec<RunnerPackage>, environment: RunnerEnvironment) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            environment,
            packages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammingTask {
    pub question: String,
    pub environment: RunnerEnvironment,
    pub required_inputs: Vec<RequiredInput>,
    pub testcases: Vec<ComputeGraph>,
}

const ENTRYPOINT: &str = "__entrypoint.py";

impl ProgrammingTask {
    fn create_input_step(user_inputs: &[RequiredInput]) -> Step {
        Step {
            id: Step::USER_INPUT_STEP_ID.to_string(),
            step_type: StepType::Input,
            inputs: vec![],
            outputs: user_inputs
                .iter()
                .map(|ui| StepSocket {
                    id: ui.id.clone(),
                    data: Some(ui.data.clone()),
                })
                .collect(),
        }
    }

    pub fn validate_user_input(&self, raw: &Value) -> Result<Value, AppError> {
        let parsed: Vec<RequiredInput> = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::ValidationFailed(format!("invalid user input: {e}")))?;
        serde_json::to_value(parsed).map_err(|e| AppError::ValidationFailed(e.to_string()))
    }

    pub fn validate_expected_answer(&self, raw: &Value) -> Result<Value, AppError> {
        // Programming tasks grade in the external runner; the core only
        // needs the value to be well-formed JSON: grading without an
        // expected answer is the task kind's own responsibility.
        Ok(raw.clone())
    }

    /// Build the runner request for this task, without dispatching it. The
    /// caller durably persists the returned PENDING result before handing
    /// the request to a dispatcher.
    pub fn run(&self, task_id: i64, user_input: Value) -> Result<TaskRunOutcome, AppError> {
        let user_inputs: Vec<RequiredInput> = serde_json::from_value(user_input)
            .map_err(|e| AppError::ValidationFailed(format!("invalid user input: {e}")))?;

        for required in &self.required_inputs {
            if !user_inputs.iter().any(|ui| ui.id == required.id) {
                return Err(AppError::MissingInput(required.id.clone()));
            }
        }

        let mut packages = Vec::with_capacity(self.testcases.len());
        for testcase in &self.testcases {
            let input_step = Self::create_input_step(&user_inputs);
            let assembled = testcase.run(input_step)?;

            // `assembled.files` already carries every file-typed required
            // input: `lower()` collects File artifacts from every spliced
            // node's output sockets, including the synthesized input node
            // these came from.
            let mut files = assembled.files;
            files.push(File {
                file_name: ENTRYPOINT.to_string(),
                content: assembled.code,
            });

            packages.push(RunnerPackage {
                id: testcase.id,
                entrypoint: ENTRYPOINT.to_string(),
                files,
            });
        }

        let request = RunnerRequest::create(packages, self.environment.clone());
        let result = TaskEvalResult {
            task_id,
            status: TaskEvalStatus::Pending,
            result: Some(Value::String(request.submission_id.to_string())),
        };

        Ok(TaskRunOutcome::PendingDispatch { result, request })
    }
}
