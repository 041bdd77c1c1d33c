//! Definition: the authored contest, a collection of tasks.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::task::Task;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tasks: Vec<Task>,
}

impl Definition {
    /// Task ids must be unique within a definition.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id) {
                return Err(AppError::ValidationFailed(format!(
                    "duplicate task id '{}' in definition",
                    task.id
                )));
            }
        }
        Ok(())
    }

    pub fn task(&self, task_id: i64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::short_answer::ShortAnswerTask;
    use crate::domain::task::TaskPayload;

    fn task(id: i64) -> Task {
        Task {
            id,
            autograde: true,
            payload: TaskPayload::ShortAnswer(ShortAnswerTask {
                prompt: "p".to_string(),
            }),
        }
    }

    #[test]
    fn duplicate_task_ids_are_rejected() {
        let def = Definition {
            id: 1,
            name: "contest".to_string(),
            description: String::new(),
            tasks: vec![task(1), task(1)],
        };
        assert!(def.validate().is_err());
    }

    #[test]
    fn unique_task_ids_are_accepted() {
        let def = Definition {
            id: 1,
            name: "contest".to_string(),
            description: String::new(),
            tasks: vec![task(1), task(2)],
        };
        assert!(def.validate().is_ok());
    }
}
