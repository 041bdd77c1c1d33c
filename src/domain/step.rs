//! Step library: the leaf behaviors recognised inside a compute graph.

use crate::domain::artifact::Artifact;
use serde::{Deserialize, Serialize};

/// A named port on a step. Carries a literal default when no edge feeds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSocket {
    pub id: String,
    #[serde(default)]
    pub data: Option<Artifact>,
}

/// Compute leaf kinds, beyond the mandatory `INPUT`/`OUTPUT` sinks.
///
/// Non-goal: no general "invocation" step kind — the core never executes
/// arbitrary code, only the sandboxed runner does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputeKind {
    /// Concatenate all input sockets (in socket id order) as text.
    Concat,
    /// Re-emit a literal carried on the step's own output socket.
    Const,
    /// Wrap a single text input as a `File` artifact named by the step id.
    WriteFile,
}

/// The discriminator for a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    Input,
    Output,
    Compute(ComputeKind),
}

/// A node in a compute graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(flatten)]
    pub step_type: StepType,
    #[serde(default)]
    pub inputs: Vec<StepSocket>,
    #[serde(default)]
    pub outputs: Vec<StepSocket>,
}

impl Step {
    pub fn is_output(&self) -> bool {
        matches!(self.step_type, StepType::Output)
    }

    pub fn is_input(&self) -> bool {
        matches!(self.step_type, StepType::Input)
    }

    /// The user-input synthesised node always carries this id.
    pub const USER_INPUT_STEP_ID: &'static str = "0";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_type_flattens_into_json() {
        let step = Step {
            id: "n1".to_string(),
            step_type: StepType::Compute(ComputeKind::Concat),
            inputs: vec![],
            outputs: vec![],
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "COMPUTE");
    }
}
