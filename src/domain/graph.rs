//! Compute graph validation and lowering — the small compiler at the heart
//! of the evaluator.
//!
//! A graph is validated, then lowered in reverse-topological order (from
//! `OUTPUT` back to its producers) into a flat program text plus a
//! de-duplicated file set. Lowering never touches disk or the network: it
//! is a pure function of the graph, which is what makes determinism
//! (Testable Property 1) checkable at all.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::artifact::{Artifact, File};
use crate::domain::sandbox;
use crate::domain::step::{ComputeKind, Step, StepType};
use crate::error::AppError;

/// A directed edge between two step sockets, identified by `(node_id, socket_id)` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from_node: String,
    pub from_socket: String,
    pub to_node: String,
    pub to_socket: String,
}

/// A test case: a directed acyclic graph of steps, lowered into one runner package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeGraph {
    pub id: i64,
    pub nodes: Vec<Step>,
    pub edges: Vec<Edge>,
}

/// The result of lowering a compute graph: source text plus referenced files.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledProgram {
    pub code: String,
    pub files: Vec<File>,
}

fn sanitize_ident(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn symbol(node_id: &str, socket_id: &str) -> String {
    format!("v_{}_{}", sanitize_ident(node_id), sanitize_ident(socket_id))
}

impl ComputeGraph {
    /// Splice the synthesised user-input node into the graph and run it.
    ///
    /// This is the only public entry point: validation and lowering always
    /// happen together, against the same spliced node set, so a caller can
    /// never observe a lowered program from an unvalidated graph.
    pub fn run(&self, input_step: Step) -> Result<AssembledProgram, AppError> {
        let mut nodes = self.nodes.clone();
        nodes.push(input_step);
        let spliced = ComputeGraph {
            id: self.id,
            nodes,
            edges: self.edges.clone(),
        };
        spliced.validate()?;
        spliced.lower()
    }

    fn output_nodes(&self) -> Vec<&Step> {
        self.nodes.iter().filter(|n| n.is_output()).collect()
    }

    /// Structural validation: output arity, socket uniqueness, edge
    /// referential integrity, single binding per input socket, acyclicity.
    fn validate(&self) -> Result<(), AppError> {
        let outputs = self.output_nodes();
        if outputs.len() != 1 {
            return Err(AppError::GraphInvalid(format!(
                "expected exactly one OUTPUT node, found {}",
                outputs.len()
            )));
        }

        for node in &self.nodes {
            let mut seen = HashSet::new();
            for socket in node.inputs.iter().chain(node.outputs.iter()) {
                if !seen.insert(&socket.id) {
                    return Err(AppError::GraphInvalid(format!(
                        "duplicate socket id '{}' on node '{}'",
                        socket.id, node.id
                    )));
                }
            }
        }

        let node_by_id: HashMap<&str, &Step> =
            self.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        for edge in &self.edges {
            let from = node_by_id.get(edge.from_node.as_str()).ok_or_else(|| {
                AppError::GraphInvalid(format!("edge references unknown node '{}'", edge.from_node))
            })?;
            if !from.outputs.iter().any(|s| s.id == edge.from_socket) {
                return Err(AppError::GraphInvalid(format!(
                    "edge references unknown output socket '{}.{}'",
                    edge.from_node, edge.from_socket
                )));
            }
            let to = node_by_id.get(edge.to_node.as_str()).ok_or_else(|| {
                AppError::GraphInvalid(format!("edge references unknown node '{}'", edge.to_node))
            })?;
            if !to.inputs.iter().any(|s| s.id == edge.to_socket) {
                return Err(AppError::GraphInvalid(format!(
                    "edge references unknown input socket '{}.{}'",
                    edge.to_node, edge.to_socket
                )));
            }
        }

        // Every input socket of every node reachable from OUTPUT is bound.
        let reachable = self.reachable_from_output();
        let mut incoming: HashMap<(&str, &str), usize> = HashMap::new();
        for edge in &self.edges {
            *incoming
                .entry((edge.to_node.as_str(), edge.to_socket.as_str()))
                .or_insert(0) += 1;
        }
        for node_id in &reachable {
            let node = node_by_id[node_id.as_str()];
            for socket in &node.inputs {
                let bound_count = incoming
                    .get(&(node.id.as_str(), socket.id.as_str()))
                    .copied()
                    .unwrap_or(0);
                match (bound_count, socket.data.is_some()) {
                    (0, false) => {
                        return Err(AppError::GraphInvalid(format!(
                            "input socket '{}.{}' is neither bound by an edge nor given a literal",
                            node.id, socket.id
                        )))
                    }
                    (n, _) if n > 1 => {
                        return Err(AppError::GraphInvalid(format!(
                            "input socket '{}.{}' is bound by {} incoming edges, expected exactly one",
                            node.id, socket.id, n
                        )))
                    }
                    _ => {}
                }
            }
        }

        // No cycles on the reachability closure from OUTPUT, backward.
        self.check_acyclic(&reachable)?;

        Ok(())
    }

    /// Nodes reachable by walking producer edges backward from the OUTPUT node.
    fn reachable_from_output(&self) -> HashSet<String> {
        let output = self
            .output_nodes()
            .into_iter()
            .next()
            .expect("validated: exactly one OUTPUT node");

        let mut producers: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            producers
                .entry(edge.to_node.as_str())
                .or_default()
                .push(edge.from_node.as_str());
        }

        let mut visited = HashSet::new();
        let mut stack = vec![output.id.as_str()];
        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id.to_string()) {
                continue;
            }
            if let Some(preds) = producers.get(node_id) {
                stack.extend(preds.iter().copied());
            }
        }
        visited
    }

    fn check_acyclic(&self, reachable: &HashSet<String>) -> Result<(), AppError> {
        let mut producers: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            if reachable.contains(&edge.to_node) && reachable.contains(&edge.from_node) {
                producers
                    .entry(edge.to_node.as_str())
                    .or_default()
                    .push(edge.from_node.as_str());
            }
        }

        #[derive(PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            node: &'a str,
            producers: &HashMap<&'a str, Vec<&'a str>>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), AppError> {
            match marks.get(node) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(AppError::GraphInvalid(format!(
                        "cycle detected involving node '{}'",
                        node
                    )))
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            if let Some(preds) = producers.get(node) {
                for pred in preds {
                    visit(pred, producers, marks)?;
                }
            }
            marks.insert(node, Mark::Done);
            Ok(())
        }

        for node_id in reachable {
            visit(node_id, &producers, &mut marks)?;
        }
        Ok(())
    }

    /// Reverse-topological lowering from OUTPUT, tie-broken on ascending
    /// `(node_id, socket_id)` for determinism (Testable Property 1).
    fn lower(&self) -> Result<AssembledProgram, AppError> {
        let reachable = self.reachable_from_output();
        let node_by_id: HashMap<&str, &Step> =
            self.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut producer_of: HashMap<(&str, &str), (&str, &str)> = HashMap::new();
        for edge in &self.edges {
            producer_of.insert(
                (edge.to_node.as_str(), edge.to_socket.as_str()),
                (edge.from_node.as_str(), edge.from_socket.as_str()),
            );
        }

        let mut order: Vec<&Step> = reachable
            .iter()
            .map(|id| node_by_id[id.as_str()])
            .collect();
        order.sort_by(|a, b| {
            let a_key = (a.id.as_str(), a.outputs.first().map(|s| s.id.as_str()).unwrap_or(""));
            let b_key = (b.id.as_str(), b.outputs.first().map(|s| s.id.as_str()).unwrap_or(""));
            a_key.cmp(&b_key)
        });

        let mut lines = Vec::new();
        let mut files: HashMap<String, File> = HashMap::new();

        // Files are collected from every node in the (spliced) graph, not
        // just the OUTPUT-reachable subset: dangling producers are allowed
        // (with only a warning), but their files still ship in the package.
        let mut all_nodes: Vec<&Step> = self.nodes.iter().collect();
        all_nodes.sort_by(|a, b| a.id.cmp(&b.id));
        for node in &all_nodes {
            if !reachable.contains(&node.id) {
                tracing::warn!(node_id = %node.id, "dangling producer not reachable from OUTPUT");
            }
            let mut sockets: Vec<&crate::domain::step::StepSocket> = node.outputs.iter().collect();
            sockets.sort_by(|a, b| a.id.cmp(&b.id));
            for socket in sockets {
                if let Some(Artifact::File(f)) = &socket.data {
                    collect_file(&mut files, f.clone())?;
                }
            }
        }

        for node in &order {
            match node.step_type {
                StepType::Input => {
                    for socket in &node.outputs {
                        let sym = symbol(&node.id, &socket.id);
                        let literal = match &socket.data {
                            Some(Artifact::Primitive(p)) => p.as_code_literal(),
                            Some(Artifact::File(f)) => format!("{:?}", f.file_name),
                            None => "None".to_string(),
                        };
                        lines.push(format!("{} = {}", sym, literal));
                    }
                }
                StepType::Output => {
                    let input = node.inputs.first().ok_or_else(|| {
                        AppError::GraphInvalid(format!("OUTPUT node '{}' has no input", node.id))
                    })?;
                    let value_sym = resolve_input(node, input, &producer_of, &node_by_id)?;
                    lines.push(format!("__result__ = {}", value_sym));
                }
                StepType::Compute(kind) => {
                    lower_compute(node, kind, &producer_of, &node_by_id, &mut lines)?;
                }
            }
        }

        let body = lines.join("\n");
        Ok(AssembledProgram {
            code: sandbox::wrap(&body),
            files: files.into_values().collect(),
        })
    }
}

fn collect_file(files: &mut HashMap<String, File>, file: File) -> Result<(), AppError> {
    match files.get(&file.file_name) {
        Some(existing) if existing.content != file.content => Err(AppError::GraphInvalid(format!(
            "file name collision on '{}' with differing contents",
            file.file_name
        ))),
        _ => {
            files.insert(file.file_name.clone(), file);
            Ok(())
        }
    }
}

/// Resolve the symbol feeding a given input socket: either its producer's
/// output symbol, or a freshly emitted literal if it only carries a default.
fn resolve_input(
    node: &Step,
    socket: &crate::domain::step::StepSocket,
    producer_of: &HashMap<(&str, &str), (&str, &str)>,
    _node_by_id: &HashMap<&str, &Step>,
) -> Result<String, AppError> {
    if let Some((from_node, from_socket)) = producer_of.get(&(node.id.as_str(), socket.id.as_str())) {
        return Ok(symbol(from_node, from_socket));
    }
    match &socket.data {
        Some(Artifact::Primitive(p)) => Ok(p.as_code_literal()),
        Some(Artifact::File(f)) => Ok(format!("{:?}", f.file_name)),
        None => Err(AppError::GraphInvalid(format!(
            "input socket '{}.{}' has neither an edge nor a literal",
            node.id, socket.id
        ))),
    }
}

fn lower_compute(
    node: &Step,
    kind: ComputeKind,
    producer_of: &HashMap<(&str, &str), (&str, &str)>,
    node_by_id: &HashMap<&str, &Step>,
    lines: &mut Vec<String>,
) -> Result<(), AppError> {
    match kind {
        ComputeKind::Const => {
            let out = node.outputs.first().ok_or_else(|| {
                AppError::GraphInvalid(format!("CONST node '{}' has no output", node.id))
            })?;
            let literal = match &out.data {
                Some(Artifact::Primitive(p)) => p.as_code_literal(),
                Some(Artifact::File(f)) => format!("{:?}", f.file_name),
                None => {
                    return Err(AppError::GraphInvalid(format!(
                        "CONST node '{}' output carries no literal",
                        node.id
                    )))
                }
            };
            lines.push(format!("{} = {}", symbol(&node.id, &out.id), literal));
        }
        ComputeKind::Concat => {
            let mut inputs = node.inputs.clone();
            inputs.sort_by(|a, b| a.id.cmp(&b.id));
            let mut parts = Vec::new();
            for socket in &inputs {
                parts.push(resolve_input(node, socket, producer_of, node_by_id)?);
            }
            let out = node.outputs.first().ok_or_else(|| {
                AppError::GraphInvalid(format!("CONCAT node '{}' has no output", node.id))
            })?;
            lines.push(format!(
                "{} = str({})",
                symbol(&node.id, &out.id),
                parts.join(") + str(")
            ));
        }
        ComputeKind::WriteFile => {
            let input = node.inputs.first().ok_or_else(|| {
                AppError::GraphInvalid(format!("WRITE_FILE node '{}' has no input", node.id))
            })?;
            let value_sym = resolve_input(node, input, producer_of, node_by_id)?;
            let out = node.outputs.first().ok_or_else(|| {
                AppError::GraphInvalid(format!("WRITE_FILE node '{}' has no output", node.id))
            })?;
            lines.push(format!(
                "{} = write_file({:?}, {})",
                symbol(&node.id, &out.id),
                format!("{}.out", node.id),
                value_sym
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::Primitive;
    use crate::domain::step::{StepSocket, StepType};

    fn input_output_graph(literal: i64) -> (ComputeGraph, Step) {
        let graph = ComputeGraph {
            id: 1,
            nodes: vec![Step {
                id: "out".to_string(),
                step_type: StepType::Output,
                inputs: vec![StepSocket {
                    id: "value".to_string(),
                    data: None,
                }],
                outputs: vec![],
            }],
            edges: vec![Edge {
                from_node: "0".to_string(),
                from_socket: "x".to_string(),
                to_node: "out".to_string(),
                to_socket: "value".to_string(),
            }],
        };
        let input_step = Step {
            id: "0".to_string(),
            step_type: StepType::Input,
            inputs: vec![],
            outputs: vec![StepSocket {
                id: "x".to_string(),
                data: Some(Artifact::Primitive(Primitive::Int(literal))),
            }],
        };
        (graph, input_step)
    }

    #[test]
    fn lowering_is_deterministic() {
        let (graph, input_step) = input_output_graph(5);
        let a = graph.run(input_step.clone()).unwrap();
        let b = graph.run(input_step).unwrap();
        assert_eq!(a.code, b.code);
        assert_eq!(a.files, b.files);
    }

    #[test]
    fn lowering_references_the_literal_value() {
        let (graph, input_step) = input_output_graph(5);
        let assembled = graph.run(input_step).unwrap();
        assert!(assembled.code.contains('5'));
    }

    #[test]
    fn two_output_nodes_is_graph_invalid() {
        let graph = ComputeGraph {
            id: 1,
            nodes: vec![
                Step {
                    id: "out1".to_string(),
                    step_type: StepType::Output,
                    inputs: vec![StepSocket {
                        id: "value".to_string(),
                        data: Some(Artifact::Primitive(Primitive::Int(1))),
                    }],
                    outputs: vec![],
                },
                Step {
                    id: "out2".to_string(),
                    step_type: StepType::Output,
                    inputs: vec![StepSocket {
                        id: "value".to_string(),
                        data: Some(Artifact::Primitive(Primitive::Int(1))),
                    }],
                    outputs: vec![],
                },
            ],
            edges: vec![],
        };
        let input_step = Step {
            id: "0".to_string(),
            step_type: StepType::Input,
            inputs: vec![],
            outputs: vec![],
        };
        let err = graph.run(input_step).unwrap_err();
        assert!(matches!(err, AppError::GraphInvalid(_)));
    }

    #[test]
    fn unbound_input_socket_is_graph_invalid() {
        let graph = ComputeGraph {
            id: 1,
            nodes: vec![Step {
                id: "out".to_string(),
                step_type: StepType::Output,
                inputs: vec![StepSocket {
                    id: "value".to_string(),
                    data: None,
                }],
                outputs: vec![],
            }],
            edges: vec![],
        };
        let input_step = Step {
            id: "0".to_string(),
            step_type: StepType::Input,
            inputs: vec![],
            outputs: vec![],
        };
        let err = graph.run(input_step).unwrap_err();
        assert!(matches!(err, AppError::GraphInvalid(_)));
    }

    #[test]
    fn cycle_is_graph_invalid() {
        let graph = ComputeGraph {
            id: 1,
            nodes: vec![
                Step {
                    id: "a".to_string(),
                    step_type: StepType::Compute(ComputeKind::Concat),
                    inputs: vec![StepSocket {
                        id: "in".to_string(),
                        data: None,
                    }],
                    outputs: vec![StepSocket {
                        id: "out".to_string(),
                        data: None,
                    }],
                },
                Step {
                    id: "b".to_string(),
                    step_type: StepType::Compute(ComputeKind::Concat),
                    inputs: vec![StepSocket {
                        id: "in".to_string(),
                        data: None,
                    }],
                    outputs: vec![StepSocket {
                        id: "out".to_string(),
                        data: None,
                    }],
                },
                Step {
                    id: "out".to_string(),
                    step_type: StepType::Output,
                    inputs: vec![StepSocket {
                        id: "value".to_string(),
                        data: None,
                    }],
                    outputs: vec![],
                },
            ],
            edges: vec![
                Edge {
                    from_node: "a".to_string(),
                    from_socket: "out".to_string(),
                    to_node: "b".to_string(),
                    to_socket: "in".to_string(),
                },
                Edge {
                    from_node: "b".to_string(),
                    from_socket: "out".to_string(),
                    to_node: "a".to_string(),
                    to_socket: "in".to_string(),
                },
                Edge {
                    from_node: "a".to_string(),
                    from_socket: "out".to_string(),
                    to_node: "out".to_string(),
                    to_socket: "value".to_string(),
                },
            ],
        };
        let input_step = Step {
            id: "0".to_string(),
            step_type: StepType::Input,
            inputs: vec![],
            outputs: vec![],
        };
        let err = graph.run(input_step).unwrap_err();
        assert!(matches!(err, AppError::GraphInvalid(_)));
    }

    #[test]
    fn file_name_collision_with_differing_contents_fails() {
        let graph = ComputeGraph {
            id: 1,
            nodes: vec![Step {
                id: "out".to_string(),
                step_type: StepType::Output,
                inputs: vec![StepSocket {
                    id: "value".to_string(),
                    data: Some(Artifact::Primitive(Primitive::Int(1))),
                }],
                outputs: vec![],
            }],
            edges: vec![],
        };
        let input_step = Step {
            id: "0".to_string(),
            step_type: StepType::Input,
            inputs: vec![],
            outputs: vec![
                StepSocket {
                    id: "f1".to_string(),
                    data: Some(Artifact::File(File {
                        file_name: "shared.txt".to_string(),
                        content: "one".to_string(),
                    })),
                },
                StepSocket {
                    id: "f2".to_string(),
                    data: Some(Artifact::File(File {
                        file_name: "shared.txt".to_string(),
                        content: "two".to_string(),
                    })),
                },
            ],
        };
        let err = graph.run(input_step).unwrap_err();
        assert!(matches!(err, AppError::GraphInvalid(_)));
    }
}
