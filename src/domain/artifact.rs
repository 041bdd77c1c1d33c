//! Typed values and file artifacts that flow between compute graph steps.

use serde::{Deserialize, Serialize};

/// A literal scalar value carried on a socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Primitive {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Primitive {
    /// Render the primitive as it would appear as a literal in generated code.
    pub fn as_code_literal(&self) -> String {
        match self {
            Primitive::Int(v) => v.to_string(),
            Primitive::Float(v) => v.to_string(),
            Primitive::Str(v) => format!("{:?}", v),
            Primitive::Bool(v) => v.to_string(),
        }
    }

    /// Render the primitive as plain text (used when concatenating strings).
    pub fn as_text(&self) -> String {
        match self {
            Primitive::Int(v) => v.to_string(),
            Primitive::Float(v) => v.to_string(),
            Primitive::Str(v) => v.clone(),
            Primitive::Bool(v) => v.to_string(),
        }
    }
}

/// A named text file passed alongside a runner package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub file_name: String,
    pub content: String,
}

/// The value carried on an edge: either a scalar or a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Artifact {
    Primitive(Primitive),
    File(File),
}

impl Artifact {
    pub fn as_file(&self) -> Option<&File> {
        match self {
            Artifact::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Artifact::Primitive(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_code_literal_quotes_strings() {
        let p = Primitive::Str("hi".to_string());
        assert_eq!(p.as_code_literal(), "\"hi\"");
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let a = Artifact::File(File {
            file_name: "a.txt".to_string(),
            content: "hello".to_string(),
        });
        let json = serde_json::to_string(&a).unwrap();
        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }
}
