//! Structural pipeline checks
//!
//! Run on a pipeline before it is handed to the executor. The validator
//! only reports; it never repairs a pipeline.

use crate::compiler::Pipeline;
use serde_json::Value;
use thiserror::Error;

/// Stages that must carry a non-empty body
const KNOWN_STAGES: [&str; 7] = [
    "$group",
    "$sort",
    "$limit",
    "$skip",
    "$lookup",
    "$unwind",
    "$addFields",
];

/// First structural problem found in a pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("pipeline must be an array of stages")]
    NotAnArray,

    #[error("pipeline has no stages")]
    NoStages,

    #[error("stage {0} must be an object with exactly one key")]
    MalformedStage(usize),

    #[error("stage {index} ({stage}) is empty")]
    EmptyStage { index: usize, stage: String },

    #[error("stage {index} ({stage}) is null")]
    NullStage { index: usize, stage: String },

    #[error("empty object at {0}")]
    EmptyObject(String),

    #[error("empty key at {0}")]
    EmptyKey(String),

    #[error("{operator} at {path} needs an array operand")]
    ExpectedArray { operator: String, path: String },

    #[error("$size at {0} must be a non-negative integer")]
    InvalidSize(String),

    #[error("{operator} at {path} has no number or string operand")]
    IncomparableOperands { operator: String, path: String },
}

/// Check a pipeline document
pub fn validate_pipeline(pipeline: &Value) -> Result<(), ValidationIssue> {
    let stages = pipeline.as_array().ok_or(ValidationIssue::NotAnArray)?;
    if stages.is_empty() {
        return Err(ValidationIssue::NoStages);
    }
    for (index, stage) in stages.iter().enumerate() {
        validate_stage(index, stage)?;
    }
    Ok(())
}

pub fn is_valid_pipeline(pipeline: &Value) -> bool {
    match validate_pipeline(pipeline) {
        Ok(()) => true,
        Err(issue) => {
            tracing::debug!(%issue, "pipeline rejected");
            false
        }
    }
}

/// Pretty-print a pipeline for display
pub fn format_pipeline(pipeline: &Value) -> String {
    serde_json::to_string_pretty(pipeline).unwrap_or_else(|_| pipeline.to_string())
}

impl Pipeline {
    pub fn validate(&self) -> Result<(), ValidationIssue> {
        validate_pipeline(&self.to_value())
    }
}

fn validate_stage(index: usize, stage: &Value) -> Result<(), ValidationIssue> {
    let (name, body) = match stage.as_object() {
        Some(map) if map.len() == 1 => map.iter().next().ok_or(ValidationIssue::MalformedStage(index))?,
        _ => return Err(ValidationIssue::MalformedStage(index)),
    };
    let empty = || ValidationIssue::EmptyStage {
        index,
        stage: name.clone(),
    };

    match name.as_str() {
        "$match" | "$project" => match body.as_object() {
            Some(content) if !content.is_empty() => validate_value(body, name),
            _ => Err(empty()),
        },
        known if KNOWN_STAGES.contains(&known) => {
            if is_empty_body(body) {
                Err(empty())
            } else {
                Ok(())
            }
        }
        _ if body.is_null() => Err(ValidationIssue::NullStage {
            index,
            stage: name.clone(),
        }),
        _ => Ok(()),
    }
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn validate_value(value: &Value, path: &str) -> Result<(), ValidationIssue> {
    match value {
        Value::Object(map) => {
            if map.is_empty() {
                return Err(ValidationIssue::EmptyObject(path.to_string()));
            }
            for (key, operand) in map {
                if key.is_empty() {
                    return Err(ValidationIssue::EmptyKey(path.to_string()));
                }
                let child = format!("{}.{}", path, key);
                validate_operator(key, operand, &child)?;
                validate_value(operand, &child)?;
            }
            Ok(())
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| validate_value(item, &format!("{}[{}]", path, i))),
        _ => Ok(()),
    }
}

fn validate_operator(key: &str, operand: &Value, path: &str) -> Result<(), ValidationIssue> {
    match key {
        "$in" | "$nin" if !operand.is_array() => Err(ValidationIssue::ExpectedArray {
            operator: key.to_string(),
            path: path.to_string(),
        }),
        "$size" => match operand {
            Value::Number(n) if n.as_u64().is_some() => Ok(()),
            Value::String(s) if s.starts_with('$') => Ok(()),
            Value::Object(_) | Value::Array(_) => Ok(()),
            _ => Err(ValidationIssue::InvalidSize(path.to_string())),
        },
        "$gt" | "$gte" | "$lt" | "$lte" => match operand {
            Value::Array(items) if !items.iter().any(|v| v.is_number() || v.is_string()) => {
                Err(ValidationIssue::IncomparableOperands {
                    operator: key.to_string(),
                    path: path.to_string(),
                })
            }
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}
