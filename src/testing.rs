//! Shared fixtures for unit tests

use crate::config::{ArithmeticVariable, Catalog, ListVariable, Schema};
use crate::filter::{Block, Condition, ListConditionDescriptor, Logic, Node, OperatorKind};
use serde_json::{json, Value};

/// Alert-like schema with records, a named record reused by an array,
/// a cross-match style array, a primitive array and boolean flags
pub fn sample_schema() -> Schema {
    serde_json::from_value(json!({
        "type": "record",
        "name": "Alert",
        "fields": [
            {"name": "objectId", "type": "string"},
            {"name": "candid", "type": "long"},
            {"name": "candidate", "type": {
                "type": "record",
                "name": "Candidate",
                "fields": [
                    {"name": "jd", "type": "double"},
                    {"name": "fid", "type": "int"},
                    {"name": "magpsf", "type": "float"},
                    {"name": "diffmaglim", "type": "float"},
                    {"name": "isdiffpos", "type": "string"}
                ]
            }},
            {"name": "prv_candidates", "type": ["null", {"type": "array", "items": "Candidate"}]},
            {"name": "cross_matches", "type": {
                "type": "array",
                "items": {
                    "type": "record",
                    "name": "CrossMatch",
                    "fields": [
                        {"name": "NED", "type": ["null", {
                            "type": "record", "name": "NED",
                            "fields": [{"name": "z", "type": ["null", "double"]}]
                        }]},
                        {"name": "CLU", "type": ["null", {
                            "type": "record", "name": "CLU",
                            "fields": [{"name": "name", "type": "string"}]
                        }]}
                    ]
                }
            }},
            {"name": "tags", "type": {"type": "array", "items": "string"}},
            {"name": "properties", "type": ["null", {
                "type": "record",
                "name": "Properties",
                "fields": [
                    {"name": "rock", "type": "boolean"},
                    {"name": "star", "type": ["null", "boolean"]}
                ]
            }]}
        ]
    }))
    .expect("sample schema")
}

pub fn condition(id: &str, field: &str, op: OperatorKind, value: Value) -> Node {
    Node::Condition(Condition::new(id, field, op, value))
}

pub fn block(id: &str, logic: Logic, children: Vec<Node>) -> Block {
    Block::new(id, logic, children)
}

/// Arithmetic chain `scaled -> color -> candidate.*`, a variable over a list
/// variable, and one list variable of each shape
pub fn sample_catalog() -> Catalog {
    let bright = block(
        "bright",
        Logic::And,
        vec![condition("b1", "magpsf", OperatorKind::Lt, json!(18))],
    );
    Catalog::new(
        vec![
            ArithmeticVariable {
                name: "color".into(),
                variable: "color = candidate.magpsf - candidate.diffmaglim".into(),
            },
            ArithmeticVariable {
                name: "scaled".into(),
                variable: r"scaled = \frac{color}{2}".into(),
            },
            ArithmeticVariable {
                name: "offset".into(),
                variable: "offset = min_mag - candidate.magpsf".into(),
            },
        ],
        vec![
            ListVariable::new(
                "min_mag",
                ListConditionDescriptor::new("prv_candidates", OperatorKind::Min)
                    .with_sub_field("magpsf"),
            ),
            ListVariable::new(
                "bright_dets",
                ListConditionDescriptor::new("prv_candidates", OperatorKind::Filter)
                    .with_nested(bright.clone()),
            ),
            ListVariable::new(
                "has_bright",
                ListConditionDescriptor::new("prv_candidates", OperatorKind::AnyElementTrue)
                    .with_nested(bright),
            ),
        ],
    )
}
