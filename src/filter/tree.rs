//! Filter tree structures
//!
//! These mirror the JSON the filter editor produces, so field names follow its
//! camelCase conventions on the wire.

use crate::filter::operator::{deserialize_lenient, OperatorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Boolean combinator of a block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Logic {
    #[default]
    #[serde(alias = "AND", alias = "and")]
    And,
    #[serde(alias = "OR", alias = "or")]
    Or,
}

impl Logic {
    /// Operator key used to combine compiled children
    pub fn key(self) -> &'static str {
        match self {
            Logic::And => "$and",
            Logic::Or => "$or",
        }
    }
}

/// A node of the filter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum Node {
    Block(Block),
    Condition(Condition),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Block(b) => &b.id,
            Node::Condition(c) => &c.id,
        }
    }
}

impl From<Block> for Node {
    fn from(block: Block) -> Self {
        Node::Block(block)
    }
}

impl From<Condition> for Node {
    fn from(condition: Condition) -> Self {
        Node::Condition(condition)
    }
}

fn default_true() -> bool {
    true
}

/// Boolean grouping node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub logic: Logic,
    /// Required on the wire; an object without it is a literal value
    pub children: Vec<Node>,
    /// Name of a saved custom block
    #[serde(
        default,
        rename = "customBlockName",
        alias = "name",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    /// `false` on a named block turns it into a precomputed predicate that must not hold
    #[serde(default = "default_true", rename = "isTrue")]
    pub is_true: bool,
}

impl Block {
    pub fn new(id: impl Into<String>, logic: Logic, children: Vec<Node>) -> Self {
        Self {
            id: id.into(),
            logic,
            children,
            name: None,
            is_true: true,
        }
    }

    /// A saved custom block
    pub fn named(mut self, name: impl Into<String>, is_true: bool) -> Self {
        self.name = Some(name.into());
        self.is_true = is_true;
        self
    }

    /// Named block with `isTrue = false`
    pub fn is_negated_named(&self) -> bool {
        !self.is_true && self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    /// Field name the block is materialized under in the projection stage
    pub fn materialized_name(&self) -> Option<String> {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .map(sanitize_name)
    }
}

/// Replace every character outside `[A-Za-z0-9]` with `_`
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Leaf predicate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub operator: Option<OperatorKind>,
    #[serde(default)]
    pub value: ConditionValue,
    /// Tri-state negation; unset behaves like `true`
    #[serde(
        default,
        rename = "booleanSwitch",
        skip_serializing_if = "Option::is_none"
    )]
    pub boolean_switch: Option<bool>,
}

impl Condition {
    pub fn new(
        id: impl Into<String>,
        field: impl Into<String>,
        operator: OperatorKind,
        value: impl Into<ConditionValue>,
    ) -> Self {
        Self {
            id: id.into(),
            field: Some(field.into()),
            operator: Some(operator),
            value: value.into(),
            boolean_switch: None,
        }
    }

    pub fn with_switch(mut self, switch: bool) -> Self {
        self.boolean_switch = Some(switch);
        self
    }

    /// Referenced field, if one has been chosen
    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }

    /// Field and operator both present
    pub fn is_complete(&self) -> bool {
        self.field_name().is_some() && self.operator.is_some()
    }

    pub fn is_negated(&self) -> bool {
        self.boolean_switch == Some(false)
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// Array descriptor (`{"type": "array", "field": ...}`)
    List(Box<ListConditionDescriptor>),
    /// Per-element predicate (`{"children": [...]}`)
    Nested(Box<Block>),
    /// Scalar or array literal
    Literal(Value),
}

impl Default for ConditionValue {
    fn default() -> Self {
        ConditionValue::Literal(Value::Null)
    }
}

impl ConditionValue {
    pub fn literal(&self) -> Option<&Value> {
        match self {
            ConditionValue::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn nested(&self) -> Option<&Block> {
        match self {
            ConditionValue::Nested(b) => Some(b),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> Option<&ListConditionDescriptor> {
        match self {
            ConditionValue::List(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Value> for ConditionValue {
    fn from(value: Value) -> Self {
        ConditionValue::Literal(value)
    }
}

impl From<Block> for ConditionValue {
    fn from(block: Block) -> Self {
        ConditionValue::Nested(Box::new(block))
    }
}

impl From<ListConditionDescriptor> for ConditionValue {
    fn from(descriptor: ListConditionDescriptor) -> Self {
        ConditionValue::List(Box::new(descriptor))
    }
}

/// Discriminator of a list descriptor; only `"array"` is accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayTag {
    #[default]
    #[serde(rename = "array")]
    Array,
}

/// Array predicate or aggregation over an array field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListConditionDescriptor {
    #[serde(rename = "type")]
    pub kind: ArrayTag,
    /// Array field the operator ranges over
    pub field: String,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub operator: Option<OperatorKind>,
    /// Element sub-field for aggregation operators
    #[serde(default, rename = "subField", skip_serializing_if = "Option::is_none")]
    pub sub_field: Option<String>,
    /// Nested predicate block, or the comparison value of an aggregation
    #[serde(default)]
    pub value: ConditionValue,
    #[serde(
        default,
        rename = "comparison",
        alias = "comparisonOperator",
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub comparison: Option<OperatorKind>,
    #[serde(default, rename = "comparisonValue", skip_serializing_if = "Option::is_none")]
    pub comparison_value: Option<Value>,
    #[serde(
        default,
        rename = "booleanSwitch",
        skip_serializing_if = "Option::is_none"
    )]
    pub boolean_switch: Option<bool>,
}

impl ListConditionDescriptor {
    pub fn new(field: impl Into<String>, operator: OperatorKind) -> Self {
        Self {
            field: field.into(),
            operator: Some(operator),
            ..Default::default()
        }
    }

    pub fn with_nested(mut self, block: Block) -> Self {
        self.value = ConditionValue::Nested(Box::new(block));
        self
    }

    pub fn with_sub_field(mut self, sub_field: impl Into<String>) -> Self {
        self.sub_field = Some(sub_field.into());
        self
    }

    pub fn with_comparison(mut self, comparison: OperatorKind, value: Value) -> Self {
        self.comparison = Some(comparison);
        self.comparison_value = Some(value);
        self
    }

    pub fn sub_field(&self) -> Option<&str> {
        self.sub_field.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_editor_tree() {
        let raw = json!({
            "id": "root",
            "logic": "Or",
            "children": [
                {"id": "c1", "category": "condition", "type": "number",
                 "field": "candidate.magpsf", "operator": "$gt", "value": "18.5"},
                {"id": "b1", "category": "block", "logic": "And",
                 "customBlockName": "bright star", "isTrue": false,
                 "children": []}
            ]
        });
        let block: Block = serde_json::from_value(raw).unwrap();
        assert_eq!(block.logic, Logic::Or);
        assert_eq!(block.children.len(), 2);

        match &block.children[0] {
            Node::Condition(c) => {
                assert_eq!(c.field_name(), Some("candidate.magpsf"));
                assert_eq!(c.operator, Some(OperatorKind::Gt));
                assert_eq!(c.value, ConditionValue::Literal(json!("18.5")));
                assert!(c.is_complete());
            }
            _ => panic!("Expected condition"),
        }
        match &block.children[1] {
            Node::Block(b) => {
                assert!(b.is_negated_named());
                assert_eq!(b.materialized_name().as_deref(), Some("bright_star"));
            }
            _ => panic!("Expected block"),
        }
    }

    #[test]
    fn test_condition_value_shapes() {
        let nested: ConditionValue =
            serde_json::from_value(json!({"id": "n", "logic": "And", "children": []})).unwrap();
        assert!(nested.nested().is_some());

        let list: ConditionValue = serde_json::from_value(json!({
            "type": "array", "field": "prv_candidates", "subField": "magpsf",
            "comparison": "$lt", "comparisonValue": 19
        }))
        .unwrap();
        let descriptor = list.descriptor().unwrap();
        assert_eq!(descriptor.sub_field(), Some("magpsf"));
        assert_eq!(descriptor.comparison, Some(OperatorKind::Lt));
        assert_eq!(descriptor.comparison_value, Some(json!(19)));

        let literal: ConditionValue = serde_json::from_value(json!([1, 2])).unwrap();
        assert_eq!(literal.literal(), Some(&json!([1, 2])));
    }

    #[test]
    fn test_incomplete_condition() {
        let c: Condition =
            serde_json::from_value(json!({"id": "c", "field": "  ", "operator": "$round"}))
                .unwrap();
        assert!(!c.is_complete());
        assert_eq!(c.operator, None);
        assert_eq!(c.value, ConditionValue::Literal(Value::Null));
    }

    #[test]
    fn test_negated_named_requires_name() {
        let mut block = Block::new("b", Logic::And, vec![]);
        block.is_true = false;
        assert!(!block.is_negated_named());
        let block = block.named("  ", false);
        assert!(!block.is_negated_named());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("SN-like v2.0"), "SN_like_v2_0");
    }
}
