//! Filter tree to aggregation pipeline compiler
//!
//! Compilation runs in two passes over the root blocks. Usage analysis
//! decides what must be materialized, the projection stage materializes it,
//! and the match stage is compiled against exactly that set of names.
//!
//! Compiling is pure and fail-soft: incomplete conditions contribute
//! nothing and no input makes it return an error.

mod element;
mod list;
mod matcher;
mod project;
mod usage;
pub mod value;


pub use usage::Usage;

use crate::config::{load_catalog, load_filters, load_schema, Catalog, CompilerConfig, Schema};
use crate::error::Result;
use crate::expression::FieldScope;
use crate::filter::Block;
use crate::resolver::FieldResolver;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::instrument;

// ============================================================================
// Pipeline
// ============================================================================

/// One pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Project(Map<String, Value>),
    Match(Map<String, Value>),
}

impl Stage {
    pub fn key(&self) -> &'static str {
        match self {
            Stage::Project(_) => "$project",
            Stage::Match(_) => "$match",
        }
    }

    pub fn content(&self) -> &Map<String, Value> {
        match self {
            Stage::Project(content) | Stage::Match(content) => content,
        }
    }

    pub fn to_value(&self) -> Value {
        value::single(self.key(), Value::Object(self.content().clone()))
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.key(), self.content())?;
        map.end()
    }
}

/// Ordered stages: an optional projection, then an optional match
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn project(&self) -> Option<&Map<String, Value>> {
        self.stages.iter().find_map(|s| match s {
            Stage::Project(content) => Some(content),
            _ => None,
        })
    }

    pub fn match_filter(&self) -> Option<&Map<String, Value>> {
        self.stages.iter().find_map(|s| match s {
            Stage::Match(content) => Some(content),
            _ => None,
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::to_value).collect())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Compiler Context
// ============================================================================

/// Everything a compilation reads besides the filter tree
#[derive(Debug, Clone, Default)]
pub struct CompilerContext {
    pub schema: Schema,
    pub catalog: Catalog,
    pub config: CompilerConfig,
}

impl CompilerContext {
    pub fn new(schema: Schema, catalog: Catalog, config: CompilerConfig) -> Self {
        Self {
            schema,
            catalog,
            config,
        }
    }

    /// Load schema, variables and options from their JSON documents
    pub fn from_json(schema: &str, catalog: &str, config: Option<&str>) -> Result<Self> {
        let config = match config {
            Some(json) => CompilerConfig::from_json(json)?,
            None => CompilerConfig::default(),
        };
        Ok(Self::new(load_schema(schema)?, load_catalog(catalog)?, config))
    }

    pub fn resolver(&self) -> FieldResolver<'_> {
        FieldResolver::new(&self.schema, &self.catalog)
    }

    pub fn usage(&self, blocks: &[Block]) -> Usage {
        Usage::collect(blocks, &self.resolver())
    }

    /// Compile root blocks into a pipeline
    #[instrument(name = "compiler::compile", level = "debug", skip_all, fields(roots = blocks.len()))]
    pub fn compile(&self, blocks: &[Block]) -> Pipeline {
        let usage = self.usage(blocks);
        let mut compiler = Compiler::new(self.resolver(), &self.config);
        let mut stages = Vec::with_capacity(2);

        if let Some(projection) = compiler.project_stage(&usage) {
            stages.push(Stage::Project(projection));
        }

        let mut filter = Map::new();
        for block in blocks {
            if let Some(fragment) = compiler.match_block(block) {
                merge_root(&mut filter, fragment);
            }
        }
        if !filter.is_empty() {
            stages.push(Stage::Match(filter));
        }

        tracing::debug!(stages = stages.len(), "pipeline compiled");
        Pipeline { stages }
    }

    /// Parse a filter document and compile it
    pub fn compile_json(&self, filters: &str) -> Result<Pipeline> {
        Ok(self.compile(&load_filters(filters)?))
    }
}

/// Merge a root block's fragment; a key already present moves into `$and`
fn merge_root(target: &mut Map<String, Value>, fragment: Value) {
    let Value::Object(fragment) = fragment else {
        return;
    };
    for (key, value) in fragment {
        if !target.contains_key(&key) {
            target.insert(key, value);
            continue;
        }
        let and = target
            .entry("$and")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = and {
            match value {
                Value::Array(more) if key == "$and" => items.extend(more),
                other => items.push(value::single(key, other)),
            }
        }
    }
}

// ============================================================================
// Compiler State
// ============================================================================

/// Field scope plus the schema path of the array in scope
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'s> {
    pub fields: FieldScope,
    pub array: Option<&'s str>,
}

impl<'s> Scope<'s> {
    pub fn document() -> Self {
        Self {
            fields: FieldScope::Document,
            array: None,
        }
    }

    pub fn element_of(array: &'s str) -> Self {
        Self {
            fields: FieldScope::ArrayElement,
            array: Some(array),
        }
    }

    pub fn reference(&self, field: &str) -> String {
        self.fields.field_ref(field)
    }

    /// Schema path of a field, used for type lookup
    pub fn schema_path(&self, field: &str) -> String {
        match (self.fields, self.array) {
            (FieldScope::ArrayElement, Some(array)) if !field.starts_with('$') => {
                match field.strip_prefix("this") {
                    Some("") => array.to_string(),
                    Some(rest) if rest.starts_with('.') => format!("{}{}", array, rest),
                    _ => format!("{}.{}", array, field),
                }
            }
            _ => field.to_string(),
        }
    }
}

/// Per-compilation state
pub(crate) struct Compiler<'a> {
    resolver: FieldResolver<'a>,
    config: &'a CompilerConfig,
    projected_lists: BTreeSet<String>,
    /// Negated blocks with their projected names
    projected_blocks: Vec<(String, Block)>,
}

impl<'a> Compiler<'a> {
    fn new(resolver: FieldResolver<'a>, config: &'a CompilerConfig) -> Self {
        Self {
            resolver,
            config,
            projected_lists: BTreeSet::new(),
            projected_blocks: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Condition, ListConditionDescriptor, Logic, Node, OperatorKind};
    use crate::testing::{block, condition, sample_catalog, sample_schema};
    use serde_json::json;

    fn context() -> CompilerContext {
        CompilerContext::new(sample_schema(), sample_catalog(), CompilerConfig::default())
    }

    fn root(children: Vec<Node>) -> Block {
        block("root", Logic::And, children)
    }

    fn match_of(pipeline: &Pipeline) -> Value {
        Value::Object(pipeline.match_filter().cloned().unwrap_or_default())
    }

    fn project_of(pipeline: &Pipeline) -> Value {
        Value::Object(pipeline.project().cloned().unwrap_or_default())
    }

    fn compile_one(node: Node) -> Pipeline {
        context().compile(&[root(vec![node])])
    }

    #[test]
    fn test_numeric_string_coerced() {
        let pipeline = compile_one(condition("c", "candidate.magpsf", OperatorKind::Gt, json!("18.5")));
        assert_eq!(
            pipeline.to_value(),
            json!([
                {"$project": {"candidate.magpsf": 1, "objectId": 1}},
                {"$match": {"candidate.magpsf": {"$gt": 18.5}}}
            ])
        );
    }

    #[test]
    fn test_length_operators() {
        let cases = [
            (OperatorKind::LengthGt, json!(5), json!({"prv_candidates.5": {"$exists": true}})),
            (OperatorKind::LengthGt, json!(-1), json!({"$expr": true})),
            (OperatorKind::LengthGt, json!("2.5"), json!({"prv_candidates.2": {"$exists": true}})),
            (OperatorKind::LengthLt, json!(0), json!({"$expr": false})),
            (OperatorKind::LengthLt, json!(3), json!({"prv_candidates.2": {"$exists": false}})),
            (OperatorKind::LengthLt, json!(2.5), json!({"prv_candidates.2": {"$exists": false}})),
        ];
        for (op, value, expected) in cases {
            let pipeline = compile_one(condition("c", "prv_candidates", op, value));
            assert_eq!(match_of(&pipeline), expected, "{}", op);
        }
    }

    #[test]
    fn test_single_child_passthrough() {
        let leaf = condition("c", "candidate.jd", OperatorKind::Lt, json!(5));
        let wrapped = compile_one(Node::Block(block("inner", Logic::Or, vec![leaf.clone()])));
        let bare = compile_one(leaf);
        assert_eq!(match_of(&wrapped), match_of(&bare));
        assert_eq!(match_of(&bare), json!({"candidate.jd": {"$lt": 5}}));
    }

    #[test]
    fn test_logic_combination() {
        let pipeline = context().compile(&[block(
            "root",
            Logic::Or,
            vec![
                condition("a", "candidate.jd", OperatorKind::Lt, json!(5)),
                condition("b", "candidate.fid", OperatorKind::Eq, json!(2)),
            ],
        )]);
        assert_eq!(
            match_of(&pipeline),
            json!({"$or": [{"candidate.jd": {"$lt": 5}}, {"candidate.fid": {"$eq": 2}}]})
        );
    }

    #[test]
    fn test_boolean_switch_negates_fragment() {
        let positive = compile_one(condition("c", "candidate.jd", OperatorKind::Gt, json!(1)));
        let negative = compile_one(Node::Condition(
            Condition::new("c", "candidate.jd", OperatorKind::Gt, json!(1)).with_switch(false),
        ));
        assert_eq!(match_of(&negative), json!({"$nor": [match_of(&positive)]}));

        let expr = compile_one(Node::Condition(
            Condition::new("c", "candidate.jd", OperatorKind::IsNumber, json!(true)).with_switch(false),
        ));
        assert_eq!(
            match_of(&expr),
            json!({"$expr": {"$not": [{"$isNumber": "$candidate.jd"}]}})
        );
    }

    #[test]
    fn test_idempotent() {
        let ctx = context();
        let tree = vec![root(vec![
            condition("a", "offset", OperatorKind::Gt, json!(0)),
            condition("b", "has_bright", OperatorKind::Eq, json!(true)),
            condition("c", "bright_dets", OperatorKind::LengthGt, json!(1)),
        ])];
        assert_eq!(ctx.compile(&tree), ctx.compile(&tree));
    }

    #[test]
    fn test_incomplete_tree_compiles_to_nothing() {
        let mut missing_operator = Condition::default();
        missing_operator.field = Some("candidate.jd".into());
        let pipeline = context().compile(&[root(vec![
            Node::Condition(missing_operator),
            Node::Block(block("empty", Logic::Or, vec![])),
        ])]);
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.to_json().unwrap(), "[]");
    }

    #[test]
    fn test_value_shapes() {
        let cases = [
            ("properties.rock", OperatorKind::Eq, json!(true), json!({"properties.rock": {"$in": [true]}})),
            ("properties.star", OperatorKind::Ne, json!("false"), json!({"properties.star": {"$nin": [false]}})),
            ("candidate.isdiffpos", OperatorKind::Eq, json!("1"), json!({"candidate.isdiffpos": {"$eq": "1"}})),
            ("candidate.fid", OperatorKind::In, json!(1), json!({"candidate.fid": {"$in": [1]}})),
            ("candidate.fid", OperatorKind::Nin, json!([1, 2]), json!({"candidate.fid": {"$nin": [1, 2]}})),
            (
                "candidate.isdiffpos",
                OperatorKind::Contains,
                json!("a.b"),
                json!({"candidate.isdiffpos": {"$regex": "a\\.b", "$options": "i"}}),
            ),
            (
                "candidate.isdiffpos",
                OperatorKind::Regex,
                json!("^t|1$"),
                json!({"candidate.isdiffpos": {"$regex": "^t|1$", "$options": "i"}}),
            ),
            (
                "candidate.isdiffpos",
                OperatorKind::StartsWith,
                json!("t"),
                json!({"candidate.isdiffpos": {"$regex": "^t", "$options": "i"}}),
            ),
            ("candidate.jd", OperatorKind::Exists, json!(false), json!({"candidate.jd": {"$exists": false}})),
            ("candidate.jd", OperatorKind::Exists, json!(null), json!({"candidate.jd": {"$exists": true}})),
            ("candidate.jd", OperatorKind::IsNumber, json!(null), json!({"$expr": {"$isNumber": "$candidate.jd"}})),
            (
                "candidate.jd",
                OperatorKind::Between,
                json!(["1", 2]),
                json!({"candidate.jd": {"$gte": 1, "$lte": 2}}),
            ),
            (
                "candidate.jd",
                OperatorKind::NotBetween,
                json!([1, 2]),
                json!({"$or": [{"candidate.jd": {"$lt": 1}}, {"candidate.jd": {"$gt": 2}}]}),
            ),
        ];
        for (field, op, value, expected) in cases {
            let pipeline = compile_one(condition("c", field, op, value));
            assert_eq!(match_of(&pipeline), expected, "{} {}", field, op);
        }
    }

    #[test]
    fn test_malformed_between_contributes_nothing() {
        let pipeline = compile_one(condition("c", "candidate.jd", OperatorKind::Between, json!([1])));
        assert!(pipeline.match_filter().is_none());
    }

    #[test]
    fn test_quantifier_with_element_predicate() {
        let nested = block(
            "n",
            Logic::And,
            vec![condition("e", "magpsf", OperatorKind::Lt, json!("18"))],
        );
        let pipeline = compile_one(Node::Condition(Condition::new(
            "c",
            "prv_candidates",
            OperatorKind::AnyElementTrue,
            nested,
        )));
        assert_eq!(
            match_of(&pipeline),
            json!({"$expr": {"$anyElementTrue": {"$map": {
                "input": {"$ifNull": ["$prv_candidates", []]},
                "in": {"$lt": ["$$this.magpsf", 18]}
            }}}})
        );
    }

    #[test]
    fn test_quantifier_scalar_and_bare() {
        let scalar = compile_one(condition("c", "tags", OperatorKind::AllElementsTrue, json!("x")));
        assert_eq!(
            match_of(&scalar),
            json!({"$expr": {"$allElementsTrue": {"$map": {
                "input": {"$ifNull": ["$tags", []]},
                "in": {"$eq": ["$$this", "x"]}
            }}}})
        );
        let bare = compile_one(condition("c", "tags", OperatorKind::AnyElementTrue, json!(null)));
        assert_eq!(
            match_of(&bare),
            json!({"$expr": {"$anyElementTrue": {"$ifNull": ["$tags", []]}}})
        );
    }

    #[test]
    fn test_filter_without_predicate_checks_array() {
        let pipeline = compile_one(condition("c", "prv_candidates", OperatorKind::Filter, json!(null)));
        assert_eq!(
            match_of(&pipeline),
            json!({"prv_candidates": {"$exists": true, "$type": "array"}})
        );
    }

    #[test]
    fn test_aggregate_descriptor_value() {
        let descriptor = ListConditionDescriptor::new("prv_candidates", OperatorKind::Min)
            .with_sub_field("magpsf")
            .with_comparison(OperatorKind::Lt, json!("19"));
        let pipeline = compile_one(Node::Condition(Condition::new(
            "c",
            "prv_candidates",
            OperatorKind::Min,
            descriptor,
        )));
        assert_eq!(
            match_of(&pipeline),
            json!({"$expr": {"$lt": [{"$min": "$prv_candidates.magpsf"}, 19]}})
        );

        let no_target = ListConditionDescriptor::new("prv_candidates", OperatorKind::Sum)
            .with_sub_field("magpsf");
        let pipeline = compile_one(Node::Condition(Condition::new(
            "c",
            "prv_candidates",
            OperatorKind::Sum,
            no_target,
        )));
        assert_eq!(
            match_of(&pipeline),
            json!({"$expr": {"$gt": [{"$sum": "$prv_candidates.magpsf"}, 0]}})
        );
    }

    #[test]
    fn test_materialized_list_variables() {
        let pipeline = context().compile(&[root(vec![
            condition("a", "min_mag", OperatorKind::Lt, json!("19")),
            condition("b", "bright_dets", OperatorKind::LengthGt, json!(2)),
            condition("c", "bright_dets", OperatorKind::Eq, json!(true)),
        ])]);
        assert_eq!(
            project_of(&pipeline),
            json!({
                "objectId": 1,
                "prv_candidates": 1,
                "min_mag": {"$min": "$prv_candidates.magpsf"},
                "bright_dets": {"$filter": {
                    "input": {"$ifNull": ["$prv_candidates", []]},
                    "cond": {"$lt": ["$$this.magpsf", 18]}
                }}
            })
        );
        assert_eq!(
            match_of(&pipeline),
            json!({"$and": [
                {"min_mag": {"$lt": 19}},
                {"bright_dets.2": {"$exists": true}},
                {"$expr": {"$gt": [{"$size": {"$ifNull": ["$bright_dets", []]}}, 0]}}
            ]})
        );
    }

    #[test]
    fn test_quantifier_variable_switches() {
        let definition = json!({"$anyElementTrue": {"$map": {
            "input": {"$ifNull": ["$prv_candidates", []]},
            "in": {"$lt": ["$$this.magpsf", 18]}
        }}});

        let plain = compile_one(condition("c", "has_bright", OperatorKind::Eq, json!(true)));
        assert_eq!(match_of(&plain), json!({"$expr": definition.clone()}));
        assert!(project_of(&plain).get("has_bright").is_none());

        let flipped = compile_one(condition("c", "has_bright", OperatorKind::Eq, json!(false)));
        assert_eq!(match_of(&flipped), json!({"$expr": {"$not": [definition.clone()]}}));

        let switched = compile_one(Node::Condition(
            Condition::new("c", "has_bright", OperatorKind::Ne, json!(true)).with_switch(false),
        ));
        assert_eq!(
            match_of(&switched),
            json!({"$expr": {"$not": [{"$not": [definition]}]}})
        );
    }

    #[test]
    fn test_arithmetic_variables_inlined() {
        let pipeline = compile_one(condition("c", "scaled", OperatorKind::Gt, json!("1")));
        assert_eq!(
            match_of(&pipeline),
            json!({"$expr": {"$gt": [
                {"$divide": [{"$subtract": ["$candidate.magpsf", "$candidate.diffmaglim"]}, 2]},
                1
            ]}})
        );
        assert_eq!(
            project_of(&pipeline),
            json!({"candidate.diffmaglim": 1, "candidate.magpsf": 1, "objectId": 1})
        );
    }

    #[test]
    fn test_variable_scope_rendering() {
        let document = compile_one(condition("c", "color", OperatorKind::Gt, json!(0)));
        assert_eq!(
            match_of(&document),
            json!({"$expr": {"$gt": [{"$subtract": ["$candidate.magpsf", "$candidate.diffmaglim"]}, 0]}})
        );

        let nested = block("n", Logic::And, vec![condition("e", "color", OperatorKind::Gt, json!(0))]);
        let element = compile_one(Node::Condition(Condition::new(
            "c",
            "prv_candidates",
            OperatorKind::AnyElementTrue,
            nested,
        )));
        assert_eq!(
            match_of(&element),
            json!({"$expr": {"$anyElementTrue": {"$map": {
                "input": {"$ifNull": ["$prv_candidates", []]},
                "in": {"$gt": [{"$subtract": ["$$this.candidate.magpsf", "$$this.candidate.diffmaglim"]}, 0]}
            }}}})
        );
    }

    #[test]
    fn test_negated_named_block() {
        let negated = block(
            "n",
            Logic::And,
            vec![condition("f", "candidate.fid", OperatorKind::Eq, json!(1))],
        )
        .named("no g-band", false);
        let pipeline = context().compile(&[root(vec![
            condition("a", "candidate.magpsf", OperatorKind::Gt, json!(18)),
            Node::Block(negated),
        ])]);
        assert_eq!(
            project_of(&pipeline),
            json!({
                "candidate.magpsf": 1,
                "objectId": 1,
                "no_g_band": {"$eq": ["$candidate.fid", 1]}
            })
        );
        assert_eq!(
            match_of(&pipeline),
            json!({"$and": [{"candidate.magpsf": {"$gt": 18}}, {"no_g_band": false}]})
        );
    }

    #[test]
    fn test_negated_block_inside_element_predicate() {
        let negated = block(
            "n",
            Logic::And,
            vec![condition("e", "magpsf", OperatorKind::Lt, json!(18))],
        )
        .named("bright", false);
        let nested = block("outer", Logic::And, vec![Node::Block(negated)]);
        let pipeline = compile_one(Node::Condition(Condition::new(
            "c",
            "prv_candidates",
            OperatorKind::AllElementsTrue,
            nested,
        )));
        assert_eq!(
            match_of(&pipeline),
            json!({"$expr": {"$allElementsTrue": {"$map": {
                "input": {"$ifNull": ["$prv_candidates", []]},
                "in": {"$not": [{"$lt": ["$$this.magpsf", 18]}]}
            }}}})
        );
        assert!(project_of(&pipeline).get("bright").is_none());
    }

    #[test]
    fn test_negated_blocks_with_colliding_names_stay_distinct() {
        let g_band = block(
            "n1",
            Logic::And,
            vec![condition("f", "candidate.fid", OperatorKind::Eq, json!(1))],
        )
        .named("no g-band", false);
        let late = block(
            "n2",
            Logic::And,
            vec![condition("j", "candidate.jd", OperatorKind::Gt, json!(5))],
        )
        .named("no g band", false);
        let pipeline = compile_one(Node::Block(block(
            "wrap",
            Logic::And,
            vec![Node::Block(g_band), Node::Block(late)],
        )));
        assert_eq!(
            project_of(&pipeline),
            json!({
                "objectId": 1,
                "no_g_band": {"$eq": ["$candidate.fid", 1]},
                "no_g_band_n2": {"$gt": ["$candidate.jd", 5]}
            })
        );
        assert_eq!(
            match_of(&pipeline),
            json!({"$and": [{"no_g_band": false}, {"no_g_band_n2": false}]})
        );
    }

    #[test]
    fn test_list_variable_inside_element_predicate_projects_its_array() {
        let nested = block(
            "n",
            Logic::And,
            vec![condition("e", "has_bright", OperatorKind::Eq, json!(true))],
        );
        let pipeline = compile_one(Node::Condition(Condition::new(
            "c",
            "cross_matches",
            OperatorKind::AnyElementTrue,
            nested,
        )));
        let project = project_of(&pipeline);
        assert_eq!(project["cross_matches"], json!(1));
        assert_eq!(project["prv_candidates"], json!(1));

        let rendered = serde_json::to_string(&match_of(&pipeline)).unwrap();
        assert!(rendered.contains(r#""$ifNull":["$prv_candidates",[]]"#));
    }

    #[test]
    fn test_aggregate_inlined_in_negated_block() {
        let negated = block(
            "n",
            Logic::And,
            vec![condition("o", "offset", OperatorKind::Gt, json!(0))],
        )
        .named("off", false);
        let pipeline = compile_one(Node::Block(negated));
        assert_eq!(
            project_of(&pipeline),
            json!({
                "objectId": 1,
                "off": {"$gt": [
                    {"$subtract": [{"$min": "$prv_candidates.magpsf"}, "$candidate.magpsf"]},
                    0
                ]}
            })
        );
        assert_eq!(match_of(&pipeline), json!({"off": false}));
    }

    #[test]
    fn test_aggregate_inlined_in_element_predicate() {
        let nested = block(
            "n",
            Logic::And,
            vec![condition("o", "offset", OperatorKind::Gt, json!(0))],
        );
        let pipeline = compile_one(Node::Condition(Condition::new(
            "c",
            "cross_matches",
            OperatorKind::AllElementsTrue,
            nested,
        )));
        assert_eq!(
            match_of(&pipeline),
            json!({"$expr": {"$allElementsTrue": {"$map": {
                "input": {"$ifNull": ["$cross_matches", []]},
                "in": {"$gt": [
                    {"$subtract": [{"$min": "$prv_candidates.magpsf"}, "$$this.candidate.magpsf"]},
                    0
                ]}
            }}}})
        );
        assert_eq!(project_of(&pipeline)["prv_candidates"], json!(1));
    }

    #[test]
    fn test_root_blocks_merge_under_and() {
        let pipeline = context().compile(&[
            root(vec![condition("a", "candidate.magpsf", OperatorKind::Gt, json!(15))]),
            root(vec![condition("b", "candidate.magpsf", OperatorKind::Lt, json!(20))]),
            root(vec![condition("c", "candidate.jd", OperatorKind::Gt, json!(1))]),
        ]);
        assert_eq!(
            match_of(&pipeline),
            json!({
                "candidate.magpsf": {"$gt": 15},
                "candidate.jd": {"$gt": 1},
                "$and": [{"candidate.magpsf": {"$lt": 20}}]
            })
        );
    }

    #[test]
    fn test_projection_drops_descendants() {
        let pipeline = compile_one(Node::Block(block(
            "b",
            Logic::Or,
            vec![
                condition("a", "candidate", OperatorKind::Exists, json!(true)),
                condition("b", "candidate.magpsf", OperatorKind::Gt, json!(1)),
            ],
        )));
        assert_eq!(project_of(&pipeline), json!({"candidate": 1, "objectId": 1}));
    }

    #[test]
    fn test_compile_json_round_trip() {
        let ctx = context();
        let pipeline = ctx
            .compile_json(
                r#"{"id": "root", "logic": "AND", "children": [
                    {"category": "condition", "id": "c", "field": "candidate.magpsf",
                     "operator": "greater than", "value": "18.5"}
                ]}"#,
            )
            .unwrap();
        let json = pipeline.to_json().unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pipeline.to_value());
        assert!(pipeline.to_json_pretty().unwrap().contains('\n'));
    }

    #[test]
    fn test_scope_schema_path() {
        let scope = Scope::element_of("prv_candidates");
        assert_eq!(scope.schema_path("magpsf"), "prv_candidates.magpsf");
        assert_eq!(scope.schema_path("this"), "prv_candidates");
        assert_eq!(scope.schema_path("this.fid"), "prv_candidates.fid");
        assert_eq!(scope.schema_path("thistle"), "prv_candidates.thistle");
        assert_eq!(Scope::document().schema_path("magpsf"), "magpsf");
    }
}
