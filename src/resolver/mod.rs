//! Field classification and type resolution
//!
//! A name in a condition is either a schema path, a saved arithmetic
//! variable or a saved list variable. The resolver decides which, what
//! semantic type it has, which operators apply to it and which base fields it
//! ultimately depends on.

use crate::config::{
    ArithmeticVariable, AvroType, Catalog, CompilerConfig, FieldType, ListShape, ListVariable,
    Schema, SchemaNode,
};
use crate::expression::{cache, parse_with_depth, ArithExpr};
use crate::filter::OperatorKind;
use ahash::AHashSet;
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Operator set of a field
pub type OperatorSet = SmallVec<[OperatorKind; 16]>;

/// What a field name refers to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind<'a> {
    Base,
    Arithmetic(&'a ArithmeticVariable),
    List(&'a ListVariable, ListShape),
}

/// Base fields and list variables an expression needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub base_fields: BTreeSet<String>,
    pub list_variables: BTreeSet<String>,
}

const NUMBER_OPERATORS: [OperatorKind; 10] = [
    OperatorKind::Eq,
    OperatorKind::Ne,
    OperatorKind::Gt,
    OperatorKind::Gte,
    OperatorKind::Lt,
    OperatorKind::Lte,
    OperatorKind::In,
    OperatorKind::Nin,
    OperatorKind::Between,
    OperatorKind::NotBetween,
];

const STRING_OPERATORS: [OperatorKind; 8] = [
    OperatorKind::Eq,
    OperatorKind::Ne,
    OperatorKind::Regex,
    OperatorKind::Contains,
    OperatorKind::StartsWith,
    OperatorKind::EndsWith,
    OperatorKind::In,
    OperatorKind::Nin,
];

const BOOLEAN_OPERATORS: [OperatorKind; 2] = [OperatorKind::Eq, OperatorKind::Ne];

const ARRAY_OPERATORS: [OperatorKind; 11] = [
    OperatorKind::In,
    OperatorKind::Nin,
    OperatorKind::AnyElementTrue,
    OperatorKind::AllElementsTrue,
    OperatorKind::Filter,
    OperatorKind::LengthGt,
    OperatorKind::LengthLt,
    OperatorKind::Min,
    OperatorKind::Max,
    OperatorKind::Avg,
    OperatorKind::Sum,
];

const COMMON_OPERATORS: [OperatorKind; 2] = [OperatorKind::Exists, OperatorKind::IsNumber];

/// Resolves names against a schema and a variable catalog
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'a> {
    schema: &'a Schema,
    catalog: &'a Catalog,
}

impl<'a> FieldResolver<'a> {
    pub fn new(schema: &'a Schema, catalog: &'a Catalog) -> Self {
        Self { schema, catalog }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// List variables shadow arithmetic variables, which shadow schema paths
    pub fn classify(&self, name: &str) -> FieldKind<'a> {
        if let Some(list) = self.catalog.list(name) {
            match list.shape() {
                Some(shape) => return FieldKind::List(list, shape),
                None => tracing::debug!(name, "list variable without list operator"),
            }
        }
        if let Some(variable) = self.catalog.arithmetic(name) {
            return FieldKind::Arithmetic(variable);
        }
        FieldKind::Base
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        match self.classify(name) {
            FieldKind::Arithmetic(_) => Some(FieldType::Number),
            FieldKind::List(_, ListShape::Aggregate) => Some(FieldType::Number),
            FieldKind::List(_, ListShape::Filter) => Some(FieldType::Array),
            FieldKind::List(_, ListShape::Quantifier) => Some(FieldType::Boolean),
            FieldKind::Base => self.base_type(name),
        }
    }

    /// Type of a schema path
    ///
    /// Unions take their first non-null branch and named types are followed.
    /// A record reached through an array is an array.
    pub fn base_type(&self, path: &str) -> Option<FieldType> {
        let mut fields = self.schema.fields.as_slice();
        let mut through_array = false;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let field = fields.iter().find(|f| f.name == segment)?;
            let mut ty = self.schema.resolve(&field.field_type);
            if segments.peek().is_none() {
                return leaf_type(ty, through_array);
            }
            if let Some(items) = ty.as_node().and_then(SchemaNode::array_items) {
                through_array = true;
                ty = self.schema.resolve(items);
            }
            fields = ty.as_node().and_then(SchemaNode::record_fields)?;
        }
        None
    }

    /// Operators legal for a field; empty when its type is unknown
    pub fn operators_for_field(&self, name: &str) -> OperatorSet {
        let specific: &[OperatorKind] = match self.field_type(name) {
            None => return OperatorSet::new(),
            Some(FieldType::Number) => &NUMBER_OPERATORS,
            Some(FieldType::String) => &STRING_OPERATORS,
            Some(FieldType::Boolean) => &BOOLEAN_OPERATORS,
            Some(FieldType::Array) => &ARRAY_OPERATORS,
            Some(FieldType::Object) => &[],
        };
        specific.iter().chain(COMMON_OPERATORS.iter()).copied().collect()
    }

    pub fn is_operator_allowed(&self, name: &str, op: OperatorKind) -> bool {
        self.operators_for_field(name).contains(&op)
    }

    /// Base fields and list variables a name depends on, through any chain of
    /// arithmetic variables; cycles are cut
    pub fn transitive_dependencies(&self, name: &str) -> Dependencies {
        let mut deps = Dependencies::default();
        let mut visited = AHashSet::new();
        self.collect_dependencies(name, &mut deps, &mut visited);
        deps
    }

    fn collect_dependencies(
        &self,
        name: &str,
        deps: &mut Dependencies,
        visited: &mut AHashSet<String>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        match self.classify(name) {
            FieldKind::List(..) => {
                deps.list_variables.insert(name.to_string());
            }
            FieldKind::Arithmetic(variable) => {
                for dep in variable.dependencies() {
                    self.collect_dependencies(&dep, deps, visited);
                }
            }
            FieldKind::Base => {
                deps.base_fields.insert(name.to_string());
            }
        }
    }

    /// Parsed tree of an arithmetic variable with referenced arithmetic
    /// variables inlined
    ///
    /// A reference back into the chain being expanded stays a plain field.
    /// `None` when the name is not an arithmetic variable or its equation has
    /// no usable right-hand side.
    pub fn expand_arithmetic(&self, name: &str, config: &CompilerConfig) -> Option<ArithExpr> {
        let mut active = Vec::new();
        self.expand_inner(name, config, &mut active)
    }

    fn expand_inner(
        &self,
        name: &str,
        config: &CompilerConfig,
        active: &mut Vec<String>,
    ) -> Option<ArithExpr> {
        let expr = self.catalog.arithmetic(name)?.expression()?;
        let tree = if config.use_parse_cache {
            cache::get_or_parse(expr, config.max_parse_depth)
        } else {
            parse_with_depth(expr, config.max_parse_depth)
        };

        active.push(name.to_string());
        let expanded = tree.substitute(&mut |leaf| {
            if active.iter().any(|a| a == leaf) {
                tracing::debug!(variable = leaf, "cyclic variable reference left unexpanded");
                return None;
            }
            match self.classify(leaf) {
                FieldKind::Arithmetic(_) => self.expand_inner(leaf, config, active),
                _ => None,
            }
        });
        active.pop();
        Some(expanded)
    }
}

fn leaf_type(ty: &AvroType, through_array: bool) -> Option<FieldType> {
    match ty {
        AvroType::Name(name) => FieldType::from_primitive(name),
        AvroType::Union(_) => None,
        AvroType::Node(node) => match node.kind.as_str() {
            "array" => Some(FieldType::Array),
            "record" if through_array => Some(FieldType::Array),
            "record" => Some(FieldType::Object),
            other => FieldType::from_primitive(other),
        },
    }
}
