//! Saved arithmetic and list variables

use crate::config::schema::Schema;
use crate::error::{FilterError, Result};
use crate::expression::extract_field_dependencies;
use crate::filter::{ListConditionDescriptor, OperatorKind};
use ahash::{AHashMap, AHashSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LIST_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\s-]+$").expect("static regex"));

static VARIABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("static regex"));

/// Named math expression, stored as `name = expression`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArithmeticVariable {
    pub name: String,
    pub variable: String,
}

impl ArithmeticVariable {
    /// Validate an equation typed by the user and build the variable from it
    pub fn from_equation(equation: &str) -> Result<Self> {
        let parts: Vec<&str> = equation.split('=').map(str::trim).collect();
        let [name, expr] = parts.as_slice() else {
            return Err(FilterError::InvalidVariable(format!(
                "equation must contain exactly one '=': {}",
                equation
            )));
        };
        if name.is_empty() || expr.is_empty() {
            return Err(FilterError::InvalidVariable(format!(
                "both sides of the equation must be non-empty: {}",
                equation
            )));
        }
        if !VARIABLE_NAME.is_match(name) {
            return Err(FilterError::InvalidVariable(format!(
                "invalid variable name: {}",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            variable: format!("{} = {}", name, expr),
        })
    }

    /// Right-hand side of the stored equation
    ///
    /// A string without `=` is the expression itself. More than one `=`, or an
    /// empty side, yields `None`.
    pub fn expression(&self) -> Option<&str> {
        let parts: Vec<&str> = self.variable.split('=').map(str::trim).collect();
        match parts.as_slice() {
            [whole] if !whole.is_empty() => Some(*whole),
            [lhs, rhs] if !lhs.is_empty() && !rhs.is_empty() => Some(*rhs),
            _ => None,
        }
    }

    /// Direct identifiers of the expression
    pub fn dependencies(&self) -> Vec<String> {
        self.expression()
            .map(extract_field_dependencies)
            .unwrap_or_default()
    }
}

/// How a list variable is consumed by the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListShape {
    /// `anyElementTrue`/`allElementsTrue`, substituted inline as a boolean
    Quantifier,
    /// `filter`, materialized as an array
    Filter,
    /// `min`/`max`/`avg`/`sum`, materialized as a number
    Aggregate,
}

impl ListShape {
    pub fn of(op: OperatorKind) -> Option<Self> {
        match op {
            OperatorKind::AnyElementTrue | OperatorKind::AllElementsTrue => {
                Some(ListShape::Quantifier)
            }
            OperatorKind::Filter => Some(ListShape::Filter),
            op if op.is_aggregation() => Some(ListShape::Aggregate),
            _ => None,
        }
    }

    /// Materialized in the projection stage
    pub fn is_materialized(self) -> bool {
        !matches!(self, ListShape::Quantifier)
    }
}

/// Named array predicate or aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListVariable {
    pub name: String,
    #[serde(rename = "listCondition")]
    pub list_condition: ListConditionDescriptor,
}

impl ListVariable {
    pub fn new(name: impl Into<String>, list_condition: ListConditionDescriptor) -> Self {
        Self {
            name: name.into(),
            list_condition,
        }
    }

    pub fn shape(&self) -> Option<ListShape> {
        self.list_condition.operator.and_then(ListShape::of)
    }

    /// Checks applied when the variable is saved
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        let invalid = |msg: String| Err(FilterError::InvalidListVariable(msg));

        let len = name.chars().count();
        if len < 3 {
            return invalid(format!("name must be at least 3 characters: {:?}", name));
        }
        if len > 50 {
            return invalid(format!("name must be at most 50 characters: {:?}", name));
        }
        if !LIST_NAME.is_match(name) {
            return invalid(format!(
                "name may only contain letters, digits, spaces, '_' and '-': {:?}",
                name
            ));
        }
        if self.list_condition.field.trim().is_empty() {
            return invalid(format!("{} has no array field", name));
        }
        let Some(op) = self.list_condition.operator else {
            return invalid(format!("{} has no operator", name));
        };
        if !op.is_list_operator() {
            return invalid(format!("{} uses non-list operator {}", name, op));
        }
        if op.is_aggregation() && self.list_condition.sub_field().is_none() {
            return invalid(format!("{} needs a sub-field for {}", name, op));
        }
        if op.is_list_predicate()
            && self
                .list_condition
                .value
                .nested()
                .map_or(true, |block| block.children.is_empty())
        {
            return invalid(format!("{} needs at least one element condition", name));
        }
        Ok(())
    }
}

/// Saved variables available to a compilation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "RawCatalog")]
pub struct Catalog {
    #[serde(rename = "arithmeticVariables")]
    arithmetic: Vec<ArithmeticVariable>,
    #[serde(rename = "listVariables")]
    lists: Vec<ListVariable>,
    #[serde(skip)]
    arithmetic_index: AHashMap<String, usize>,
    #[serde(skip)]
    list_index: AHashMap<String, usize>,
}

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(default, rename = "arithmeticVariables", alias = "variables")]
    arithmetic: Vec<ArithmeticVariable>,
    #[serde(default, rename = "listVariables")]
    lists: Vec<ListVariable>,
}

impl From<RawCatalog> for Catalog {
    fn from(raw: RawCatalog) -> Self {
        Catalog::new(raw.arithmetic, raw.lists)
    }
}

impl Catalog {
    pub fn new(arithmetic: Vec<ArithmeticVariable>, lists: Vec<ListVariable>) -> Self {
        let mut catalog = Self {
            arithmetic,
            lists,
            ..Default::default()
        };
        catalog.reindex();
        catalog
    }

    /// Rebuild name lookups; the first definition of a name wins
    fn reindex(&mut self) {
        self.arithmetic_index.clear();
        self.list_index.clear();
        for (i, v) in self.arithmetic.iter().enumerate() {
            self.arithmetic_index.entry(v.name.trim().to_string()).or_insert(i);
        }
        for (i, v) in self.lists.iter().enumerate() {
            self.list_index.entry(v.name.trim().to_string()).or_insert(i);
        }
    }

    pub fn arithmetic(&self, name: &str) -> Option<&ArithmeticVariable> {
        self.arithmetic_index
            .get(name)
            .and_then(|&i| self.arithmetic.get(i))
    }

    pub fn list(&self, name: &str) -> Option<&ListVariable> {
        self.list_index.get(name).and_then(|&i| self.lists.get(i))
    }

    pub fn arithmetic_variables(&self) -> &[ArithmeticVariable] {
        &self.arithmetic
    }

    pub fn list_variables(&self) -> &[ListVariable] {
        &self.lists
    }

    pub fn add_arithmetic(&mut self, variable: ArithmeticVariable) {
        self.arithmetic.push(variable);
        self.reindex();
    }

    pub fn add_list(&mut self, variable: ListVariable) {
        self.lists.push(variable);
        self.reindex();
    }

    /// Consistency against a schema
    ///
    /// List variables must pass their own checks and must not shadow a schema
    /// field; arithmetic variables must not reference themselves.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for list in &self.lists {
            list.validate()?;
            let name = list.name.trim();
            if schema.type_at_path(name).is_some() {
                return Err(FilterError::NameCollision(name.to_string()));
            }
        }
        for variable in &self.arithmetic {
            if variable.expression().is_none() {
                return Err(FilterError::InvalidVariable(format!(
                    "{} has no expression: {:?}",
                    variable.name, variable.variable
                )));
            }
            self.check_cycle(&variable.name)?;
        }
        Ok(())
    }

    fn check_cycle(&self, root: &str) -> Result<()> {
        let mut stack = vec![root.to_string()];
        let mut visited = AHashSet::new();
        while let Some(name) = stack.pop() {
            let Some(variable) = self.arithmetic(&name) else {
                continue;
            };
            for dep in variable.dependencies() {
                if dep == root {
                    return Err(FilterError::CyclicVariable(root.to_string()));
                }
                if visited.insert(dep.clone()) {
                    stack.push(dep);
                }
            }
        }
        Ok(())
    }
}
