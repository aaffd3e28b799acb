//! Projection stage

use super::list::ListQuery;
use super::usage::Usage;
use super::value::array_input;
use super::{Compiler, Scope};
use crate::config::ListShape;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

impl Compiler<'_> {
    /// Build the projection and record what it materializes
    ///
    /// The match stage only references materialized names recorded here, so
    /// both stages always agree.
    pub(crate) fn project_stage(&mut self, usage: &Usage) -> Option<Map<String, Value>> {
        if usage.is_empty() {
            return None;
        }
        let config = self.config;
        let mut projection = Map::new();

        let paths: BTreeSet<&str> = usage
            .base_fields
            .iter()
            .chain(config.always_project.iter())
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        for path in &paths {
            if has_projected_ancestor(path, &paths) {
                continue;
            }
            projection.insert(path.to_string(), Value::from(1));
        }

        for name in &usage.list_variables {
            let Some(variable) = self.resolver.catalog().list(name) else {
                continue;
            };
            let Some(query) =
                ListQuery::from_descriptor(&variable.list_condition, None, Scope::document())
            else {
                continue;
            };
            let expr = match variable.shape() {
                Some(ListShape::Filter) => self
                    .filter_expr(&query)
                    .unwrap_or_else(|| array_input(query.reference.as_str())),
                Some(ListShape::Aggregate) => self.aggregate_expr(&query),
                _ => continue,
            };
            projection.insert(name.clone(), expr);
            self.projected_lists.insert(name.clone());
        }

        for (name, block) in &usage.negated_blocks {
            match self.expr_children(block, Scope::document()) {
                Some(expr) => {
                    projection.insert(name.clone(), expr);
                    self.projected_blocks.push((name.clone(), block.clone()));
                }
                None => tracing::debug!(block = %name, "negated block compiles to nothing"),
            }
        }

        (!projection.is_empty()).then_some(projection)
    }
}

fn has_projected_ancestor(path: &str, paths: &BTreeSet<&str>) -> bool {
    path.match_indices('.').any(|(i, _)| paths.contains(&path[..i]))
}
