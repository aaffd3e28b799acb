//! Usage analysis
//!
//! One walk over the root blocks collecting everything the projection stage
//! has to materialize before the match stage can reference it.

use crate::filter::{sanitize_name, Block, Condition, ConditionValue, Node};
use crate::resolver::{FieldKind, FieldResolver};
use std::collections::BTreeSet;

/// Names referenced by a filter tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    /// Schema paths read by the match stage
    pub base_fields: BTreeSet<String>,
    pub arithmetic_variables: BTreeSet<String>,
    pub list_variables: BTreeSet<String>,
    /// Negated named blocks in document order under unique projected names
    pub negated_blocks: Vec<(String, Block)>,
}

impl Usage {
    pub fn collect(blocks: &[Block], resolver: &FieldResolver<'_>) -> Self {
        let mut usage = Usage::default();
        for block in blocks {
            usage.visit_block(block, resolver);
        }
        usage
    }

    pub fn is_empty(&self) -> bool {
        self.base_fields.is_empty()
            && self.arithmetic_variables.is_empty()
            && self.list_variables.is_empty()
            && self.negated_blocks.is_empty()
    }

    fn visit_block(&mut self, block: &Block, resolver: &FieldResolver<'_>) {
        if block.is_negated_named() {
            // The block is computed from the input document as a whole, its
            // own references need no projection.
            if let Some(name) = block.materialized_name() {
                self.add_negated(name, block);
            }
            return;
        }
        for child in &block.children {
            match child {
                Node::Block(b) => self.visit_block(b, resolver),
                Node::Condition(c) => self.visit_condition(c, resolver),
            }
        }
    }

    fn visit_condition(&mut self, condition: &Condition, resolver: &FieldResolver<'_>) {
        if !condition.is_complete() {
            return;
        }
        let Some(field) = condition.field_name() else {
            return;
        };

        match resolver.classify(field) {
            FieldKind::List(..) => self.add_list(field, resolver),
            FieldKind::Arithmetic(_) => {
                self.arithmetic_variables.insert(field.to_string());
                let deps = resolver.transitive_dependencies(field);
                self.base_fields.extend(deps.base_fields);
                for list in deps.list_variables {
                    self.add_list(&list, resolver);
                }
            }
            FieldKind::Base => {
                self.base_fields.insert(field.to_string());
            }
        }

        if let ConditionValue::List(descriptor) = &condition.value {
            let array = descriptor.field.trim();
            if !array.is_empty() {
                self.base_fields.insert(array.to_string());
            }
        }
        self.visit_element_value(&condition.value, resolver);
    }

    /// Walk an element predicate
    ///
    /// Element fields are read through the projected array, but list
    /// variables are inlined with their array read from the document root.
    fn visit_element_value(&mut self, value: &ConditionValue, resolver: &FieldResolver<'_>) {
        match value {
            ConditionValue::Nested(block) => self.visit_element_block(block, resolver),
            ConditionValue::List(descriptor) => self.visit_element_value(&descriptor.value, resolver),
            ConditionValue::Literal(_) => {}
        }
    }

    fn visit_element_block(&mut self, block: &Block, resolver: &FieldResolver<'_>) {
        for child in &block.children {
            match child {
                Node::Block(b) => self.visit_element_block(b, resolver),
                Node::Condition(c) => {
                    let Some(field) = c.field_name().filter(|_| c.is_complete()) else {
                        continue;
                    };
                    match resolver.classify(field) {
                        FieldKind::List(..) => self.add_list(field, resolver),
                        FieldKind::Arithmetic(_) => {
                            for list in resolver.transitive_dependencies(field).list_variables {
                                self.add_list(&list, resolver);
                            }
                        }
                        FieldKind::Base => {}
                    }
                    self.visit_element_value(&c.value, resolver);
                }
            }
        }
    }

    fn add_list(&mut self, name: &str, resolver: &FieldResolver<'_>) {
        if !self.list_variables.insert(name.to_string()) {
            return;
        }
        if let Some(list) = resolver.catalog().list(name) {
            let array = list.list_condition.field.trim();
            if !array.is_empty() {
                self.base_fields.insert(array.to_string());
            }
            self.visit_element_value(&list.list_condition.value, resolver);
        }
    }

    /// Register a negated block; a different block whose name sanitizes to a
    /// taken name gets its id appended
    fn add_negated(&mut self, name: String, block: &Block) {
        if self.negated_blocks.iter().any(|(_, b)| b == block) {
            return;
        }
        let taken = |usage: &Self, candidate: &str| usage.negated_blocks.iter().any(|(n, _)| n == candidate);

        let mut unique = name.clone();
        let mut suffix = 1;
        while taken(self, &unique) {
            unique = match suffix {
                1 => format!("{}_{}", name, sanitize_name(&block.id)),
                n => format!("{}_{}_{}", name, sanitize_name(&block.id), n),
            };
            suffix += 1;
        }
        if unique != name {
            tracing::debug!(block = %block.id, name = %unique, "negated block name already taken");
        }
        self.negated_blocks.push((unique, block.clone()));
    }
}
