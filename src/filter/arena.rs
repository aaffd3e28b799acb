//! Id-addressed arena for structural edits of a filter tree
//!
//! Nodes live in a flat slot vector with explicit parent/child indices, so
//! edits touch only the affected slots instead of rebuilding the whole tree.
//! Nested predicate blocks inside a condition's value stay owned by that
//! condition and are replaced through `update_condition`.

use crate::error::{FilterError, Result};
use crate::filter::operator::OperatorKind;
use crate::filter::tree::{Block, Condition, ConditionValue, Logic, Node};
use ahash::AHashMap;

#[derive(Debug, Clone)]
enum Payload {
    Block {
        logic: Logic,
        name: Option<String>,
        is_true: bool,
    },
    Condition(Condition),
}

#[derive(Debug, Clone)]
struct ArenaNode {
    id: String,
    parent: Option<usize>,
    children: Vec<usize>,
    payload: Payload,
}

/// Single-field edit applied by [`FilterArena::update_condition`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionUpdate {
    Field(Option<String>),
    Operator(Option<OperatorKind>),
    Value(ConditionValue),
    BooleanSwitch(Option<bool>),
}

/// Filter tree arena
#[derive(Debug, Clone, Default)]
pub struct FilterArena {
    slots: Vec<Option<ArenaNode>>,
    index: AHashMap<String, usize>,
    roots: Vec<usize>,
    next_id: usize,
}

impl FilterArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an arena from root blocks; nodes with empty ids get generated ones
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let mut arena = Self::new();
        for block in blocks {
            let idx = arena.insert_block(block, None);
            arena.roots.push(idx);
        }
        arena
    }

    /// Rebuild the owned tree
    pub fn to_blocks(&self) -> Vec<Block> {
        self.roots
            .iter()
            .filter_map(|&idx| match self.build(idx)? {
                Node::Block(b) => Some(b),
                Node::Condition(_) => None,
            })
            .collect()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Ids of the root blocks in order
    pub fn root_ids(&self) -> Vec<&str> {
        self.roots
            .iter()
            .filter_map(|&idx| self.slot(idx).map(|n| n.id.as_str()))
            .collect()
    }

    /// Id of the parent block, `None` for roots
    pub fn parent_id(&self, id: &str) -> Result<Option<&str>> {
        let node = self.node(id)?;
        Ok(node
            .parent
            .and_then(|p| self.slot(p))
            .map(|p| p.id.as_str()))
    }

    /// Ids of a block's children in order
    pub fn child_ids(&self, id: &str) -> Result<Vec<&str>> {
        let node = self.node(id)?;
        if !matches!(node.payload, Payload::Block { .. }) {
            return Err(FilterError::NotABlock(id.to_string()));
        }
        Ok(node
            .children
            .iter()
            .filter_map(|&c| self.slot(c).map(|n| n.id.as_str()))
            .collect())
    }

    pub fn condition(&self, id: &str) -> Option<&Condition> {
        match &self.slot(*self.index.get(id)?)?.payload {
            Payload::Condition(c) => Some(c),
            Payload::Block { .. } => None,
        }
    }

    pub fn logic(&self, id: &str) -> Option<Logic> {
        match self.slot(*self.index.get(id)?)?.payload {
            Payload::Block { logic, .. } => Some(logic),
            Payload::Condition(_) => None,
        }
    }

    /// Append a condition to a block, returning its id
    pub fn add_condition(&mut self, parent_id: &str, condition: Condition) -> Result<String> {
        let parent = self.block_index(parent_id)?;
        let idx = self.insert_condition(condition, Some(parent));
        self.attach(parent, idx);
        Ok(self.id_of(idx))
    }

    /// Append a new block holding one empty condition, returning the block id
    pub fn add_block(&mut self, parent_id: &str, logic: Logic) -> Result<String> {
        let parent = self.block_index(parent_id)?;
        let block = Block::new(String::new(), logic, vec![Node::Condition(Condition::default())]);
        let idx = self.insert_block(&block, Some(parent));
        self.attach(parent, idx);
        Ok(self.id_of(idx))
    }

    /// Append a new root block holding one empty condition
    pub fn add_root(&mut self, logic: Logic) -> String {
        let block = Block::new(String::new(), logic, vec![Node::Condition(Condition::default())]);
        let idx = self.insert_block(&block, None);
        self.roots.push(idx);
        self.id_of(idx)
    }

    pub fn update_condition(&mut self, id: &str, update: ConditionUpdate) -> Result<()> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| FilterError::NodeNotFound(id.to_string()))?;
        let condition = match self.slots.get_mut(idx).and_then(Option::as_mut) {
            Some(ArenaNode {
                payload: Payload::Condition(c),
                ..
            }) => c,
            Some(_) => return Err(FilterError::NotACondition(id.to_string())),
            None => return Err(FilterError::NodeNotFound(id.to_string())),
        };
        match update {
            ConditionUpdate::Field(field) => condition.field = field,
            ConditionUpdate::Operator(op) => condition.operator = op,
            ConditionUpdate::Value(value) => condition.value = value,
            ConditionUpdate::BooleanSwitch(switch) => condition.boolean_switch = switch,
        }
        Ok(())
    }

    pub fn set_logic(&mut self, id: &str, new_logic: Logic) -> Result<()> {
        let idx = self.block_index(id)?;
        if let Some(ArenaNode {
            payload: Payload::Block { logic, .. },
            ..
        }) = self.slots.get_mut(idx).and_then(Option::as_mut)
        {
            *logic = new_logic;
        }
        Ok(())
    }

    /// Mark a block as a saved custom block
    pub fn set_block_name(&mut self, id: &str, new_name: Option<String>, truth: bool) -> Result<()> {
        let idx = self.block_index(id)?;
        if let Some(ArenaNode {
            payload: Payload::Block { name, is_true, .. },
            ..
        }) = self.slots.get_mut(idx).and_then(Option::as_mut)
        {
            *name = new_name;
            *is_true = truth;
        }
        Ok(())
    }

    /// Remove a node and its subtree
    ///
    /// A root block never ends up empty: removing its last child leaves one
    /// default condition in its place.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| FilterError::NodeNotFound(id.to_string()))?;
        let parent = self.slot(idx).and_then(|n| n.parent);
        self.drop_subtree(idx);

        match parent {
            Some(p) => {
                let now_empty = match self.slots.get_mut(p).and_then(Option::as_mut) {
                    Some(node) => {
                        node.children.retain(|&c| c != idx);
                        node.children.is_empty()
                    }
                    None => false,
                };
                let parent_is_root = self.roots.contains(&p);
                if now_empty && parent_is_root {
                    let filler = self.insert_condition(Condition::default(), Some(p));
                    self.attach(p, filler);
                }
            }
            None => self.roots.retain(|&r| r != idx),
        }
        tracing::trace!(node = id, "removed filter node");
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn slot(&self, idx: usize) -> Option<&ArenaNode> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn node(&self, id: &str) -> Result<&ArenaNode> {
        self.index
            .get(id)
            .and_then(|&idx| self.slot(idx))
            .ok_or_else(|| FilterError::NodeNotFound(id.to_string()))
    }

    fn block_index(&self, id: &str) -> Result<usize> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| FilterError::NodeNotFound(id.to_string()))?;
        match self.slot(idx) {
            Some(ArenaNode {
                payload: Payload::Block { .. },
                ..
            }) => Ok(idx),
            _ => Err(FilterError::NotABlock(id.to_string())),
        }
    }

    fn id_of(&self, idx: usize) -> String {
        self.slot(idx).map(|n| n.id.clone()).unwrap_or_default()
    }

    fn fresh_id(&mut self, requested: &str) -> String {
        if !requested.is_empty() && !self.index.contains_key(requested) {
            return requested.to_string();
        }
        loop {
            let candidate = format!("node-{}", self.next_id);
            self.next_id += 1;
            if !self.index.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn push(&mut self, id: String, parent: Option<usize>, payload: Payload) -> usize {
        let idx = self.slots.len();
        self.index.insert(id.clone(), idx);
        self.slots.push(Some(ArenaNode {
            id,
            parent,
            children: Vec::new(),
            payload,
        }));
        idx
    }

    fn attach(&mut self, parent: usize, child: usize) {
        if let Some(node) = self.slots.get_mut(parent).and_then(Option::as_mut) {
            node.children.push(child);
        }
    }

    fn insert_condition(&mut self, mut condition: Condition, parent: Option<usize>) -> usize {
        let id = self.fresh_id(&condition.id);
        condition.id = id.clone();
        self.push(id, parent, Payload::Condition(condition))
    }

    fn insert_block(&mut self, block: &Block, parent: Option<usize>) -> usize {
        let id = self.fresh_id(&block.id);
        let idx = self.push(
            id,
            parent,
            Payload::Block {
                logic: block.logic,
                name: block.name.clone(),
                is_true: block.is_true,
            },
        );
        for child in &block.children {
            let child_idx = match child {
                Node::Block(b) => self.insert_block(b, Some(idx)),
                Node::Condition(c) => self.insert_condition(c.clone(), Some(idx)),
            };
            self.attach(idx, child_idx);
        }
        idx
    }

    fn drop_subtree(&mut self, idx: usize) {
        let Some(node) = self.slots.get_mut(idx).and_then(Option::take) else {
            return;
        };
        self.index.remove(&node.id);
        for child in node.children {
            self.drop_subtree(child);
        }
    }

    fn build(&self, idx: usize) -> Option<Node> {
        let node = self.slot(idx)?;
        match &node.payload {
            Payload::Condition(c) => Some(Node::Condition(c.clone())),
            Payload::Block {
                logic,
                name,
                is_true,
            } => Some(Node::Block(Block {
                id: node.id.clone(),
                logic: *logic,
                children: node.children.iter().filter_map(|&c| self.build(c)).collect(),
                name: name.clone(),
                is_true: *is_true,
            })),
        }
    }
}
