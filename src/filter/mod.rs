//! Filter tree model
//!
//! Blocks, conditions and the operator vocabulary the editor produces, plus an
//! arena for id-addressed structural edits.

pub mod arena;
mod operator;
mod tree;

pub use arena::{ConditionUpdate, FilterArena};
pub use operator::*;
pub use tree::*;
