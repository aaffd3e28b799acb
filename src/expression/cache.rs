//! Parse cache for math expressions

use crate::expression::ast::ArithExpr;
use crate::expression::parser;
use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Entries kept before the cache is reset
pub const MAX_CACHED_EXPRESSIONS: usize = 4096;

/// Parsed trees keyed by source text and depth limit
static EXPRESSION_CACHE: Lazy<RwLock<AHashMap<(String, usize), ArithExpr>>> =
    Lazy::new(|| RwLock::new(AHashMap::with_capacity(256)));

/// Get or parse an expression, caching the tree
#[inline]
pub fn get_or_parse(expr: &str, max_depth: usize) -> ArithExpr {
    let key = (expr.to_string(), max_depth);
    {
        let cache = EXPRESSION_CACHE.read();
        if let Some(tree) = cache.get(&key) {
            return tree.clone();
        }
    }

    let tree = parser::parse_with_depth(expr, max_depth);
    {
        let mut cache = EXPRESSION_CACHE.write();
        if cache.len() >= MAX_CACHED_EXPRESSIONS {
            tracing::debug!(entries = cache.len(), "expression cache full, resetting");
            cache.clear();
        }
        cache.insert(key, tree.clone());
    }
    tree
}

/// Clear the expression cache
pub fn clear_cache() {
    EXPRESSION_CACHE.write().clear();
}

/// Number of cached trees
pub fn cache_size() -> usize {
    EXPRESSION_CACHE.read().len()
}
