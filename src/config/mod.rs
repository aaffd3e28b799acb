//! Input model and compiler options
//!
//! Everything the compiler consumes arrives as JSON produced by the filter
//! editor: the filter tree, the schema descriptor and the saved variables.

mod schema;
mod variable;

pub use schema::*;
pub use variable::*;

use crate::error::Result;
use crate::filter::Block;
use serde::{Deserialize, Serialize};

/// Compiler options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Recursion limit of the expression parser
    pub max_parse_depth: usize,
    /// Fields projected whenever a projection stage is emitted
    pub always_project: Vec<String>,
    /// `$options` attached to regex-style matches
    pub regex_options: String,
    /// Memoize parsed expressions across compilations
    pub use_parse_cache: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_parse_depth: crate::expression::DEFAULT_MAX_DEPTH,
            always_project: vec!["objectId".to_string()],
            regex_options: "i".to_string(),
            use_parse_cache: true,
        }
    }
}

impl CompilerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Root blocks of a filter, as a single block or an array of blocks
pub fn load_filters(json: &str) -> Result<Vec<Block>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Roots {
        Many(Vec<Block>),
        One(Block),
    }

    Ok(match serde_json::from_str(json)? {
        Roots::Many(blocks) => blocks,
        Roots::One(block) => vec![block],
    })
}

/// Parse and structurally validate a schema descriptor
pub fn load_schema(json: &str) -> Result<Schema> {
    let schema: Schema = serde_json::from_str(json)?;
    schema.validate()?;
    Ok(schema)
}

/// Parse saved variables
pub fn load_catalog(json: &str) -> Result<Catalog> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;

    #[test]
    fn test_config_defaults() {
        let config = CompilerConfig::from_json("{}").unwrap();
        assert_eq!(config, CompilerConfig::default());
        assert_eq!(config.max_parse_depth, 10);
        assert_eq!(config.always_project, vec!["objectId".to_string()]);
    }

    #[test]
    fn test_config_override() {
        let config =
            CompilerConfig::from_json(r#"{"max_parse_depth": 4, "always_project": []}"#).unwrap();
        assert_eq!(config.max_parse_depth, 4);
        assert!(config.always_project.is_empty());
        assert_eq!(config.regex_options, "i");
    }

    #[test]
    fn test_load_filters_single_or_many() {
        let one = load_filters(r#"{"id": "r", "logic": "And", "children": []}"#).unwrap();
        assert_eq!(one.len(), 1);
        let many = load_filters(
            r#"[{"id": "a", "logic": "And", "children": []},
                {"id": "b", "logic": "Or", "children": []}]"#,
        )
        .unwrap();
        assert_eq!(many.len(), 2);
        assert!(matches!(
            load_filters("not json"),
            Err(FilterError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_load_schema_validates() {
        let err = load_schema(r#"{"type": "record", "fields": [{"name": "a", "type": {"type": "record"}}]}"#);
        assert!(matches!(err, Err(FilterError::InvalidSchema(_))));
        assert!(load_schema(r#"{"type": "record", "fields": [{"name": "a", "type": "int"}]}"#).is_ok());
    }
}
