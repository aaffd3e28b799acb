//! Operator vocabulary shared by conditions, list variables and the compiler

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Condition operators
///
/// The wire names (`as_str`) are part of the contract with the pipeline
/// executor and are emitted verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperatorKind {
    /// Equal (`$eq`)
    Eq,
    /// Not equal (`$ne`)
    Ne,
    /// Greater than (`$gt`)
    Gt,
    /// Greater than or equal (`$gte`)
    Gte,
    /// Less than (`$lt`)
    Lt,
    /// Less than or equal (`$lte`)
    Lte,
    /// Value is one of (`$in`)
    In,
    /// Value is none of (`$nin`)
    Nin,
    /// Raw regular expression, case-insensitive (`$regex`)
    Regex,
    /// Escaped substring match (`$contains`)
    Contains,
    /// Escaped prefix match (`$startsWith`)
    StartsWith,
    /// Escaped suffix match (`$endsWith`)
    EndsWith,
    /// Field presence (`$exists`)
    Exists,
    /// Numeric type check (`$isNumber`)
    IsNumber,
    /// Inclusive range (`$between`)
    Between,
    /// Outside inclusive range (`$notBetween`)
    NotBetween,
    /// Array has more than n elements (`$lengthGt`)
    LengthGt,
    /// Array has fewer than n elements (`$lengthLt`)
    LengthLt,
    /// Some element satisfies the nested predicate (`$anyElementTrue`)
    AnyElementTrue,
    /// Every element satisfies the nested predicate (`$allElementsTrue`)
    AllElementsTrue,
    /// Elements satisfying the nested predicate (`$filter`)
    Filter,
    /// Minimum over an array sub-field (`$min`)
    Min,
    /// Maximum over an array sub-field (`$max`)
    Max,
    /// Average over an array sub-field (`$avg`)
    Avg,
    /// Sum over an array sub-field (`$sum`)
    Sum,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 25] = [
        OperatorKind::Eq,
        OperatorKind::Ne,
        OperatorKind::Gt,
        OperatorKind::Gte,
        OperatorKind::Lt,
        OperatorKind::Lte,
        OperatorKind::In,
        OperatorKind::Nin,
        OperatorKind::Regex,
        OperatorKind::Contains,
        OperatorKind::StartsWith,
        OperatorKind::EndsWith,
        OperatorKind::Exists,
        OperatorKind::IsNumber,
        OperatorKind::Between,
        OperatorKind::NotBetween,
        OperatorKind::LengthGt,
        OperatorKind::LengthLt,
        OperatorKind::AnyElementTrue,
        OperatorKind::AllElementsTrue,
        OperatorKind::Filter,
        OperatorKind::Min,
        OperatorKind::Max,
        OperatorKind::Avg,
        OperatorKind::Sum,
    ];

    /// Wire name of the operator
    pub fn as_str(self) -> &'static str {
        match self {
            OperatorKind::Eq => "$eq",
            OperatorKind::Ne => "$ne",
            OperatorKind::Gt => "$gt",
            OperatorKind::Gte => "$gte",
            OperatorKind::Lt => "$lt",
            OperatorKind::Lte => "$lte",
            OperatorKind::In => "$in",
            OperatorKind::Nin => "$nin",
            OperatorKind::Regex => "$regex",
            OperatorKind::Contains => "$contains",
            OperatorKind::StartsWith => "$startsWith",
            OperatorKind::EndsWith => "$endsWith",
            OperatorKind::Exists => "$exists",
            OperatorKind::IsNumber => "$isNumber",
            OperatorKind::Between => "$between",
            OperatorKind::NotBetween => "$notBetween",
            OperatorKind::LengthGt => "$lengthGt",
            OperatorKind::LengthLt => "$lengthLt",
            OperatorKind::AnyElementTrue => "$anyElementTrue",
            OperatorKind::AllElementsTrue => "$allElementsTrue",
            OperatorKind::Filter => "$filter",
            OperatorKind::Min => "$min",
            OperatorKind::Max => "$max",
            OperatorKind::Avg => "$avg",
            OperatorKind::Sum => "$sum",
        }
    }

    /// Parse a wire name or one of the editor's human-readable aliases
    pub fn parse(raw: &str) -> Option<Self> {
        let op = match raw.trim() {
            "$eq" | "equals" | "=" | "==" => OperatorKind::Eq,
            "$ne" | "not equals" | "!=" => OperatorKind::Ne,
            "$gt" | "greater than" | ">" => OperatorKind::Gt,
            "$gte" | "greater than or equal" | ">=" => OperatorKind::Gte,
            "$lt" | "less than" | "<" => OperatorKind::Lt,
            "$lte" | "less than or equal" | "<=" => OperatorKind::Lte,
            "$in" | "in" => OperatorKind::In,
            "$nin" | "not in" => OperatorKind::Nin,
            "$regex" | "regex" => OperatorKind::Regex,
            "$contains" | "contains" | "like" => OperatorKind::Contains,
            "$startsWith" | "starts with" => OperatorKind::StartsWith,
            "$endsWith" | "ends with" => OperatorKind::EndsWith,
            "$exists" | "exists" => OperatorKind::Exists,
            "$isNumber" | "is number" => OperatorKind::IsNumber,
            "$between" | "between" => OperatorKind::Between,
            "$notBetween" | "not between" => OperatorKind::NotBetween,
            "$lengthGt" | "length greater than" => OperatorKind::LengthGt,
            "$lengthLt" | "length less than" => OperatorKind::LengthLt,
            "$anyElementTrue" | "anyTrue" => OperatorKind::AnyElementTrue,
            "$allElementsTrue" | "allTrue" => OperatorKind::AllElementsTrue,
            "$filter" | "filter" => OperatorKind::Filter,
            "$min" | "min" => OperatorKind::Min,
            "$max" | "max" => OperatorKind::Max,
            "$avg" | "avg" => OperatorKind::Avg,
            "$sum" | "sum" => OperatorKind::Sum,
            _ => return None,
        };
        Some(op)
    }

    /// `$eq`..`$lte`
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            OperatorKind::Eq
                | OperatorKind::Ne
                | OperatorKind::Gt
                | OperatorKind::Gte
                | OperatorKind::Lt
                | OperatorKind::Lte
        )
    }

    /// Operators that evaluate a nested predicate per array element
    pub fn is_list_predicate(self) -> bool {
        matches!(
            self,
            OperatorKind::AnyElementTrue | OperatorKind::AllElementsTrue | OperatorKind::Filter
        )
    }

    /// Operators that reduce an array sub-field to a number
    pub fn is_aggregation(self) -> bool {
        matches!(
            self,
            OperatorKind::Min | OperatorKind::Max | OperatorKind::Avg | OperatorKind::Sum
        )
    }

    /// Operators a list variable may be defined with
    pub fn is_list_operator(self) -> bool {
        self.is_list_predicate() || self.is_aggregation()
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OperatorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperatorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OperatorKind::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown operator: {}", raw)))
    }
}

/// Deserialize an optional operator, mapping unknown or non-string values to `None`
///
/// Trees arrive mid-edit, so an operator the compiler does not know must make
/// the condition incomplete rather than fail the whole document.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<OperatorKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(OperatorKind::parse))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for op in OperatorKind::ALL {
            assert_eq!(OperatorKind::parse(op.as_str()), Some(op), "{}", op);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(OperatorKind::parse("greater than"), Some(OperatorKind::Gt));
        assert_eq!(OperatorKind::parse("<="), Some(OperatorKind::Lte));
        assert_eq!(OperatorKind::parse("not in"), Some(OperatorKind::Nin));
        assert_eq!(OperatorKind::parse("like"), Some(OperatorKind::Contains));
        assert_eq!(OperatorKind::parse("$round"), None);
    }

    #[test]
    fn test_classification() {
        assert!(OperatorKind::Gte.is_comparison());
        assert!(!OperatorKind::In.is_comparison());
        assert!(OperatorKind::Filter.is_list_predicate());
        assert!(OperatorKind::Avg.is_aggregation());
        assert!(OperatorKind::Sum.is_list_operator());
        assert!(!OperatorKind::LengthGt.is_list_operator());
    }

    #[test]
    fn test_lenient_deserialize() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default, deserialize_with = "deserialize_lenient")]
            op: Option<OperatorKind>,
        }

        let h: Holder = serde_json::from_str(r#"{"op": "$gt"}"#).unwrap();
        assert_eq!(h.op, Some(OperatorKind::Gt));
        let h: Holder = serde_json::from_str(r#"{"op": "$type"}"#).unwrap();
        assert_eq!(h.op, None);
        let h: Holder = serde_json::from_str(r#"{"op": 3}"#).unwrap();
        assert_eq!(h.op, None);
        let h: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(h.op, None);
    }
}
