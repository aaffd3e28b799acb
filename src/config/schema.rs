//! Avro-style schema descriptor
//!
//! Fields may be primitives, nullable unions (`["null", T]`), records, arrays
//! or references to a named type defined elsewhere in the schema.

use crate::error::{FilterError, Result};
use serde::{Deserialize, Serialize};

/// Semantic type of a field as seen by the filter builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    /// Map an Avro primitive name
    pub fn from_primitive(name: &str) -> Option<Self> {
        match name {
            "double" | "float" | "int" | "long" => Some(FieldType::Number),
            "string" | "bytes" | "enum" => Some(FieldType::String),
            "boolean" => Some(FieldType::Boolean),
            _ => None,
        }
    }
}

fn default_record() -> String {
    "record".to_string()
}

/// Root schema record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type", default = "default_record")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            kind: default_record(),
            name: None,
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: AvroType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Type position of a field or array item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AvroType {
    /// Primitive or named-type reference
    Name(String),
    Union(Vec<AvroType>),
    Node(Box<SchemaNode>),
}

/// Complex type (`record`, `array`, or a primitive spelled as an object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<SchemaField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<AvroType>,
}

impl SchemaNode {
    pub fn record_fields(&self) -> Option<&[SchemaField]> {
        (self.kind == "record").then_some(self.fields.as_deref()).flatten()
    }

    pub fn array_items(&self) -> Option<&AvroType> {
        (self.kind == "array").then_some(self.items.as_ref()).flatten()
    }
}

impl AvroType {
    /// First non-null branch of a union, or the type itself
    pub fn non_null(&self) -> &AvroType {
        match self {
            AvroType::Union(branches) => branches
                .iter()
                .find(|b| !matches!(b, AvroType::Name(n) if n == "null"))
                .or_else(|| branches.first())
                .unwrap_or(self),
            other => other,
        }
    }

    pub fn as_node(&self) -> Option<&SchemaNode> {
        match self {
            AvroType::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Shallow type, without resolving named references
    ///
    /// Unknown names are treated as strings.
    pub fn simple_type(&self) -> FieldType {
        match self.non_null() {
            AvroType::Name(name) => FieldType::from_primitive(name).unwrap_or(FieldType::String),
            AvroType::Union(_) => FieldType::String,
            AvroType::Node(node) => match node.kind.as_str() {
                "array" => FieldType::Array,
                "record" => FieldType::Object,
                other => FieldType::from_primitive(other).unwrap_or(FieldType::String),
            },
        }
    }
}

/// Autocomplete entry produced by [`Schema::flatten`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOption {
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<FieldType>,
    /// Containing array of a cross-match entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_array: Option<String>,
    /// Record array whose element fields are offered separately
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_expandable_array: bool,
}

impl FieldOption {
    fn new(label: String, field_type: FieldType, group: Option<String>) -> Self {
        Self {
            label,
            field_type,
            group,
            item_type: None,
            parent_array: None,
            is_expandable_array: false,
        }
    }
}

fn group_of(parent_path: &str) -> String {
    match parent_path.split('.').next() {
        Some(head) if !head.is_empty() => head.to_string(),
        _ => "Simple".to_string(),
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

impl Schema {
    pub fn from_fields(fields: Vec<SchemaField>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    /// Structural check of the descriptor
    pub fn validate(&self) -> Result<()> {
        if self.kind != "record" {
            return Err(FilterError::InvalidSchema(format!(
                "root must be a record, got {}",
                self.kind
            )));
        }
        for field in &self.fields {
            validate_field(field)?;
        }
        Ok(())
    }

    /// Top-level field by name
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Named record or array type defined anywhere in the schema
    pub fn find_named(&self, type_name: &str) -> Option<&SchemaNode> {
        find_named_in(&self.fields, type_name)
    }

    /// Follow a named reference to its definition
    pub fn resolve<'a>(&'a self, ty: &'a AvroType) -> &'a AvroType {
        match ty.non_null() {
            AvroType::Name(name) if FieldType::from_primitive(name).is_none() => {
                match self.find_named_type(name) {
                    Some(found) => found,
                    None => ty.non_null(),
                }
            }
            other => other,
        }
    }

    fn find_named_type(&self, type_name: &str) -> Option<&AvroType> {
        find_named_type_in(&self.fields, type_name)
    }

    /// Flatten into autocomplete options
    ///
    /// Records become dotted paths. Arrays of records whose fields are unions
    /// (cross-match style) expand into one `array.catalog` entry per field;
    /// other record arrays and primitive arrays appear as a single entry.
    pub fn flatten(&self) -> Vec<FieldOption> {
        let mut out = Vec::new();
        for field in &self.fields {
            self.flatten_field(field, "", &mut out);
        }
        out
    }

    fn flatten_field(&self, field: &SchemaField, parent_path: &str, out: &mut Vec<FieldOption>) {
        let path = join_path(parent_path, &field.name);
        let actual = field.field_type.non_null();

        let Some(node) = actual.as_node() else {
            out.push(FieldOption::new(path, actual.simple_type(), Some(group_of(parent_path))));
            return;
        };

        if let Some(fields) = node.record_fields() {
            for nested in fields {
                self.flatten_field(nested, &path, out);
            }
            return;
        }

        let Some(items) = node.array_items() else {
            out.push(FieldOption::new(path, actual.simple_type(), Some(group_of(parent_path))));
            return;
        };

        let items = self.resolve(items);
        match items.as_node().and_then(SchemaNode::record_fields) {
            Some(item_fields)
                if item_fields
                    .iter()
                    .any(|f| matches!(f.field_type, AvroType::Union(_))) =>
            {
                for catalog in item_fields {
                    let mut option = FieldOption::new(
                        format!("{}.{}", path, catalog.name),
                        FieldType::Array,
                        Some(field.name.clone()),
                    );
                    option.parent_array = Some(path.clone());
                    out.push(option);
                }
            }
            Some(_) => {
                let mut option = FieldOption::new(path, FieldType::Array, Some(group_of(parent_path)));
                option.is_expandable_array = true;
                out.push(option);
            }
            None => {
                let mut option = FieldOption::new(path, FieldType::Array, Some(group_of(parent_path)));
                option.item_type = Some(items.simple_type());
                out.push(option);
            }
        }
    }

    /// Leaf options inside the item record of an array field, sorted by label
    pub fn array_sub_fields(&self, array_path: &str) -> Vec<FieldOption> {
        let Some(field_type) = self.type_at_path(array_path) else {
            return Vec::new();
        };
        let Some(items) = field_type.non_null().as_node().and_then(SchemaNode::array_items) else {
            return Vec::new();
        };
        let Some(item_fields) = self.resolve(items).as_node().and_then(SchemaNode::record_fields)
        else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for field in item_fields {
            self.flatten_element_field(field, "", &mut out);
        }
        out.sort_by(|a, b| a.label.cmp(&b.label));
        out
    }

    fn flatten_element_field(&self, field: &SchemaField, parent_path: &str, out: &mut Vec<FieldOption>) {
        let path = join_path(parent_path, &field.name);
        let actual = field.field_type.non_null();
        if let Some(fields) = actual.as_node().and_then(SchemaNode::record_fields) {
            for nested in fields {
                self.flatten_element_field(nested, &path, out);
            }
            return;
        }
        let mut option = FieldOption::new(path, actual.simple_type(), None);
        if let Some(items) = actual.as_node().and_then(SchemaNode::array_items) {
            option.item_type = Some(items.simple_type());
        }
        out.push(option);
    }

    /// Declared type at a dotted path, descending through records and array items
    pub fn type_at_path(&self, path: &str) -> Option<&AvroType> {
        let mut fields: &[SchemaField] = &self.fields;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let field = fields.iter().find(|f| f.name == segment)?;
            if segments.peek().is_none() {
                return Some(&field.field_type);
            }
            let mut ty = self.resolve(&field.field_type);
            if let Some(items) = ty.as_node().and_then(SchemaNode::array_items) {
                ty = self.resolve(items);
            }
            fields = ty.as_node().and_then(SchemaNode::record_fields)?;
        }
        None
    }
}

fn validate_field(field: &SchemaField) -> Result<()> {
    if field.name.trim().is_empty() {
        return Err(FilterError::InvalidSchema("field with empty name".to_string()));
    }
    validate_type(&field.name, &field.field_type)
}

fn validate_type(owner: &str, ty: &AvroType) -> Result<()> {
    match ty {
        AvroType::Name(name) if name.trim().is_empty() => Err(FilterError::InvalidSchema(
            format!("empty type name for field {}", owner),
        )),
        AvroType::Name(_) => Ok(()),
        AvroType::Union(branches) => {
            if branches.is_empty() {
                return Err(FilterError::InvalidSchema(format!("empty union for field {}", owner)));
            }
            for branch in branches {
                match branch {
                    AvroType::Union(_) => {
                        return Err(FilterError::InvalidSchema(format!(
                            "nested union for field {}",
                            owner
                        )))
                    }
                    other => validate_type(owner, other)?,
                }
            }
            Ok(())
        }
        AvroType::Node(node) => match node.kind.as_str() {
            "record" => match &node.fields {
                Some(fields) => fields.iter().try_for_each(validate_field),
                None => Err(FilterError::InvalidSchema(format!(
                    "record without fields for field {}",
                    owner
                ))),
            },
            "array" => match &node.items {
                Some(items) => validate_type(owner, items),
                None => Err(FilterError::InvalidSchema(format!(
                    "array without items for field {}",
                    owner
                ))),
            },
            "" => Err(FilterError::InvalidSchema(format!("missing type for field {}", owner))),
            _ => Ok(()),
        },
    }
}

fn find_named_in<'a>(fields: &'a [SchemaField], type_name: &str) -> Option<&'a SchemaNode> {
    find_named_type_in(fields, type_name).and_then(AvroType::as_node)
}

fn find_named_type_in<'a>(fields: &'a [SchemaField], type_name: &str) -> Option<&'a AvroType> {
    for field in fields {
        let ty = field.field_type.non_null();
        let Some(node) = ty.as_node() else {
            continue;
        };
        if node.name.as_deref() == Some(type_name) {
            return Some(ty);
        }
        if let Some(found) = node.record_fields().and_then(|f| find_named_type_in(f, type_name)) {
            return Some(found);
        }
        if let Some(items) = node.array_items() {
            if let Some(item_node) = items.non_null().as_node() {
                if item_node.name.as_deref() == Some(type_name) {
                    return Some(items.non_null());
                }
                if let Some(found) = item_node
                    .record_fields()
                    .and_then(|f| find_named_type_in(f, type_name))
                {
                    return Some(found);
                }
            }
        }
    }
    None
}
