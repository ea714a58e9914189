//! JSON-schema-like tree used to describe tool arguments, tool responses and
//! structured outputs.
//!
//! The tree is deliberately smaller than full JSON Schema: the six types the
//! runtime cares about, properties, required markers, array items, enums,
//! descriptions and nullability. Schemas can be written by hand with the
//! builder methods or derived from a Rust type via [`from_type`], which runs
//! [`schemars`] reflection and folds the output into this representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    #[default]
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
}

/// One node of the schema tree.
///
/// Properties are kept in a [`BTreeMap`] so that every serialization and every
/// generated tool signature lists parameters in a deterministic (alphabetical)
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
}

impl Schema {
    fn of(schema_type: SchemaType) -> Self {
        Schema {
            schema_type,
            ..Default::default()
        }
    }

    pub fn object() -> Self {
        Self::of(SchemaType::Object)
    }

    pub fn array(items: Schema) -> Self {
        Schema {
            items: Some(Box::new(items)),
            ..Self::of(SchemaType::Array)
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach an optional property.
    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Attach a property and mark it required.
    pub fn required_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, schema);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn enumeration(mut self, values: Vec<String>) -> Self {
        self.enum_values = values;
        self
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

/// Derive a [`Schema`] from a Rust type using `schemars` reflection.
///
/// `Option<T>` fields become nullable, `Vec<T>` becomes an array, nested
/// structs are inlined by resolving `$ref` pointers into the definitions
/// table. Constructs this tree cannot express degrade to plain objects.
pub fn from_type<T: schemars::JsonSchema>() -> Schema {
    let root = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
    let value = serde_json::to_value(&root).unwrap_or(Value::Null);
    let definitions = value.get("definitions").cloned().unwrap_or(Value::Null);
    convert(&value, &definitions)
}

fn convert(value: &Value, definitions: &Value) -> Schema {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return Schema::object(),
    };

    // Inline references to named definitions.
    if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
        if let Some(name) = reference.strip_prefix("#/definitions/") {
            if let Some(target) = definitions.get(name) {
                return convert(target, definitions);
            }
        }
        return Schema::object();
    }

    // schemars wraps referenced schemas that carry extra metadata in allOf.
    if let Some(all_of) = obj.get("allOf").and_then(Value::as_array) {
        if let Some(first) = all_of.first() {
            let mut schema = convert(first, definitions);
            if schema.description.is_none() {
                schema.description = obj
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            return schema;
        }
    }

    let (type_name, nullable) = extract_type(obj.get("type"));
    let mut schema = Schema::of(match type_name.as_deref() {
        Some("string") => SchemaType::String,
        Some("number") => SchemaType::Number,
        Some("integer") => SchemaType::Integer,
        Some("boolean") => SchemaType::Boolean,
        Some("array") => SchemaType::Array,
        _ => SchemaType::Object,
    });
    schema.nullable = nullable;

    schema.description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            schema
                .properties
                .insert(name.clone(), convert(prop, definitions));
        }
    }

    if let Some(required) = obj.get("required").and_then(Value::as_array) {
        schema.required = required
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        schema.required.sort();
    }

    if let Some(items) = obj.get("items") {
        // Tuple-form items degrade to the first entry.
        let item_value = items.as_array().and_then(|a| a.first()).unwrap_or(items);
        schema.items = Some(Box::new(convert(item_value, definitions)));
    }

    if let Some(values) = obj.get("enum").and_then(Value::as_array) {
        schema.enum_values = values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }

    schema
}

// "type" may be a single string or an array like ["string", "null"].
fn extract_type(value: Option<&Value>) -> (Option<String>, bool) {
    match value {
        Some(Value::String(s)) => (Some(s.clone()), false),
        Some(Value::Array(items)) => {
            let nullable = items.iter().any(|v| v.as_str() == Some("null"));
            let named = items
                .iter()
                .filter_map(Value::as_str)
                .find(|s| *s != "null")
                .map(str::to_string);
            (named, nullable)
        }
        _ => (None, false),
    }
}
