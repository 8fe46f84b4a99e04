//! Resource schemas and schema-guided state decoding
//!
//! Attribute types use the provider JSON type encoding: primitives are
//! bare strings (`"string"`), collections are tagged arrays
//! (`["list", "string"]`, `["object", {"a": "number"}]`).
//!
//! State crosses the plugin boundary as a [`DynamicValue`], msgpack
//! encoded and shaped by the schema of the resource it belongs to.

use super::tfplugin5::{self, schema::nested_block::NestingMode as WireNesting, DynamicValue};
use crate::resource::Attributes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("invalid type expression: {0}")]
    InvalidType(String),

    #[error("resource state must be an object")]
    NotAnObject,

    #[error("invalid dynamic value: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum AttributeType {
    String,
    Number,
    Bool,
    Dynamic,
    List(Box<AttributeType>),
    Set(Box<AttributeType>),
    Map(Box<AttributeType>),
    Object(BTreeMap<String, AttributeType>),
}

impl TryFrom<Value> for AttributeType {
    type Error = DecodeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let invalid = |v: &Value| DecodeError::InvalidType(v.to_string());
        match &value {
            Value::String(s) => match s.as_str() {
                "string" => Ok(AttributeType::String),
                "number" => Ok(AttributeType::Number),
                "bool" => Ok(AttributeType::Bool),
                "dynamic" => Ok(AttributeType::Dynamic),
                _ => Err(invalid(&value)),
            },
            Value::Array(parts) => match parts.as_slice() {
                [Value::String(kind), inner] => match kind.as_str() {
                    "list" => Ok(AttributeType::List(Box::new(inner.clone().try_into()?))),
                    "set" => Ok(AttributeType::Set(Box::new(inner.clone().try_into()?))),
                    "map" => Ok(AttributeType::Map(Box::new(inner.clone().try_into()?))),
                    "object" => {
                        let Value::Object(fields) = inner else {
                            return Err(invalid(&value));
                        };
                        let mut object = BTreeMap::new();
                        for (name, ty) in fields {
                            object.insert(name.clone(), ty.clone().try_into()?);
                        }
                        Ok(AttributeType::Object(object))
                    }
                    _ => Err(invalid(&value)),
                },
                _ => Err(invalid(&value)),
            },
            _ => Err(invalid(&value)),
        }
    }
}

impl From<AttributeType> for Value {
    fn from(ty: AttributeType) -> Self {
        match ty {
            AttributeType::String => Value::from("string"),
            AttributeType::Number => Value::from("number"),
            AttributeType::Bool => Value::from("bool"),
            AttributeType::Dynamic => Value::from("dynamic"),
            AttributeType::List(inner) => Value::Array(vec!["list".into(), (*inner).into()]),
            AttributeType::Set(inner) => Value::Array(vec!["set".into(), (*inner).into()]),
            AttributeType::Map(inner) => Value::Array(vec!["map".into(), (*inner).into()]),
            AttributeType::Object(fields) => {
                let fields: Map<String, Value> =
                    fields.into_iter().map(|(k, v)| (k, v.into())).collect();
                Value::Array(vec!["object".into(), Value::Object(fields)])
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaAttribute {
    #[serde(rename = "type")]
    pub ty: AttributeType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub sensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NestingMode {
    Single,
    Group,
    List,
    Set,
    Map,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    pub nesting: NestingMode,
    pub block: Block,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub attributes: BTreeMap<String, SchemaAttribute>,
    #[serde(default)]
    pub block_types: BTreeMap<String, NestedBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSchema {
    #[serde(default)]
    pub version: i64,
    pub block: Block,
}

impl ResourceSchema {
    /// Decode provider state into attributes shaped by this schema
    pub fn decode(&self, state: &Value) -> Result<Attributes, DecodeError> {
        let decoded = decode_block(&self.block, state, "")?;
        Attributes::from_value(decoded).ok_or(DecodeError::NotAnObject)
    }

    /// Decode a state received from the plugin, `None` for a null state
    pub fn decode_dynamic(&self, state: &DynamicValue) -> Result<Option<Attributes>, DecodeError> {
        match dynamic_to_json(state)? {
            Value::Null => Ok(None),
            value => self.decode(&value).map(Some),
        }
    }

    pub fn encode(&self, value: &Value) -> Result<DynamicValue, DecodeError> {
        self.block.encode(value)
    }
}

impl Block {
    /// Encode `value` as msgpack shaped by this block
    ///
    /// Attributes unknown to the block are dropped and primitives are
    /// coerced. Dynamic attributes are sent as null.
    pub fn encode(&self, value: &Value) -> Result<DynamicValue, DecodeError> {
        let mut shaped = decode_block(self, value, "")?;
        if shaped.is_null() {
            shaped = Value::Object(Map::new());
        }
        clear_dynamic(self, &mut shaped);
        let msgpack =
            rmp_serde::to_vec(&shaped).map_err(|e| DecodeError::Encoding(e.to_string()))?;
        Ok(DynamicValue {
            msgpack,
            json: Vec::new(),
        })
    }
}

fn clear_dynamic(block: &Block, value: &mut Value) {
    let Value::Object(fields) = value else {
        return;
    };
    for (name, attribute) in &block.attributes {
        if attribute.ty == AttributeType::Dynamic {
            fields.remove(name);
        }
    }
    for (name, nested) in &block.block_types {
        let Some(item) = fields.get_mut(name) else {
            continue;
        };
        match (nested.nesting, item) {
            (NestingMode::Map, Value::Object(entries)) => entries
                .values_mut()
                .for_each(|entry| clear_dynamic(&nested.block, entry)),
            (_, Value::Array(items)) => items
                .iter_mut()
                .for_each(|entry| clear_dynamic(&nested.block, entry)),
            (_, item) => clear_dynamic(&nested.block, item),
        }
    }
}

/// Plain JSON view of a plugin value, msgpack preferred
pub fn dynamic_to_json(value: &DynamicValue) -> Result<Value, DecodeError> {
    if !value.msgpack.is_empty() {
        rmp_serde::from_slice(&value.msgpack).map_err(|e| DecodeError::Encoding(e.to_string()))
    } else if !value.json.is_empty() {
        serde_json::from_slice(&value.json).map_err(|e| DecodeError::Encoding(e.to_string()))
    } else {
        Ok(Value::Null)
    }
}

impl TryFrom<tfplugin5::Schema> for ResourceSchema {
    type Error = DecodeError;

    fn try_from(schema: tfplugin5::Schema) -> Result<Self, Self::Error> {
        Ok(Self {
            version: schema.version,
            block: schema.block.map(Block::try_from).transpose()?.unwrap_or_default(),
        })
    }
}

impl TryFrom<tfplugin5::schema::Block> for Block {
    type Error = DecodeError;

    fn try_from(block: tfplugin5::schema::Block) -> Result<Self, Self::Error> {
        let mut attributes = BTreeMap::new();
        for attribute in block.attributes {
            let ty: Value = serde_json::from_slice(&attribute.r#type).map_err(|e| {
                DecodeError::InvalidType(format!("{}: {}", attribute.name, e))
            })?;
            attributes.insert(
                attribute.name,
                SchemaAttribute {
                    ty: ty.try_into()?,
                    required: attribute.required,
                    optional: attribute.optional,
                    computed: attribute.computed,
                    sensitive: attribute.sensitive,
                },
            );
        }

        let mut block_types = BTreeMap::new();
        for nested in block.block_types {
            let nesting = match nested.nesting() {
                WireNesting::Single => NestingMode::Single,
                WireNesting::Group => NestingMode::Group,
                WireNesting::List => NestingMode::List,
                WireNesting::Set => NestingMode::Set,
                WireNesting::Map => NestingMode::Map,
                WireNesting::Invalid => {
                    return Err(DecodeError::InvalidType(format!(
                        "block {} has no nesting mode",
                        nested.type_name
                    )))
                }
            };
            let inner = nested.block.map(Block::try_from).transpose()?.unwrap_or_default();
            block_types.insert(
                nested.type_name,
                NestedBlock {
                    nesting,
                    block: inner,
                },
            );
        }

        Ok(Self {
            attributes,
            block_types,
        })
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn mismatch(path: &str, expected: &str, found: &Value) -> DecodeError {
    DecodeError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: kind(found).to_string(),
    }
}

fn decode_block(block: &Block, value: &Value, path: &str) -> Result<Value, DecodeError> {
    let fields = match value {
        Value::Null => return Ok(Value::Null),
        Value::Object(fields) => fields,
        other => return Err(mismatch(path, "object", other)),
    };

    let mut out = Map::new();
    for (name, attribute) in &block.attributes {
        if let Some(v) = fields.get(name) {
            out.insert(name.clone(), decode_value(&attribute.ty, v, &join(path, name))?);
        }
    }

    for (name, nested) in &block.block_types {
        let Some(v) = fields.get(name) else {
            continue;
        };
        let nested_path = join(path, name);
        let decoded = match (nested.nesting, v) {
            (_, Value::Null) => Value::Null,
            (NestingMode::Single | NestingMode::Group, v) => {
                decode_block(&nested.block, v, &nested_path)?
            }
            (NestingMode::List | NestingMode::Set, Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        decode_block(&nested.block, item, &join(&nested_path, &i.to_string()))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            (NestingMode::Map, Value::Object(entries)) => {
                let mut map = Map::new();
                for (key, item) in entries {
                    map.insert(
                        key.clone(),
                        decode_block(&nested.block, item, &join(&nested_path, key))?,
                    );
                }
                Value::Object(map)
            }
            (NestingMode::List | NestingMode::Set, other) => {
                return Err(mismatch(&nested_path, "list", other))
            }
            (NestingMode::Map, other) => return Err(mismatch(&nested_path, "map", other)),
        };
        out.insert(name.clone(), decoded);
    }

    Ok(Value::Object(out))
}

/// Convert `value` to `ty`, coercing primitives written as strings
pub fn decode_value(ty: &AttributeType, value: &Value, path: &str) -> Result<Value, DecodeError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match ty {
        AttributeType::Dynamic => Ok(value.clone()),
        AttributeType::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(mismatch(path, "string", other)),
        },
        AttributeType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => parse_number(s).ok_or_else(|| mismatch(path, "number", value)),
            other => Err(mismatch(path, "number", other)),
        },
        AttributeType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            other => Err(mismatch(path, "bool", other)),
        },
        AttributeType::List(inner) | AttributeType::Set(inner) => match value {
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| decode_value(inner, item, &join(path, &i.to_string())))
                    .collect::<Result<_, _>>()?,
            )),
            other => Err(mismatch(path, "list", other)),
        },
        AttributeType::Map(inner) => match value {
            Value::Object(entries) => {
                let mut map = Map::new();
                for (key, item) in entries {
                    map.insert(key.clone(), decode_value(inner, item, &join(path, key))?);
                }
                Ok(Value::Object(map))
            }
            other => Err(mismatch(path, "map", other)),
        },
        AttributeType::Object(fields) => match value {
            Value::Object(entries) => {
                let mut map = Map::new();
                for (key, field_ty) in fields {
                    if let Some(item) = entries.get(key) {
                        map.insert(key.clone(), decode_value(field_ty, item, &join(path, key))?);
                    }
                }
                Ok(Value::Object(map))
            }
            other => Err(mismatch(path, "object", other)),
        },
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
