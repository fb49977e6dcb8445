//! Typed views of the JSON packets exchanged with the debuggee.
//!
//! Requests are fully typed. Inbound packets stay as [`serde_json::Value`]
//! because routing inside an actor is decided by which fields are present;
//! the payload types below are decoded once an actor knows what it received.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// An outbound packet addressed to one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl Request {
    pub fn new(to: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            kind: kind.into(),
            args: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.args.insert(key.to_string(), value);
        self
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }
}

/// The actor a packet came from.
pub fn message_from(message: &Value) -> Option<&str> {
    message.get("from").and_then(Value::as_str)
}

pub fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}

/// `(error, message)` of an error reply.
pub fn message_error(message: &Value) -> Option<(&str, Option<&str>)> {
    let error = message.get("error").and_then(Value::as_str)?;
    Some((error, message.get("message").and_then(Value::as_str)))
}

pub fn has_field(message: &Value, key: &str) -> bool {
    message.get(key).is_some()
}

pub fn field_count(message: &Value) -> usize {
    message.as_object().map(Map::len).unwrap_or(0)
}

/// A reply that carries nothing but its `from` field.
pub fn is_bare_reply(message: &Value) -> bool {
    field_count(message) == 1 && has_field(message, "from")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub actor: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_black_boxed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Location a breakpoint is requested at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointLocation {
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl BreakpointLocation {
    pub fn line(line: u32) -> Self {
        Self { line, column: None }
    }
}

/// Location reported by the debuggee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default)]
    pub source: Option<SourceDescriptor>,
    pub line: u32,
    #[serde(default)]
    pub column: Option<u32>,
}

/// The `why` of a `paused` packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseReason {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub actor: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "where", default)]
    pub location: Option<SourceLocation>,
    #[serde(default)]
    pub this: Option<Grip>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectGrip {
    pub actor: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongStringGrip {
    pub actor: String,
    pub initial: String,
    pub length: u64,
}

/// A protocol value: either an inline primitive or a handle to remote data.
#[derive(Debug, Clone, PartialEq)]
pub enum Grip {
    Bool(bool),
    Number(f64),
    String(String),
    Undefined,
    Null,
    Infinity,
    NegativeInfinity,
    NaN,
    NegativeZero,
    Symbol { name: Option<String> },
    LongString(LongStringGrip),
    Object(ObjectGrip),
    Unknown(Value),
}

impl Grip {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Bool(b) => Grip::Bool(b),
            Value::Number(n) => n.as_f64().map(Grip::Number).unwrap_or(Grip::NaN),
            Value::String(s) => Grip::String(s),
            Value::Null => Grip::Null,
            Value::Object(obj) => Grip::from_object(obj),
            other => Grip::Unknown(other),
        }
    }

    fn from_object(obj: Map<String, Value>) -> Self {
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match kind.as_str() {
            "undefined" => Grip::Undefined,
            "null" => Grip::Null,
            "Infinity" => Grip::Infinity,
            "-Infinity" => Grip::NegativeInfinity,
            "NaN" => Grip::NaN,
            "-0" => Grip::NegativeZero,
            "symbol" => Grip::Symbol {
                name: obj.get("name").and_then(Value::as_str).map(str::to_string),
            },
            "longString" => serde_json::from_value(Value::Object(obj.clone()))
                .map(Grip::LongString)
                .unwrap_or_else(|_| Grip::Unknown(Value::Object(obj))),
            "object" => serde_json::from_value(Value::Object(obj.clone()))
                .map(Grip::Object)
                .unwrap_or_else(|_| Grip::Unknown(Value::Object(obj))),
            _ => Grip::Unknown(Value::Object(obj)),
        }
    }

    pub fn to_value(&self) -> Value {
        fn typed(kind: &str) -> Value {
            serde_json::json!({ "type": kind })
        }

        match self {
            Grip::Bool(b) => Value::Bool(*b),
            Grip::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| typed("NaN")),
            Grip::String(s) => Value::String(s.clone()),
            Grip::Undefined => typed("undefined"),
            Grip::Null => typed("null"),
            Grip::Infinity => typed("Infinity"),
            Grip::NegativeInfinity => typed("-Infinity"),
            Grip::NaN => typed("NaN"),
            Grip::NegativeZero => typed("-0"),
            Grip::Symbol { name } => serde_json::json!({ "type": "symbol", "name": name }),
            Grip::LongString(long) => serde_json::json!({
                "type": "longString",
                "actor": long.actor,
                "initial": long.initial,
                "length": long.length,
            }),
            Grip::Object(object) => {
                let mut value = serde_json::to_value(object).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.insert("type".to_string(), Value::String("object".to_string()));
                }
                value
            }
            Grip::Unknown(value) => value.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Grip::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectGrip> {
        match self {
            Grip::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Grip {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Grip::from_value)
    }
}

impl Serialize for Grip {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    #[serde(default)]
    pub value: Option<Grip>,
    #[serde(default)]
    pub get: Option<Grip>,
    #[serde(default)]
    pub set: Option<Grip>,
    #[serde(default)]
    pub configurable: bool,
    #[serde(default)]
    pub enumerable: bool,
    #[serde(default)]
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeGetterValueDescriptor {
    pub getter_value: Grip,
    #[serde(default)]
    pub getter_prototype_level: u32,
    #[serde(default)]
    pub enumerable: bool,
    #[serde(default)]
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolProperty {
    pub name: String,
    pub descriptor: PropertyDescriptor,
}

/// Reply to a `prototypeAndProperties` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrototypeAndProperties {
    pub prototype: Grip,
    #[serde(default)]
    pub own_properties: HashMap<String, PropertyDescriptor>,
    #[serde(default)]
    pub safe_getter_values: Option<HashMap<String, SafeGetterValueDescriptor>>,
    #[serde(default)]
    pub own_symbols: Option<Vec<SymbolProperty>>,
}

/// Reply to a `setBreakpoint` request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetBreakpointReply {
    pub actor: String,
    #[serde(default)]
    pub is_pending: bool,
    #[serde(default)]
    pub actual_location: Option<SourceLocation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_serializes_type_and_flattened_args() {
        let request = Request::new("thread1", "resume").with("resumeLimit", json!({ "type": "next" }));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "to": "thread1", "type": "resume", "resumeLimit": { "type": "next" } })
        );
    }

    #[test]
    fn grips_decode_primitives_and_typed_objects() {
        assert_eq!(Grip::from_value(json!(3)), Grip::Number(3.0));
        assert_eq!(Grip::from_value(json!("x")), Grip::String("x".into()));
        assert_eq!(Grip::from_value(json!({ "type": "undefined" })), Grip::Undefined);
        assert_eq!(Grip::from_value(json!({ "type": "-0" })), Grip::NegativeZero);

        let grip = Grip::from_value(json!({ "type": "object", "actor": "obj1", "class": "Array" }));
        let object = grip.as_object().expect("object grip");
        assert_eq!(object.actor, "obj1");
        assert_eq!(object.class, "Array");
        assert_eq!(grip.to_value()["type"], json!("object"));
    }

    #[test]
    fn bare_replies_only_carry_from() {
        assert!(is_bare_reply(&json!({ "from": "a" })));
        assert!(!is_bare_reply(&json!({ "from": "a", "type": "x" })));
        assert!(!is_bare_reply(&json!({ "type": "x" })));
    }

    #[test]
    fn prototype_and_properties_tolerates_missing_optional_maps() {
        let reply: PrototypeAndProperties = serde_json::from_value(json!({
            "from": "obj1",
            "prototype": { "type": "null" },
            "ownProperties": { "a": { "value": 1, "writable": true } }
        }))
        .unwrap();
        assert!(reply.prototype.is_null());
        assert_eq!(reply.own_properties["a"].value, Some(Grip::Number(1.0)));
        assert!(reply.safe_getter_values.is_none());
        assert!(reply.own_symbols.is_none());
    }
}
