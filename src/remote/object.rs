//! Remote Object Model
//!
//! Values and handles exchanged with the on-device reflection agent.
//!
//! ```text
//! RemoteObject
//! ├── Null / Bool / Str / Int / Float   primitives
//! ├── Class(name)                       class reference, no live instance
//! ├── Object(ObjectRef)                 live instance: hash + class_name + extra attrs
//! ├── Record(map)                       structured result without a handle
//! └── List(items)                       array result
//! ```
//!
//! Handles are plain identifiers. The agent owns the instance; once it is
//! recycled on the device side, further calls with the handle fail remotely.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key holding the instance handle in a structured result.
pub const HASH_KEY: &str = "hash";

/// Key holding the declared class of the instance in a structured result.
pub const CLASS_NAME_KEY: &str = "class_name";

/// Handles may arrive as integers, integral floats or numeric strings.
fn handle_from_json(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reference to a live instance held by the remote agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Opaque handle assigned by the agent
    pub hash: i64,
    /// Declared class of the instance, used to pick the remote overload
    pub class_name: String,
    /// Extra attributes reported by the agent (e.g. `resource_id`, `text`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, Value>,
}

impl ObjectRef {
    pub fn new(hash: i64, class_name: impl Into<String>) -> Self {
        Self {
            hash,
            class_name: class_name.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Same handle, viewed as another class.
    ///
    /// The agent resolves overloads from the declared class, so a generic
    /// `View` returned by a lookup sometimes has to travel as `EditText`.
    pub fn with_class_name(&self, class_name: impl Into<String>) -> Self {
        Self {
            hash: self.hash,
            class_name: class_name.into(),
            attrs: self.attrs.clone(),
        }
    }

    /// Look up an attribute, including the two fixed fields.
    pub fn attr(&self, name: &str) -> Option<RemoteObject> {
        match name {
            HASH_KEY => Some(RemoteObject::Int(self.hash)),
            CLASS_NAME_KEY => Some(RemoteObject::Str(self.class_name.clone())),
            other => self.attrs.get(other).cloned().map(RemoteObject::from_json),
        }
    }

    /// Every visible field name, fixed fields first.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names = vec![HASH_KEY, CLASS_NAME_KEY];
        names.extend(self.attrs.keys().map(String::as_str));
        names
    }
}

/// A value or handle understood by the remote agent.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RemoteObject {
    #[default]
    Null,
    Bool(bool),
    Str(String),
    Int(i64),
    /// Float-tagged value; travels with its own type tag
    Float(f64),
    /// Class reference by fully-qualified name
    Class(String),
    Object(ObjectRef),
    /// Structured result that carries no instance handle
    Record(BTreeMap<String, Value>),
    List(Vec<RemoteObject>),
}

impl RemoteObject {
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    pub fn class(class_name: impl Into<String>) -> Self {
        Self::Class(class_name.into())
    }

    pub fn object(hash: i64, class_name: impl Into<String>) -> Self {
        Self::Object(ObjectRef::new(hash, class_name))
    }

    /// Rehydrate a result payload.
    ///
    /// A dictionary becomes an object whose fields are exactly its keys:
    /// with a numeric `hash` and a string `class_name` it is a live
    /// reference, otherwise a plain record. Scalars pass through.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => {
                let mut fields: BTreeMap<String, Value> = map.into_iter().collect();
                let hash = fields.get(HASH_KEY).and_then(handle_from_json);
                let class_name = fields
                    .get(CLASS_NAME_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                match (hash, class_name) {
                    (Some(hash), Some(class_name)) => {
                        fields.remove(HASH_KEY);
                        fields.remove(CLASS_NAME_KEY);
                        Self::Object(ObjectRef {
                            hash,
                            class_name,
                            attrs: fields,
                        })
                    }
                    _ => Self::Record(fields),
                }
            }
        }
    }

    /// Inverse of [`RemoteObject::from_json`], used when echoing values back
    /// to a caller (CLI output, shared state dumps).
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Class(name) => {
                let mut map = serde_json::Map::new();
                map.insert(CLASS_NAME_KEY.to_string(), Value::String(name.clone()));
                Value::Object(map)
            }
            Self::Object(obj) => {
                let mut map: serde_json::Map<String, Value> =
                    obj.attrs.clone().into_iter().collect();
                map.insert(HASH_KEY.to_string(), Value::from(obj.hash));
                map.insert(
                    CLASS_NAME_KEY.to_string(),
                    Value::String(obj.class_name.clone()),
                );
                Value::Object(map)
            }
            Self::Record(fields) => Value::Object(fields.clone().into_iter().collect()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Attribute access for `$name.attr` references.
    pub fn attr(&self, name: &str) -> Option<RemoteObject> {
        match self {
            Self::Object(obj) => obj.attr(name),
            Self::Class(class_name) if name == CLASS_NAME_KEY => {
                Some(Self::Str(class_name.clone()))
            }
            Self::Record(fields) => fields.get(name).cloned().map(Self::from_json),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short variant name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Class(_) => "class",
            Self::Object(_) => "object",
            Self::Record(_) => "record",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Str(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Class(name) => write!(f, "class {}", name),
            Self::Object(obj) => write!(f, "{}@{}", obj.class_name, obj.hash),
            Self::Record(_) | Self::List(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for RemoteObject {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RemoteObject {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for RemoteObject {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for RemoteObject {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for RemoteObject {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<ObjectRef> for RemoteObject {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

/// Decimal text for a float, always with a fractional part (`1.0`, not `1`).
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dict_with_handle_becomes_object() {
        let obj = RemoteObject::from_json(json!({"hash": 42, "class_name": "android.view.View"}));
        let obj_ref = obj.as_object().unwrap();
        assert_eq!(obj_ref.hash, 42);
        assert_eq!(obj_ref.class_name, "android.view.View");
        assert!(obj_ref.attrs.is_empty());
        assert_eq!(obj_ref.field_names(), vec!["hash", "class_name"]);
    }

    #[test]
    fn test_extra_attributes_visible() {
        let obj = RemoteObject::from_json(json!({
            "hash": 7,
            "class_name": "android.widget.TextView",
            "resource_id": "com.app:id/title",
            "text": "Hello"
        }));
        assert_eq!(obj.attr("text"), Some(RemoteObject::str("Hello")));
        assert_eq!(obj.attr("resource_id"), Some(RemoteObject::str("com.app:id/title")));
        assert_eq!(obj.attr("hash"), Some(RemoteObject::Int(7)));
        assert_eq!(obj.attr("missing"), None);
    }

    #[test]
    fn test_loose_handle_encodings() {
        for hash in [json!("42"), json!(42.0), json!(" 42 ")] {
            let obj = RemoteObject::from_json(json!({"hash": hash, "class_name": "android.view.View"}));
            assert_eq!(obj.as_object().map(|o| o.hash), Some(42), "{:?}", obj);
            assert!(crate::remote::encode_arg(&obj).is_ok());
        }
        for hash in [json!(4.5), json!("x42"), json!(null)] {
            let obj = RemoteObject::from_json(json!({"hash": hash, "class_name": "android.view.View"}));
            assert_eq!(obj.kind(), "record");
        }
    }

    #[test]
    fn test_dict_without_handle_is_record() {
        let obj = RemoteObject::from_json(json!({"width": 1080, "height": 1920}));
        match &obj {
            RemoteObject::Record(fields) => assert_eq!(fields.len(), 2),
            other => panic!("Expected Record, got {:?}", other),
        }
        assert_eq!(obj.attr("width"), Some(RemoteObject::Int(1080)));
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(RemoteObject::from_json(json!("ok")), RemoteObject::str("ok"));
        assert_eq!(RemoteObject::from_json(json!(3)), RemoteObject::Int(3));
        assert_eq!(RemoteObject::from_json(json!(2.5)), RemoteObject::Float(2.5));
        assert_eq!(RemoteObject::from_json(json!(true)), RemoteObject::Bool(true));
        assert_eq!(RemoteObject::from_json(Value::Null), RemoteObject::Null);
    }

    #[test]
    fn test_with_class_name_keeps_handle() {
        let view = ObjectRef::new(11, "android.view.View");
        let edit = view.with_class_name("android.widget.EditText");
        assert_eq!(edit.hash, 11);
        assert_eq!(edit.class_name, "android.widget.EditText");
        assert_eq!(view.class_name, "android.view.View");
    }

    #[test]
    fn test_to_json_restores_object_fields() {
        let original = json!({"hash": 5, "class_name": "a.B", "text": "x"});
        let obj = RemoteObject::from_json(original.clone());
        assert_eq!(obj.to_json(), original);
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(-300.0), "-300.0");
    }
}
