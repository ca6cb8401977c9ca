//! Script variables

use std::collections::HashMap;

use super::error::KeywordError;
use super::line::Arg;
use crate::remote::RemoteObject;

/// Names declared by `as` bindings and their current values.
///
/// A name is declared at parse time and holds no value until the line
/// that binds it has run.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    values: HashMap<String, Option<RemoteObject>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a name without a value. Re-declaring keeps any value.
    pub fn declare(&mut self, name: &str) {
        self.values.entry(name.to_string()).or_insert(None);
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set(&mut self, name: &str, value: RemoteObject) {
        self.values.insert(name.to_string(), Some(value));
    }

    /// Current value; `None` when undeclared or not yet bound.
    pub fn get(&self, name: &str) -> Option<&RemoteObject> {
        self.values.get(name).and_then(Option::as_ref)
    }

    /// Resolve a token to the value passed to a keyword.
    ///
    /// Literals pass through as strings. A declared but unbound variable
    /// resolves to `Null`.
    pub fn resolve(&self, token: &str) -> Result<RemoteObject, KeywordError> {
        match Arg::classify(token) {
            Arg::Literal(text) => Ok(RemoteObject::str(text)),
            Arg::Var { name, attr } => {
                let slot = self
                    .values
                    .get(name)
                    .ok_or_else(|| KeywordError::UndefinedVariable(name.to_string()))?;
                let value = slot.clone().unwrap_or_default();
                match attr {
                    None => Ok(value),
                    Some(attr) => value.attr(attr).ok_or_else(|| KeywordError::MissingAttribute {
                        name: name.to_string(),
                        attr: attr.to_string(),
                        kind: value.kind(),
                    }),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ObjectRef;
    use serde_json::json;

    #[test]
    fn test_declare_then_bind() {
        let mut vars = VariableStore::new();
        assert!(!vars.is_declared("v"));

        vars.declare("v");
        assert!(vars.is_declared("v"));
        assert!(vars.get("v").is_none());
        assert_eq!(vars.resolve("$v").unwrap(), RemoteObject::Null);

        vars.set("v", RemoteObject::Int(3));
        vars.declare("v");
        assert_eq!(vars.get("v"), Some(&RemoteObject::Int(3)));
    }

    #[test]
    fn test_resolve_literals() {
        let vars = VariableStore::new();
        assert_eq!(vars.resolve("plain").unwrap(), RemoteObject::str("plain"));
        assert_eq!(vars.resolve("$").unwrap(), RemoteObject::str("$"));
    }

    #[test]
    fn test_resolve_attribute() {
        let mut vars = VariableStore::new();
        let obj = RemoteObject::from_json(json!({
            "hash": 42,
            "class_name": "android.widget.TextView",
            "text": "Hi",
        }));
        vars.set("v", obj);

        assert_eq!(vars.resolve("$v.text").unwrap(), RemoteObject::str("Hi"));
        assert_eq!(vars.resolve("$v.hash").unwrap(), RemoteObject::Int(42));

        let err = vars.resolve("$v.missing").unwrap_err();
        assert!(matches!(err, KeywordError::MissingAttribute { ref attr, .. } if attr == "missing"));

        assert!(matches!(
            vars.resolve("$other").unwrap_err(),
            KeywordError::UndefinedVariable(name) if name == "other"
        ));
    }

    #[test]
    fn test_unbound_attribute_is_error() {
        let mut vars = VariableStore::new();
        vars.declare("v");
        assert!(vars.resolve("$v.text").is_err());

        vars.set("v", ObjectRef::new(1, "a.B").into());
        assert_eq!(
            vars.resolve("$v.class_name").unwrap(),
            RemoteObject::str("a.B")
        );
    }
}
