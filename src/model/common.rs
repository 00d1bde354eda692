use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat record returned by a remote service (field name -> JSON value)
/// Field order follows the order the service produced them in
pub type Record = Map<String, Value>;

/// Argument forwarded to a fetch call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Opaque field reference, passed through to the remote service untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Argument {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            field: None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_ref().and_then(Value::as_bool)
    }
}

/// Name of the argument that forces one-to-one cardinality on an expand
pub const SINGLE_ARG: &str = "single";

/// Canonical join key for a scalar JSON value
///
/// Strings keep their quotes so that `1` and `"1"` never collide. Null, arrays and objects
/// can't act as join keys and yield `None`.
pub fn join_key(value: &Value) -> Option<String> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Insert or replace arguments by name, keeping the position of replaced entries
pub fn merge_arguments(base: &mut Vec<Argument>, overrides: impl IntoIterator<Item = Argument>) {
    for arg in overrides {
        match base.iter_mut().find(|existing| existing.name == arg.name) {
            Some(existing) => *existing = arg,
            None => base.push(arg),
        }
    }
}
