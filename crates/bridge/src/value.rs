//! Values crossing the sandbox boundary
//!
//! Arguments arrive as JSON values (whatever the host marshals script values
//! into); results leave as [`ScriptValue`]. Collections never cross the
//! boundary themselves, only their handles do.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Opaque reference to a collection owned by the bridge
pub type HandleId = u32;

/// Result of a bridged call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ScriptValue {
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    Handle(HandleId),
    Array(Vec<ScriptValue>),
}

impl ScriptValue {
    pub fn as_handle(&self) -> Option<HandleId> {
        match self {
            ScriptValue::Handle(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Option<String>> for ScriptValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(ScriptValue::Undefined, ScriptValue::String)
    }
}

/// Typed access to a call's argument list
pub(crate) struct Args<'a> {
    method: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub(crate) fn new(method: &'a str, values: &'a [Value]) -> Self {
        Self { method, values }
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    fn invalid(&self, index: usize, expected: &'static str) -> BridgeError {
        BridgeError::InvalidArgument {
            method: self.method.to_string(),
            index,
            expected,
        }
    }

    /// Required string argument
    pub(crate) fn str(&self, index: usize) -> Result<&'a str> {
        match self.values.get(index) {
            Some(Value::String(s)) => Ok(s),
            _ => Err(self.invalid(index, "string")),
        }
    }

    /// Optional string argument; `null` counts as absent
    pub(crate) fn opt_str(&self, index: usize) -> Result<Option<&'a str>> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.invalid(index, "string or nothing")),
        }
    }

    /// Scripts pass numbers and booleans where strings are meant; stringify them
    pub(crate) fn string_like(&self, index: usize) -> Result<String> {
        match self.values.get(index) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Bool(b)) => Ok(b.to_string()),
            _ => Err(self.invalid(index, "string, number or boolean")),
        }
    }

    /// Required integer argument
    pub(crate) fn int(&self, index: usize) -> Result<i64> {
        let value = self.values.get(index);
        value
            .and_then(Value::as_i64)
            .or_else(|| {
                value
                    .and_then(Value::as_f64)
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| self.invalid(index, "integer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_value_wire_format() {
        let value = ScriptValue::Array(vec![
            ScriptValue::Handle(3),
            ScriptValue::String("x".into()),
            ScriptValue::Undefined,
        ]);
        let wire = serde_json::to_value(&value).unwrap();
        assert_eq!(
            wire,
            json!({"type": "array", "value": [
                {"type": "handle", "value": 3},
                {"type": "string", "value": "x"},
                {"type": "undefined"}
            ]})
        );
        let back: ScriptValue = serde_json::from_value(wire).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_args() {
        let values = vec![json!("a"), json!(2), json!(null), json!(1.0), json!(true)];
        let args = Args::new("m", &values);
        assert_eq!(args.str(0).unwrap(), "a");
        assert!(args.str(1).is_err());
        assert_eq!(args.opt_str(2).unwrap(), None);
        assert_eq!(args.opt_str(9).unwrap(), None);
        assert_eq!(args.int(1).unwrap(), 2);
        assert_eq!(args.int(3).unwrap(), 1);
        assert!(args.int(0).is_err());
        assert_eq!(args.string_like(1).unwrap(), "2");
        assert_eq!(args.string_like(4).unwrap(), "true");
        assert!(matches!(
            args.string_like(2),
            Err(BridgeError::InvalidArgument { index: 2, .. })
        ));
    }
}
