//! Built-in outputters.

use serde_json::Value;

use crate::error::Result;
use crate::worker::Outputter;

/// Strings are stored as-is; anything else as JSON text. Decodes to a string.
pub struct Raw;

impl Outputter for Raw {
    fn encode(&self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn decode(&self, raw: &str) -> Result<Value> {
        Ok(Value::String(raw.to_string()))
    }
}

pub struct Json;

impl Outputter for Json {
    fn encode(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, raw: &str) -> Result<Value> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_keeps_strings_verbatim() {
        assert_eq!(Raw.encode(&json!("done")).unwrap(), "done");
        assert_eq!(Raw.encode(&json!(3)).unwrap(), "3");
        assert_eq!(Raw.decode("done").unwrap(), json!("done"));
    }

    #[test]
    fn json_rejects_garbage() {
        assert!(Json.decode("{not json").is_err());
        assert_eq!(Json.decode(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
    }
}
