//! Built-in finalizers.

use serde_json::{Map, Value};
use tracing::info;

use crate::error::Result;
use crate::process::Process;
use crate::worker::Finalizer;

/// Scalar JSON for a reduced value: integers and floats become numbers.
fn scalar(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(raw.to_string()),
    }
}

/// Collects every key's reduced value into one JSON object and saves it as
/// the process result. Keys with several reduced values map to an array.
pub struct ToHash;

impl Finalizer for ToHash {
    fn finalize(&self, process: &Process) -> Result<()> {
        let mut object = Map::new();
        process.each_key_reduced_value(|key, values| {
            let value = match values.as_slice() {
                [single] => scalar(single),
                many => Value::Array(many.iter().map(|v| scalar(v)).collect()),
            };
            object.insert(key.to_string(), value);
            Ok(())
        })?;
        process.save_result(&Value::Object(object))
    }
}

/// Saves nothing; only logs that the process finished.
pub struct Notify;

impl Finalizer for Notify {
    fn finalize(&self, process: &Process) -> Result<()> {
        info!(pid = process.pid(), keys = process.num_keys()?, "Process reduced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_prefer_numbers() {
        assert_eq!(scalar("2"), Value::from(2));
        assert_eq!(scalar("2.5"), Value::from(2.5));
        assert_eq!(scalar("fox"), Value::from("fox"));
        assert_eq!(scalar("NaN"), Value::from("NaN"));
    }
}
