//! Converts typed records to/from the stringified hash fields the store persists
//! (§6.5: "All job fields (values stringified)").

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{BrokerError, BrokerResult};

/// Flattens a serializable record into `field -> stringified value` pairs. Scalars
/// serialize to their plain string form (no surrounding quotes); nested
/// objects/arrays serialize to their JSON text. `null` fields are omitted so a
/// partial hash read back with [`from_hash`] reconstructs `None`/defaults correctly.
pub fn to_hash<T: Serialize>(value: &T) -> BrokerResult<HashMap<String, String>> {
    let json = serde_json::to_value(value)
        .map_err(|e| BrokerError::Worker(broker_resilience::WorkerError::Serialization(e)))?;
    let Value::Object(map) = json else {
        return Err(BrokerError::NotFound(
            "expected a JSON object to flatten into a hash".to_string(),
        ));
    };

    let mut fields = HashMap::with_capacity(map.len());
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let stringified = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        fields.insert(key, stringified);
    }
    Ok(fields)
}

/// Reconstructs a typed record from a stringified hash. Each value is re-parsed as
/// JSON first (so numbers, bools and nested objects round-trip); if that fails it is
/// kept as a plain JSON string, which is what [`to_hash`] produced for string fields.
pub fn from_hash<T: DeserializeOwned>(fields: HashMap<String, String>) -> BrokerResult<T> {
    let mut map = serde_json::Map::with_capacity(fields.len());
    for (key, raw) in fields {
        let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        map.insert(key, value);
    }
    serde_json::from_value(Value::Object(map))
        .map_err(|e| BrokerError::Worker(broker_resilience::WorkerError::Serialization(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_model::{Job, JobSpec};

    #[test]
    fn job_round_trips_through_a_stringified_hash() {
        let job = Job::from_spec("j-1", JobSpec::new("sim", serde_json::json!({"a": 1})), 1_000);
        let fields = to_hash(&job).unwrap();
        assert_eq!(fields.get("id"), Some(&"j-1".to_string()));
        assert_eq!(fields.get("status"), Some(&"pending".to_string()));
        assert!(!fields.contains_key("worker_id")); // None omitted

        let restored: Job = from_hash(fields).unwrap();
        assert_eq!(restored, job);
    }
}
