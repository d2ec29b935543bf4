//! Bridges typed checkpoint payloads and the `serde_json::Value` shape
//! [`crate::traits::Checkpointer`] stores.
//!
//! Keeping this as a trait rather than a free function pair lets a future
//! backend swap in a different wire format (e.g. a compact binary one for a
//! high-churn store) without changing `Checkpointer`'s signature, which
//! stays JSON-shaped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub trait CheckpointSerializer: Send + Sync {
    fn to_value<T: Serialize>(&self, payload: &T) -> Result<Value>;
    fn from_value<T: for<'de> Deserialize<'de>>(&self, value: Value) -> Result<T>;
}

/// The default (and, for now, only) serializer: a straight JSON round-trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCheckpointSerializer;

impl CheckpointSerializer for JsonCheckpointSerializer {
    fn to_value<T: Serialize>(&self, payload: &T) -> Result<Value> {
        Ok(serde_json::to_value(payload)?)
    }

    fn from_value<T: for<'de> Deserialize<'de>>(&self, value: Value) -> Result<T> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        run_id: String,
        step: i32,
    }

    #[test]
    fn round_trips_through_json_value() {
        let serializer = JsonCheckpointSerializer;
        let payload = Payload { run_id: "run-1".into(), step: 3 };

        let value = serializer.to_value(&payload).unwrap();
        let restored: Payload = serializer.from_value(value).unwrap();

        assert_eq!(payload, restored);
    }

    #[test]
    fn rejects_shape_mismatch() {
        let serializer = JsonCheckpointSerializer;
        let err = serializer.from_value::<Payload>(serde_json::json!("not an object")).unwrap_err();
        assert!(matches!(err, crate::error::CheckpointError::Serialization(_)));
    }
}
