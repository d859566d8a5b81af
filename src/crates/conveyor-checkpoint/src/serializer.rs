//! Blackboard serialization
//!
//! The store treats the blackboard as an opaque string; this module owns the
//! encoding. [`BlackboardSerializer`] keeps the codec pluggable, and
//! [`JsonSerializer`] is the default - the blackboard doubles as an
//! audit/debugging artifact, so a human-readable encoding wins over a
//! binary one.

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

/// Pluggable codec for checkpoint blackboards
pub trait BlackboardSerializer: Send + Sync {
    /// Encode a value to the stored payload
    fn dumps<T: Serialize>(&self, value: &T) -> Result<String>;

    /// Decode a stored payload
    fn loads<T: DeserializeOwned>(&self, payload: &str) -> Result<T>;
}

/// JSON blackboard codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Create a new JSON serializer
    pub fn new() -> Self {
        Self
    }
}

impl BlackboardSerializer for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn loads<T: DeserializeOwned>(&self, payload: &str) -> Result<T> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn json_round_trip() {
        let serializer = JsonSerializer::new();
        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        let payload = serializer.dumps(&data).unwrap();
        let restored: TestData = serializer.loads(&payload).unwrap();
        assert_eq!(data, restored);
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let serializer = JsonSerializer::new();
        let result: Result<TestData> = serializer.loads("not json at all");
        assert!(result.is_err());
    }
}
