//! Handler results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Outcome of one handler run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    pub success: bool,
    pub details: Map<String, Value>,
}

impl TaskResults {
    pub fn success() -> Self {
        Self {
            success: true,
            details: Map::new(),
        }
    }

    /// Successful run that did nothing, with the reason in `details.msg`.
    pub fn skipped(msg: impl Into<String>) -> Self {
        Self::success().with("msg", json!(msg.into()))
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            details: Map::new(),
        }
        .with("msg", json!(msg.into()))
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn msg(&self) -> Option<&str> {
        self.details.get("msg").and_then(|m| m.as_str())
    }
}
