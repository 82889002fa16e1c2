// src/store/model.rs

//! On-disk document of the context store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// A produced output registered by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub owner: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// Full state of a context store.
///
/// ```json
/// {
///   "version": 3,
///   "data": { "plan": { "steps": 2 } },
///   "events": [{ "kind": "task_completed", "payload": {}, "timestamp": "..." }],
///   "artifacts": [{ "owner": "backend", "location": "out/api.rs", "timestamp": "..." }]
/// }
/// ```
///
/// `version` is bumped once per mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}
