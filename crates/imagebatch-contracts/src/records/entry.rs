use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known outcome for one identifier.
///
/// `error` is `Some` exactly when `status` is `Failed`; the constructors keep
/// that pairing. Keys this crate does not know about are carried through
/// `extra` so rewriting a record never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub last_attempt: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl RecordEntry {
    pub fn success(style: Option<String>) -> Self {
        Self {
            status: RecordStatus::Success,
            style,
            last_attempt: now_utc_iso(),
            error: None,
            extra: Map::new(),
        }
    }

    pub fn failed(style: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: RecordStatus::Failed,
            style,
            last_attempt: now_utc_iso(),
            error: Some(message.into()),
            extra: Map::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

/// Identifier -> last outcome, in first-seen order.
pub type GenerationRecord = IndexMap<String, RecordEntry>;
