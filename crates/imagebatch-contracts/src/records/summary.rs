use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub batch_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RunSummary {
    pub fn accounted(&self) -> u64 {
        self.succeeded + self.skipped + self.failed
    }

    pub fn is_balanced(&self) -> bool {
        self.accounted() == self.total
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

pub fn write_summary(
    path: &Path,
    summary: &RunSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(summary)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}
