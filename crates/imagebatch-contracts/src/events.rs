use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::bail;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line of the batch event log. The variant name becomes the `type` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    BatchStarted {
        total: usize,
        provider: String,
        record_path: String,
        previously_succeeded: usize,
    },
    ItemSkipped {
        identifier: String,
        destination: String,
    },
    ItemSucceeded {
        identifier: String,
        destination: String,
        requested_size: String,
        size: String,
        style: String,
        bytes: usize,
        sha256: String,
    },
    ItemFailed {
        identifier: String,
        destination: String,
        requested_size: String,
        size: Option<String>,
        style: String,
        error: String,
    },
    BatchFinished {
        total: u64,
        succeeded: u64,
        skipped: u64,
        failed: u64,
    },
}

/// Appends `BatchEvent`s to a JSONL file as `{type, batch_id, ts, ...fields}`.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    batch_id: String,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, batch_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            batch_id: batch_id.into(),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Writes one line and returns it as written.
    pub fn emit(&self, event: &BatchEvent) -> anyhow::Result<Value> {
        let Value::Object(fields) = serde_json::to_value(event)? else {
            bail!("batch event did not serialize to an object");
        };
        let mut line = Map::new();
        line.insert(
            "type".to_string(),
            fields.get("type").cloned().unwrap_or(Value::Null),
        );
        line.insert("batch_id".to_string(), Value::String(self.batch_id.clone()));
        line.insert("ts".to_string(), Value::String(now_utc_iso()));
        line.extend(fields.into_iter().filter(|(key, _)| key != "type"));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut text = serde_json::to_string(&line)?;
        text.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(text.as_bytes())?;
        Ok(Value::Object(line))
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::Value;

    use super::{BatchEvent, EventWriter};

    fn skipped(identifier: &str) -> BatchEvent {
        BatchEvent::ItemSkipped {
            identifier: identifier.to_string(),
            destination: format!("public/imgs/{identifier}"),
        }
    }

    #[test]
    fn lines_lead_with_type_batch_id_and_ts() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "batch-7");

        writer.emit(&skipped("hero.png"))?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        assert!(
            line.starts_with(r#"{"type":"item_skipped","batch_id":"batch-7","ts":""#),
            "{line}"
        );
        assert!(
            line.ends_with(r#""identifier":"hero.png","destination":"public/imgs/hero.png"}"#),
            "{line}"
        );
        let parsed: Value = serde_json::from_str(line)?;
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn written_lines_parse_back_into_events() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "batch-7");
        let events = vec![
            BatchEvent::BatchStarted {
                total: 2,
                provider: "dryrun".to_string(),
                record_path: "record.json".to_string(),
                previously_succeeded: 1,
            },
            skipped("logo.png"),
            BatchEvent::ItemFailed {
                identifier: "hero.png".to_string(),
                destination: "public/imgs/hero.png".to_string(),
                requested_size: "0x500".to_string(),
                size: None,
                style: "any".to_string(),
                error: "invalid input: zero width".to_string(),
            },
            BatchEvent::BatchFinished {
                total: 2,
                succeeded: 0,
                skipped: 1,
                failed: 1,
            },
        ];
        for event in &events {
            writer.emit(event)?;
        }

        let parsed = fs::read_to_string(&path)?
            .lines()
            .map(serde_json::from_str::<BatchEvent>)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(parsed, events);
        Ok(())
    }
}
