use std::collections::HashMap;
use std::path::{Path, PathBuf};

use imagebatch_engine::ReplicateConfig;

/// Process environment first, then the optional dotenv file. Nothing is
/// written back into the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    dotenv: HashMap<String, String>,
}

impl EnvSource {
    pub fn load(dotenv_path: Option<&Path>) -> Self {
        let dotenv = dotenv_path
            .filter(|path| path.exists())
            .map(parse_dotenv)
            .unwrap_or_default();
        Self { dotenv }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.dotenv.get(key).cloned())
    }

    pub fn replicate_config(&self) -> ReplicateConfig {
        ReplicateConfig::from_lookup(|key| self.get(key))
    }
}

pub fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    parse_dotenv_str(&content)
}

fn parse_dotenv_str(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let unquoted = ['"', '\'']
            .iter()
            .find_map(|quote| {
                value
                    .strip_prefix(*quote)
                    .and_then(|rest| rest.strip_suffix(*quote))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), unquoted.to_string());
    }
    vars
}

/// `dir/stem.<suffix>` next to the record file.
pub fn sibling_path(record: &Path, suffix: &str) -> PathBuf {
    let stem = record
        .file_stem()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("generation_record");
    record.with_file_name(format!("{stem}.{suffix}"))
}
