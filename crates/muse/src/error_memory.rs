//! Persistent memory of past coder failures, keyed by target file.  The
//! hints feed back into the coder prompt so the same mistake is not
//! repeated attempt after attempt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ERROR_MEMORY_FILE: &str = "error_memory.json";

/// Per-file history cap; only the freshest failures matter.
const PER_FILE_CAP: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_type: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    pub count: u32,
}

#[derive(Debug, Default)]
pub struct ErrorMemory {
    path: PathBuf,
    records: HashMap<String, Vec<ErrorRecord>>,
}

impl ErrorMemory {
    pub fn open(base_path: impl AsRef<Path>) -> Self {
        let path = base_path.as_ref().join(ERROR_MEMORY_FILE);
        let records = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { path, records }
    }

    /// Record a failure for one target file.  Repeats of the same error
    /// type bump the count instead of appending.
    pub fn record_error(&mut self, file: &str, error_type: &str, detail: &str) {
        let entries = self.records.entry(file.to_string()).or_default();

        if let Some(existing) = entries.iter_mut().find(|e| e.error_type == error_type) {
            existing.count += 1;
            existing.detail = detail.chars().take(200).collect();
            existing.timestamp = Utc::now();
        } else {
            entries.push(ErrorRecord {
                error_type: error_type.to_string(),
                detail: detail.chars().take(200).collect(),
                timestamp: Utc::now(),
                count: 1,
            });
            if entries.len() > PER_FILE_CAP {
                entries.remove(0);
            }
        }

        self.persist();
    }

    /// Prompt hints for a set of target files; empty when there is no
    /// relevant failure history.
    pub fn hints_for(&self, files: &[String]) -> String {
        let mut hints = Vec::new();
        for file in files {
            if let Some(entries) = self.records.get(file) {
                for entry in entries {
                    hints.push(format!(
                        "- {file}: {} (seen {}×) — {}",
                        entry.error_type, entry.count, entry.detail
                    ));
                }
            }
        }
        hints.join("\n")
    }

    fn persist(&self) {
        let rendered = match serde_json::to_string_pretty(&self.records) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(%err, "error memory serialisation failed");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, rendered) {
            warn!(%err, path = %self.path.display(), "error memory save failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_errors_bump_the_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = ErrorMemory::open(dir.path());
        memory.record_error("a.py", "SyntaxError", "unexpected indent");
        memory.record_error("a.py", "SyntaxError", "unexpected indent again");

        let hints = memory.hints_for(&["a.py".to_string()]);
        assert!(hints.contains("seen 2×"));
        assert!(hints.contains("again"));
    }

    #[test]
    fn hints_are_scoped_to_requested_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = ErrorMemory::open(dir.path());
        memory.record_error("a.py", "SyntaxError", "x");
        memory.record_error("b.py", "ImportError", "y");

        let hints = memory.hints_for(&["b.py".to_string()]);
        assert!(hints.contains("b.py"));
        assert!(!hints.contains("a.py"));
        assert!(memory.hints_for(&["c.py".to_string()]).is_empty());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut memory = ErrorMemory::open(dir.path());
            memory.record_error("mod.py", "SyntaxError", "broken");
        }
        let memory = ErrorMemory::open(dir.path());
        assert!(memory.hints_for(&["mod.py".to_string()]).contains("broken"));
    }
}
