//! Whole-file JSON persistence for the fact store, with recovery from a
//! truncated or garbage-suffixed file, plus the generated `ROADMAP.md`.

use std::fs;

use serde_json::Value;
use tracing::{info, warn};

use crate::FactCore;

impl FactCore {
    pub(crate) fn load_or_init(&mut self) {
        let path = self.fact_path().to_path_buf();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.save_facts();
                return;
            }
            Err(err) => {
                warn!(%err, path = %path.display(), "fact store unreadable; using defaults");
                self.save_facts();
                return;
            }
        };

        if raw.trim().is_empty() {
            warn!(path = %path.display(), "fact store empty; re-seeding defaults");
            self.save_facts();
            return;
        }

        let parsed = parse_with_recovery(&raw);
        match parsed {
            Some(Value::Object(saved)) => {
                // Loaded facts layer over the defaults: nested objects merge
                // shallowly so new default keys survive old snapshots.
                for (key, value) in saved {
                    let merge = value.is_object()
                        && matches!(self.facts().get(&key), Some(Value::Object(_)));
                    if merge {
                        if let (Some(Value::Object(existing)), Value::Object(incoming)) =
                            (self.facts_mut().get_mut(&key), value)
                        {
                            for (k, v) in incoming {
                                existing.insert(k, v);
                            }
                        }
                    } else {
                        self.facts_mut().insert(key, value);
                    }
                }
            }
            Some(_) | None => {
                warn!(path = %path.display(), "fact store unrecoverable; using defaults");
                self.save_facts();
            }
        }
    }

    /// Persist the whole store, regenerate `ROADMAP.md` and rebuild the
    /// graph.  Write is atomic (tmp + rename) so a crash mid-save leaves
    /// the previous snapshot intact.
    pub fn save_facts(&mut self) {
        let path = self.fact_path().to_path_buf();
        let rendered = match serde_json::to_string_pretty(&Value::Object(self.facts().clone())) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(%err, "fact store serialisation failed");
                return;
            }
        };

        let tmp = path.with_extension("json.tmp");
        let result = fs::write(&tmp, rendered).and_then(|()| fs::rename(&tmp, &path));
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp);
            warn!(%err, path = %path.display(), "fact store save failed");
            return;
        }

        self.write_roadmap_md();
        self.build_graph();
    }

    fn write_roadmap_md(&self) {
        let version = self
            .get_fact_str(&["identity", "version"])
            .unwrap_or("unknown")
            .to_string();
        let body = format!(
            "# 🗺️ Evolution Roadmap\n\nEngine version: {version}\n{}\n\n---\n*Generated from fact_core.json; do not edit by hand.*\n",
            self.formatted_roadmap()
        );
        let target = self.base_path().join("ROADMAP.md");
        if let Err(err) = fs::write(&target, body) {
            warn!(%err, "ROADMAP.md write failed");
        }
    }
}

/// Parse JSON, recovering from trailing garbage by truncating at the last
/// `}` or `]` before the failure point and retrying.
fn parse_with_recovery(raw: &str) -> Option<Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(_) => {
            let cut = raw.rfind('}').max(raw.rfind(']'))?;
            let truncated = &raw[..=cut];
            match serde_json::from_str(truncated) {
                Ok(value) => {
                    info!("fact store recovered by truncating trailing garbage");
                    Some(value)
                }
                Err(_) => {
                    // Walk back through closing braces until one parses.
                    let mut end = cut;
                    while let Some(prev) = raw[..end].rfind('}') {
                        if let Ok(value) = serde_json::from_str::<Value>(&raw[..=prev]) {
                            info!("fact store recovered at earlier brace");
                            return Some(value);
                        }
                        end = prev;
                    }
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FACT_FILE, FactCore};
    use serde_json::json;

    #[test]
    fn recovers_from_trailing_garbage() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut core = FactCore::open(dir.path());
            core.add_fact("marker", json!({"value": 7}));
        }
        // Corrupt the file with a partial duplicate append.
        let path = dir.path().join(FACT_FILE);
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("\n{\"broken\": tr");
        std::fs::write(&path, raw).unwrap();

        let core = FactCore::open(dir.path());
        assert_eq!(core.get_fact(&["marker", "value"]), Some(&json!(7)));
    }

    #[test]
    fn empty_file_reseeds_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FACT_FILE), "   ").unwrap();
        let core = FactCore::open(dir.path());
        assert_eq!(core.get_fact_str(&["identity", "name"]), Some("Ouro"));
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FACT_FILE), "complete nonsense").unwrap();
        let core = FactCore::open(dir.path());
        assert_eq!(core.get_fact_str(&["identity", "name"]), Some("Ouro"));
    }

    #[test]
    fn loaded_objects_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(FACT_FILE),
            r#"{"identity": {"name": "Custom"}}"#,
        )
        .unwrap();
        let core = FactCore::open(dir.path());
        assert_eq!(core.get_fact_str(&["identity", "name"]), Some("Custom"));
        // Default keys of the same object survive the merge.
        assert!(core.get_fact(&["identity", "version"]).is_some());
    }

    #[test]
    fn parse_with_recovery_handles_clean_json() {
        assert_eq!(
            parse_with_recovery(r#"{"a": 1}"#),
            Some(json!({"a": 1}))
        );
        assert!(parse_with_recovery("not json at all").is_none());
    }
}
