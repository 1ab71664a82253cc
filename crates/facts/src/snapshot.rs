//! Working-tree snapshot: the `--- FILE: … ---` block dump handed to the
//! dreamer.  Protected files are elided, oversize bodies truncated.

use std::path::Path;

use ouro_guard::ProtectList;
use serde_json::Value;
use walkdir::WalkDir;

/// Per-file body cap inside the snapshot.
const SNAPSHOT_FILE_CAP: usize = 15_000;

const INCLUDED_EXTENSIONS: &[&str] = &["py", "md", "txt", "json", "toml"];

const SKIPPED_DIRS: &[&str] = &[
    "backups",
    ".git",
    "__pycache__",
    ".ain_cache",
    "data",
    "target",
    "node_modules",
];

impl crate::FactCore {
    /// Emit the full system snapshot used as dreamer context.
    pub fn system_snapshot(&self) -> String {
        let protect = ProtectList::load(self.base_path());

        let mut snapshot = String::from("=== SYSTEM SNAPSHOT ===\n");
        snapshot.push_str(&format!(
            "Roadmap Progress: {}\n",
            self.get_fact_str(&["roadmap", "current_focus"]).unwrap_or("unset")
        ));
        if let Some(guide) = self.get_fact(&["architecture_guide"]) {
            snapshot.push_str(&format!(
                "Architecture Guide: {}\n",
                serde_json::to_string_pretty(guide).unwrap_or_default()
            ));
        }
        if let Some(lessons) = self.get_fact(&["lessons_learned"]) {
            snapshot.push_str(&format!(
                "Lessons Learned: {}\n",
                serde_json::to_string_pretty(lessons).unwrap_or_default()
            ));
        }

        for entry in WalkDir::new(self.base_path())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e.path()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let Ok(rel) = entry.path().strip_prefix(self.base_path()) else {
                continue;
            };
            let rel_str = rel.to_string_lossy().replace('\\', "/");

            if protect.is_protected(&rel_str) {
                snapshot.push_str(&format!("\n--- FILE: {rel_str} (🔒 PROTECTED) ---\n"));
                snapshot.push_str("# [PROTECTED] Managed by the operator only.\n");
                snapshot.push_str("# The engine cannot and must not modify this file.\n");
                continue;
            }

            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            if !INCLUDED_EXTENSIONS.contains(&ext) {
                continue;
            }

            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let body = if content.len() > SNAPSHOT_FILE_CAP {
                let mut cut = SNAPSHOT_FILE_CAP;
                while cut > 0 && !content.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}\n... (truncated)", &content[..cut])
            } else {
                content
            };
            snapshot.push_str(&format!("\n--- FILE: {rel_str} ---\n{body}\n"));
        }

        snapshot
    }

    /// Actual line counts of source files under the main packages; handed to
    /// the dreamer so it cannot hallucinate file sizes.
    pub fn file_sizes_info(&self) -> String {
        let mut lines = vec!["[📊 Actual file sizes — trust this, do not guess]".to_string()];

        for entry in WalkDir::new(self.base_path())
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e.path()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            let Ok(rel) = path.strip_prefix(self.base_path()) else {
                continue;
            };
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };
            let count = content.lines().count();
            let tag = if count > 150 { "⚠️ large" } else { "✅ small" };
            lines.push(format!(
                "  - {}: {count} lines {tag}",
                rel.to_string_lossy().replace('\\', "/")
            ));
        }

        lines.join("\n")
    }

    /// Five most recent evolution summaries from a journal value, rendered
    /// for prompt context.  Takes the raw journal array so this crate stays
    /// independent of the memory layer.
    pub fn summarize_recent(records: &[Value], limit: usize) -> String {
        let recent: Vec<&Value> = records.iter().rev().take(limit).collect();
        if recent.is_empty() {
            return "none".to_string();
        }
        recent
            .iter()
            .map(|r| {
                format!(
                    "- {}: {}",
                    r.get("file").and_then(Value::as_str).unwrap_or("unknown"),
                    r.get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .chars()
                        .take(100)
                        .collect::<String>()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| SKIPPED_DIRS.contains(&name) || (name.starts_with('.') && name.len() > 1))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use crate::FactCore;
    use serde_json::json;

    #[test]
    fn snapshot_includes_files_and_elides_protected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print('supervisor')\n").unwrap();
        std::fs::create_dir_all(dir.path().join("nexus")).unwrap();
        std::fs::write(dir.path().join("nexus/ping.py"), "def ping():\n    return 'pong'\n")
            .unwrap();
        std::fs::write(dir.path().join("binary.bin"), [0u8, 1, 2]).unwrap();

        let core = FactCore::open(dir.path());
        let snapshot = core.system_snapshot();

        assert!(snapshot.contains("--- FILE: nexus/ping.py ---"));
        assert!(snapshot.contains("return 'pong'"));
        assert!(snapshot.contains("--- FILE: main.py (🔒 PROTECTED) ---"));
        assert!(!snapshot.contains("print('supervisor')"));
        assert!(!snapshot.contains("binary.bin"));
    }

    #[test]
    fn snapshot_truncates_oversize_files() {
        let dir = tempfile::tempdir().unwrap();
        let huge = "x = 1\n".repeat(5000); // 30k chars
        std::fs::write(dir.path().join("huge.py"), &huge).unwrap();

        let core = FactCore::open(dir.path());
        let snapshot = core.system_snapshot();
        assert!(snapshot.contains("... (truncated)"));
        assert!(snapshot.len() < huge.len() + 4000);
    }

    #[test]
    fn skips_backup_and_cache_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("backups")).unwrap();
        std::fs::write(dir.path().join("backups/old.py"), "old = 1\n").unwrap();

        let core = FactCore::open(dir.path());
        assert!(!core.system_snapshot().contains("old.py"));
    }

    #[test]
    fn file_sizes_reports_line_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tiny.py"), "a = 1\n").unwrap();
        let core = FactCore::open(dir.path());
        let info = core.file_sizes_info();
        assert!(info.contains("tiny.py: 1 lines"));
    }

    #[test]
    fn summarize_recent_renders_newest_first() {
        let records = vec![
            json!({"file": "a.py", "description": "first"}),
            json!({"file": "b.py", "description": "second"}),
        ];
        let summary = FactCore::summarize_recent(&records, 5);
        let a_pos = summary.find("a.py").unwrap();
        let b_pos = summary.find("b.py").unwrap();
        assert!(b_pos < a_pos);
    }
}
