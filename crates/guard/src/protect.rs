//! Protected-file policy.  The hard core below is compiled in and cannot be
//! removed by the evolving tree; `.ainprotect` extends it with one filename
//! per line (`#` comments allowed).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Files no proposal may touch, regardless of quality.
const CORE_PROTECTED: &[&str] = &[
    "main.py",
    "api/keys.py",
    "api/github.py",
    ".ainprotect",
    "docs/hardware-catalog.md",
];

#[derive(Debug, Clone)]
pub struct ProtectList {
    base_path: PathBuf,
    entries: HashSet<String>,
}

impl ProtectList {
    /// Load the policy for a working tree: the compiled-in core plus the
    /// tree's own `.ainprotect` file.
    pub fn load(base_path: impl AsRef<Path>) -> Self {
        let base_path = base_path.as_ref().to_path_buf();
        let mut entries: HashSet<String> =
            CORE_PROTECTED.iter().map(|s| s.to_string()).collect();

        let protect_file = base_path.join(".ainprotect");
        match fs::read_to_string(&protect_file) {
            Ok(raw) => {
                for line in raw.lines() {
                    // Strip trailing comments, keep the filename.
                    let name = line.split('#').next().unwrap_or("").trim();
                    if !name.is_empty() {
                        entries.insert(name.to_string());
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(%err, path = %protect_file.display(), "failed to read .ainprotect"),
        }

        Self { base_path, entries }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path-normalised membership test.  Basename rules cover the supervisor
    /// entry point and the protection file itself wherever they appear, and
    /// the credential/sync modules anywhere under `api/`.
    pub fn is_protected(&self, filename: &str) -> bool {
        if filename.is_empty() {
            return false;
        }

        let normalized = normalize(filename);
        if self.entries.contains(&normalized) {
            return true;
        }

        let basename = normalized.rsplit('/').next().unwrap_or(&normalized);
        if basename == "main.py" || basename == ".ainprotect" {
            return true;
        }
        if normalized.contains("api/") && (basename == "keys.py" || basename == "github.py") {
            return true;
        }

        false
    }
}

fn normalize(filename: &str) -> String {
    filename
        .trim_start_matches("./")
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> ProtectList {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ProtectList::load(dir.path());
        // tempdir dropped; list only needs the in-memory set for these tests
        loaded
    }

    #[test]
    fn core_files_are_protected() {
        let protect = list();
        assert!(protect.is_protected("main.py"));
        assert!(protect.is_protected("./main.py"));
        assert!(protect.is_protected("api/keys.py"));
        assert!(protect.is_protected("api/github.py"));
        assert!(protect.is_protected(".ainprotect"));
        assert!(protect.is_protected("docs/hardware-catalog.md"));
    }

    #[test]
    fn basename_rules_apply_in_subdirs() {
        let protect = list();
        assert!(protect.is_protected("some/dir/main.py"));
        assert!(protect.is_protected("nested/api/keys.py"));
        assert!(!protect.is_protected("api/telegram.py"));
    }

    #[test]
    fn ordinary_files_pass() {
        let protect = list();
        assert!(!protect.is_protected("engine/core.py"));
        assert!(!protect.is_protected("nexus/ping.py"));
        assert!(!protect.is_protected(""));
    }

    #[test]
    fn ainprotect_file_extends_the_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".ainprotect"),
            "# comment line\ncustom/secret.py  # keep out\n\nother.txt\n",
        )
        .unwrap();
        let protect = ProtectList::load(dir.path());
        assert!(protect.is_protected("custom/secret.py"));
        assert!(protect.is_protected("other.txt"));
        assert!(!protect.is_protected("custom/open.py"));
    }
}
