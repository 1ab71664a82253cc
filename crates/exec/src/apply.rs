//! The applier: the only component that mutates the working tree, and only
//! after the guard has passed a proposal.  Every overwrite leaves a
//! timestamped backup; rollback restores the newest one.

use std::path::{Path, PathBuf};

use chrono::Utc;
use ouro_guard::{ProtectList, normalize_ws};
use tracing::{info, warn};

pub const BACKUP_DIR: &str = "backups";

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("filename or code missing")]
    EmptyInput,
    #[error("🛡️ '{0}' is a protected file; refusing to write")]
    Protected(String),
    #[error("no change: '{0}' already has these contents")]
    NoChange(String),
    #[error("write verification failed for '{file}': size {written} vs {expected}")]
    VerifyFailed {
        file: String,
        written: usize,
        expected: usize,
    },
    #[error("no backup found for '{0}'")]
    NoBackup(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub filename: String,
    pub bytes: usize,
    /// Path of the pre-write backup; `None` when the file was newly created.
    pub backup: Option<PathBuf>,
}

pub struct Applier {
    base_path: PathBuf,
    backup_dir: PathBuf,
    protect: ProtectList,
}

impl Applier {
    pub fn new(base_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let backup_dir = base_path.join(BACKUP_DIR);
        std::fs::create_dir_all(&backup_dir)?;
        let protect = ProtectList::load(&base_path);
        Ok(Self {
            base_path,
            backup_dir,
            protect,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Write one proposed file: protected check, no-change check, backup,
    /// atomic write, verify.
    pub fn apply_update(&self, filename: &str, code: &str) -> Result<ApplyOutcome, ApplyError> {
        if filename.is_empty() || code.is_empty() {
            return Err(ApplyError::EmptyInput);
        }
        if self.protect.is_protected(filename) {
            return Err(ApplyError::Protected(filename.to_string()));
        }

        let target = self.base_path.join(filename);

        // Parent directories, plus an `__init__.py` stub when a new Python
        // package directory appears.
        if let Some(parent) = target.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
                if filename.ends_with(".py") && filename.contains('/') {
                    let init = parent.join("__init__.py");
                    if !init.exists() {
                        std::fs::write(&init, "# generated package\n")?;
                    }
                }
            }
        }

        // No-change and backup against the existing file.
        let mut backup = None;
        if target.exists() {
            let existing = std::fs::read_to_string(&target)?;
            if normalize_ws(&existing) == normalize_ws(code) {
                return Err(ApplyError::NoChange(filename.to_string()));
            }
            backup = Some(self.backup_file(filename, &target)?);
        }

        // Atomic write: tmp sibling, then rename into place.
        let tmp = target.with_extension(format!(
            "{}.tmp",
            target.extension().and_then(|e| e.to_str()).unwrap_or("new")
        ));
        std::fs::write(&tmp, code)?;
        std::fs::rename(&tmp, &target)?;

        // Verify by re-reading.
        let written = std::fs::read_to_string(&target)?;
        if written.len() != code.len() {
            return Err(ApplyError::VerifyFailed {
                file: filename.to_string(),
                written: written.len(),
                expected: code.len(),
            });
        }

        info!(file = filename, bytes = code.len(), backed_up = backup.is_some(), "update applied");
        Ok(ApplyOutcome {
            filename: filename.to_string(),
            bytes: code.len(),
            backup,
        })
    }

    fn backup_file(&self, filename: &str, target: &Path) -> std::io::Result<PathBuf> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S%.6f");
        let backup_rel = format!("{filename}.{stamp}.bak");
        let backup_path = self.backup_dir.join(&backup_rel);
        if let Some(parent) = backup_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(target, &backup_path)?;
        Ok(backup_path)
    }

    /// Restore the newest backup of `filename` into the working tree.
    pub fn rollback(&self, filename: &str) -> Result<PathBuf, ApplyError> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        let prefix = self.backup_dir.join(filename);
        let parent = prefix.parent().unwrap_or(&self.backup_dir);
        let stem = prefix
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Ok(entries) = std::fs::read_dir(parent) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with(&format!("{stem}.")) && name.ends_with(".bak") {
                    candidates.push(entry.path());
                }
            }
        }

        // Timestamped names sort chronologically; newest last.
        candidates.sort();
        let newest = candidates
            .pop()
            .ok_or_else(|| ApplyError::NoBackup(filename.to_string()))?;

        let target = self.base_path.join(filename);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&newest, &target)?;
        warn!(file = filename, backup = %newest.display(), "rolled back from backup");
        Ok(newest)
    }

    /// Roll back a batch of applied updates, newest-file backups first.
    /// Returns the files that could not be restored.
    pub fn rollback_all(&self, outcomes: &[ApplyOutcome]) -> Vec<String> {
        let mut failed = Vec::new();
        for outcome in outcomes {
            if outcome.backup.is_none() {
                // Newly created file: rolling back means removing it.
                let target = self.base_path.join(&outcome.filename);
                if let Err(err) = std::fs::remove_file(&target) {
                    warn!(file = %outcome.filename, %err, "could not remove created file");
                    failed.push(outcome.filename.clone());
                }
                continue;
            }
            if self.rollback(&outcome.filename).is_err() {
                failed.push(outcome.filename.clone());
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applier() -> (tempfile::TempDir, Applier) {
        let dir = tempfile::tempdir().unwrap();
        let applier = Applier::new(dir.path()).unwrap();
        (dir, applier)
    }

    #[test]
    fn creates_new_file_without_backup() {
        let (dir, applier) = applier();
        let outcome = applier
            .apply_update("nexus/ping.py", "def ping():\n    return 'pong'\n")
            .unwrap();
        assert!(outcome.backup.is_none());
        assert!(dir.path().join("nexus/ping.py").exists());
        // Package stub created alongside.
        assert!(dir.path().join("nexus/__init__.py").exists());
    }

    #[test]
    fn overwrite_leaves_backup_with_old_contents() {
        let (dir, applier) = applier();
        applier.apply_update("mod.py", "version = 1\n").unwrap();
        let outcome = applier.apply_update("mod.py", "version = 2\n").unwrap();

        let backup = outcome.backup.unwrap();
        assert!(backup.starts_with(dir.path().join(BACKUP_DIR)));
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "version = 1\n");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("mod.py")).unwrap(),
            "version = 2\n"
        );
    }

    #[test]
    fn identical_contents_are_refused() {
        let (_dir, applier) = applier();
        applier.apply_update("same.py", "x = 1\n").unwrap();
        let err = applier.apply_update("same.py", "x  =  1\n").unwrap_err();
        assert!(matches!(err, ApplyError::NoChange(_)));
        // No backup was created for the refused write.
        assert!(matches!(
            applier.rollback("same.py").unwrap_err(),
            ApplyError::NoBackup(_)
        ));
    }

    #[test]
    fn protected_files_are_refused() {
        let (_dir, applier) = applier();
        let err = applier.apply_update("main.py", "print(1)\n").unwrap_err();
        assert!(matches!(err, ApplyError::Protected(_)));
    }

    #[test]
    fn rollback_restores_newest_backup() {
        let (dir, applier) = applier();
        applier.apply_update("f.py", "v = 1\n").unwrap();
        applier.apply_update("f.py", "v = 2\n").unwrap();
        applier.apply_update("f.py", "v = 3\n").unwrap();

        applier.rollback("f.py").unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.py")).unwrap(),
            "v = 2\n"
        );
    }

    #[test]
    fn rollback_all_restores_tree_to_pre_apply_state() {
        let (dir, applier) = applier();
        applier.apply_update("a.py", "a = 1\n").unwrap();

        let outcomes = vec![
            applier.apply_update("a.py", "a = 2\n").unwrap(),
            applier.apply_update("b.py", "b = 1\n").unwrap(),
        ];
        let failed = applier.rollback_all(&outcomes);
        assert!(failed.is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "a = 1\n"
        );
        // The newly created file is gone again.
        assert!(!dir.path().join("b.py").exists());
    }

    #[test]
    fn subdirectory_backups_mirror_the_relpath() {
        let (dir, applier) = applier();
        applier.apply_update("pkg/deep/mod.py", "v = 1\n").unwrap();
        applier.apply_update("pkg/deep/mod.py", "v = 2\n").unwrap();

        let backup_parent = dir.path().join(BACKUP_DIR).join("pkg/deep");
        let count = std::fs::read_dir(backup_parent).unwrap().count();
        assert_eq!(count, 1);
    }
}
