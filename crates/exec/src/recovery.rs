//! Crash recovery for the supervisor: a strategy chain where the first
//! success wins, anchored by the `ain-stable` tag and the backup directory.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::apply::BACKUP_DIR;
use crate::git::run_git;

/// Stable-snapshot tag marking the last known-good engine state.
pub const STABLE_TAG: &str = "ain-stable";

/// How many of the freshest backups the last-resort strategy restores.
const BACKUP_RESTORE_COUNT: usize = 5;

#[derive(Debug)]
pub struct RecoveryReport {
    pub success: bool,
    pub strategy: String,
    pub detail: String,
}

async fn setup_safe_directory(workdir: &Path) {
    let dir_str = workdir.to_string_lossy().to_string();
    let _ = run_git(workdir, &["config", "--global", "--add", "safe.directory", &dir_str]).await;
}

async fn fetch_and_reset_to_origin(workdir: &Path, branch: &str) -> Result<String, String> {
    let (ok, output) = run_git(workdir, &["fetch", "--force", "origin", branch]).await;
    if !ok {
        return Err(format!("fetch failed: {output}"));
    }
    let target = format!("origin/{branch}");
    let (ok, output) = run_git(workdir, &["reset", "--hard", &target]).await;
    if !ok {
        return Err(format!("reset failed: {output}"));
    }
    Ok(format!("reset to {target}"))
}

async fn rollback_to_previous_commit(workdir: &Path) -> Result<String, String> {
    let (ok, output) = run_git(workdir, &["reset", "--hard", "HEAD~1"]).await;
    if ok {
        Ok("reset to HEAD~1".to_string())
    } else {
        Err(format!("HEAD~1 reset failed: {output}"))
    }
}

async fn rollback_to_stable_tag(workdir: &Path) -> Result<String, String> {
    let (ok, output) = run_git(workdir, &["tag", "-l", STABLE_TAG]).await;
    if !ok || !output.contains(STABLE_TAG) {
        return Err(format!("tag '{STABLE_TAG}' does not exist"));
    }
    let (ok, output) = run_git(workdir, &["reset", "--hard", STABLE_TAG]).await;
    if ok {
        Ok(format!("reset to tag '{STABLE_TAG}'"))
    } else {
        Err(format!("tag reset failed: {output}"))
    }
}

/// Collect every `.bak` under the backup dir, newest mtime first.
fn backups_by_mtime(backup_dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<(std::time::SystemTime, PathBuf)> = walkdir::WalkDir::new(backup_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("bak"))
        .filter_map(|e| {
            let mtime = e.metadata().ok()?.modified().ok()?;
            Some((mtime, e.path().to_path_buf()))
        })
        .collect();
    found.sort_by(|a, b| b.0.cmp(&a.0));
    found.into_iter().map(|(_, p)| p).collect()
}

/// Derive the original relative path from a backup path:
/// `backups/<relpath>.<stamp>.bak` → `<relpath>`.  The stamp itself may
/// contain dots (fractional seconds), so every trailing numeric segment is
/// stripped.
fn original_path_of(backup_dir: &Path, backup: &Path) -> Option<PathBuf> {
    let rel = backup.strip_prefix(backup_dir).ok()?;
    let name = rel.file_name()?.to_string_lossy().to_string();
    let mut remaining = name.strip_suffix(".bak")?;
    while let Some((head, tail)) = remaining.rsplit_once('.') {
        let numeric = !tail.is_empty()
            && tail.chars().all(|c| c.is_ascii_digit() || c == '_');
        if numeric {
            remaining = head;
        } else {
            break;
        }
    }
    if remaining.is_empty() {
        return None;
    }
    Some(rel.with_file_name(remaining))
}

/// Last resort: copy the freshest backups over their originals.
fn rollback_via_backups(workdir: &Path) -> Result<String, String> {
    let backup_dir = workdir.join(BACKUP_DIR);
    if !backup_dir.exists() {
        return Err("no backup directory".to_string());
    }

    let backups = backups_by_mtime(&backup_dir);
    if backups.is_empty() {
        return Err("no backup files".to_string());
    }

    let mut restored = Vec::new();
    for backup in backups.iter().take(BACKUP_RESTORE_COUNT) {
        let Some(rel) = original_path_of(&backup_dir, backup) else {
            continue;
        };
        let target = workdir.join(&rel);
        if let Some(parent) = target.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::copy(backup, &target) {
            Ok(_) => restored.push(rel.to_string_lossy().to_string()),
            Err(err) => warn!(backup = %backup.display(), %err, "backup restore failed"),
        }
    }

    if restored.is_empty() {
        Err("backup restoration restored nothing".to_string())
    } else {
        Ok(format!("restored from backups: {}", restored.join(", ")))
    }
}

/// Run the strategy chain; the first success wins.
pub async fn smart_rollback(workdir: &Path, branch: &str) -> RecoveryReport {
    setup_safe_directory(workdir).await;

    // First success wins; later strategies must not run once one lands.
    match fetch_and_reset_to_origin(workdir, branch).await {
        Ok(detail) => {
            info!(strategy = "fetch+reset origin", %detail, "recovery succeeded");
            return RecoveryReport {
                success: true,
                strategy: "fetch+reset origin".to_string(),
                detail,
            };
        }
        Err(detail) => warn!(strategy = "fetch+reset origin", %detail, "recovery strategy failed"),
    }
    match rollback_to_previous_commit(workdir).await {
        Ok(detail) => {
            info!(strategy = "reset HEAD~1", %detail, "recovery succeeded");
            return RecoveryReport {
                success: true,
                strategy: "reset HEAD~1".to_string(),
                detail,
            };
        }
        Err(detail) => warn!(strategy = "reset HEAD~1", %detail, "recovery strategy failed"),
    }
    match rollback_to_stable_tag(workdir).await {
        Ok(detail) => {
            info!(strategy = "reset stable tag", %detail, "recovery succeeded");
            return RecoveryReport {
                success: true,
                strategy: "reset stable tag".to_string(),
                detail,
            };
        }
        Err(detail) => warn!(strategy = "reset stable tag", %detail, "recovery strategy failed"),
    }

    match rollback_via_backups(workdir) {
        Ok(detail) => RecoveryReport {
            success: true,
            strategy: "backup restore".to_string(),
            detail,
        },
        Err(detail) => RecoveryReport {
            success: false,
            strategy: "exhausted".to_string(),
            detail,
        },
    }
}

/// Re-point the stable tag at HEAD; called after a healthy engine boot.
pub async fn mark_stable(workdir: &Path) -> bool {
    setup_safe_directory(workdir).await;
    let _ = run_git(workdir, &["tag", "-d", STABLE_TAG]).await;
    let (ok, output) = run_git(workdir, &["tag", STABLE_TAG]).await;
    if !ok {
        warn!(%output, "stable tag update failed");
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_path_round_trips_to_original() {
        let backup_dir = Path::new("/ws/backups");
        let backup = Path::new("/ws/backups/engine/core.py.20250101_120000.123456.bak");
        let original = original_path_of(backup_dir, backup).unwrap();
        assert_eq!(original, PathBuf::from("engine/core.py"));

        let top = Path::new("/ws/backups/mod.py.20250101_000000.000001.bak");
        assert_eq!(
            original_path_of(backup_dir, top).unwrap(),
            PathBuf::from("mod.py")
        );
    }

    #[test]
    fn backups_sorted_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let backup_dir = dir.path().join(BACKUP_DIR);
        std::fs::create_dir_all(&backup_dir).unwrap();

        for (name, age_secs) in [("old.py.1.bak", 100), ("new.py.2.bak", 0)] {
            let path = backup_dir.join(name);
            std::fs::write(&path, "content").unwrap();
            let mtime = std::time::SystemTime::now() - std::time::Duration::from_secs(age_secs);
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(mtime).unwrap();
        }

        let sorted = backups_by_mtime(&backup_dir);
        assert_eq!(sorted.len(), 2);
        assert!(sorted[0].ends_with("new.py.2.bak"));
    }

    #[test]
    fn backup_restore_copies_files_back() {
        let dir = tempfile::tempdir().unwrap();
        let backup_dir = dir.path().join(BACKUP_DIR);
        std::fs::create_dir_all(backup_dir.join("engine")).unwrap();
        std::fs::write(
            backup_dir.join("engine/core.py.20250101_000000.000001.bak"),
            "healthy = True\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("engine")).unwrap();
        std::fs::write(dir.path().join("engine/core.py"), "broken!!\n").unwrap();

        let detail = rollback_via_backups(dir.path()).unwrap();
        assert!(detail.contains("engine/core.py"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("engine/core.py")).unwrap(),
            "healthy = True\n"
        );
    }

    #[test]
    fn missing_backup_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(rollback_via_backups(dir.path()).is_err());
    }
}
