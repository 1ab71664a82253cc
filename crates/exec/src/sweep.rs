//! In-tree test sweep: every `test_*.py` / `*_test.py` under the working
//! tree runs in its own interpreter subprocess with a hard timeout.
//! Dependency failures count as skips, not failures; restricted runtimes
//! get a lenient pass bar.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};
use walkdir::WalkDir;

const PER_FILE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Default)]
pub struct SweepResult {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub lines: Vec<String>,
}

impl SweepResult {
    /// Overall verdict.  Restricted runtimes accept ≥50 % of executed tests
    /// passing OR zero hard failures; everywhere else failures must be zero.
    pub fn is_success(&self, restricted: bool) -> bool {
        if restricted {
            let executed = self.passed + self.failed;
            self.failed == 0
                || (executed > 0 && self.passed as f64 / executed as f64 >= 0.5)
        } else {
            self.failed == 0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "tests: {} passed, {} failed, {} skipped",
            self.passed, self.failed, self.skipped
        )
    }
}

/// True when the host signals a constrained deployment.
pub fn restricted_runtime() -> bool {
    std::env::var("RESTRICTED_RUNTIME").is_ok() || std::env::var("RAILWAY_ENVIRONMENT").is_ok()
}

fn is_test_file(name: &str) -> bool {
    name.ends_with(".py") && (name.starts_with("test_") || name.ends_with("_test.py"))
}

fn is_excluded(path: &Path) -> bool {
    path.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name == "backups" || name == "__pycache__" || name == ".git" || name == "target"
    })
}

/// Collect candidate test files under the tree.
pub fn discover_tests(base_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(base_path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| !is_excluded(e.path()))
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(is_test_file)
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Classify one finished test subprocess.
pub fn classify_output(success: bool, output: &str) -> TestOutcome {
    if success {
        TestOutcome::Passed
    } else if output.contains("ModuleNotFoundError") || output.contains("ImportError") {
        // Missing dependency, not a real failure.
        TestOutcome::Skipped
    } else {
        TestOutcome::Failed
    }
}

/// Run the sweep.  A missing interpreter skips everything (success).
pub async fn run_test_sweep(base_path: &Path) -> SweepResult {
    let mut result = SweepResult::default();
    let files = discover_tests(base_path);
    if files.is_empty() {
        result.lines.push("no tests found; skipping".to_string());
        return result;
    }

    for file in files {
        let rel = file
            .strip_prefix(base_path)
            .unwrap_or(&file)
            .to_string_lossy()
            .to_string();

        let spawned = Command::new("python3")
            .arg(&file)
            .current_dir(base_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("no python interpreter; test sweep skipped");
                result.skipped += 1;
                result.lines.push(format!("- {rel}: SKIP (no interpreter)"));
                continue;
            }
            Err(err) => {
                result.skipped += 1;
                result.lines.push(format!("- {rel}: ERROR ({err})"));
                continue;
            }
        };

        match tokio::time::timeout(PER_FILE_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                match classify_output(output.status.success(), &text) {
                    TestOutcome::Passed => {
                        result.passed += 1;
                        result.lines.push(format!("- {rel}: OK"));
                    }
                    TestOutcome::Skipped => {
                        result.skipped += 1;
                        result.lines.push(format!("- {rel}: SKIP (missing dependency)"));
                    }
                    TestOutcome::Failed => {
                        result.failed += 1;
                        let tail: String = text.chars().rev().take(80).collect::<String>()
                            .chars().rev().collect();
                        result
                            .lines
                            .push(format!("- {rel}: FAIL — {}", tail.replace('\n', " ")));
                    }
                }
            }
            Ok(Err(err)) => {
                result.skipped += 1;
                result.lines.push(format!("- {rel}: ERROR ({err})"));
            }
            Err(_) => {
                result.skipped += 1;
                result.lines.push(format!("- {rel}: TIMEOUT (skipped)"));
            }
        }
    }

    info!(
        passed = result.passed,
        failed = result.failed,
        skipped = result.skipped,
        "test sweep finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_matching_rules() {
        assert!(is_test_file("test_core.py"));
        assert!(is_test_file("memory_test.py"));
        assert!(!is_test_file("core.py"));
        assert!(!is_test_file("test_core.txt"));
    }

    #[test]
    fn discovery_excludes_backups_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test_a.py"), "assert True\n").unwrap();
        std::fs::create_dir_all(dir.path().join("backups")).unwrap();
        std::fs::write(dir.path().join("backups/test_old.py"), "assert False\n").unwrap();
        std::fs::create_dir_all(dir.path().join("__pycache__")).unwrap();
        std::fs::write(dir.path().join("__pycache__/test_c.py"), "x\n").unwrap();

        let found = discover_tests(dir.path());
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("test_a.py"));
    }

    #[test]
    fn classification_treats_missing_deps_as_skips() {
        assert_eq!(classify_output(true, ""), TestOutcome::Passed);
        assert_eq!(
            classify_output(false, "ModuleNotFoundError: No module named 'lancedb'"),
            TestOutcome::Skipped
        );
        assert_eq!(
            classify_output(false, "ImportError: cannot import name x"),
            TestOutcome::Skipped
        );
        assert_eq!(
            classify_output(false, "AssertionError: boom"),
            TestOutcome::Failed
        );
    }

    #[test]
    fn success_rules_honour_restricted_runtime() {
        let strict_fail = SweepResult { passed: 1, failed: 1, skipped: 0, lines: vec![] };
        assert!(!strict_fail.is_success(false));
        // 50% pass rate is enough under a restricted runtime.
        assert!(strict_fail.is_success(true));

        let mostly_failing = SweepResult { passed: 1, failed: 3, skipped: 0, lines: vec![] };
        assert!(!mostly_failing.is_success(true));

        let all_skipped = SweepResult { passed: 0, failed: 0, skipped: 4, lines: vec![] };
        assert!(all_skipped.is_success(false));
        assert!(all_skipped.is_success(true));
    }

    #[tokio::test]
    async fn sweep_runs_real_tests_when_python_exists() {
        if std::process::Command::new("python3").arg("--version").output().is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test_ok.py"), "assert 1 + 1 == 2\n").unwrap();
        std::fs::write(
            dir.path().join("test_bad.py"),
            "raise AssertionError('expected failure')\n",
        )
        .unwrap();

        let result = run_test_sweep(dir.path()).await;
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 1);
        assert!(!result.is_success(false));
    }
}
