//! Large-file policy.  Oversize targets are warned about — never blocked —
//! and the warnings become context hints for the coder's next prompt.

use std::path::Path;

/// Recommended ceiling; exceeding it only triggers advice.
pub const SIZE_THRESHOLD: usize = 150;
/// Above this the warning carries the full minimal-change guidance.
pub const SIZE_HARD_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct SizePolicy {
    pub warning: bool,
    pub line_count: usize,
    pub reason: String,
    pub context_hint: Option<String>,
}

fn line_count_of(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|content| content.lines().count())
        .unwrap_or(0)
}

/// Evaluate the size policy for one target path in the working tree.
pub fn check_file_size(base_path: &Path, filename: &str) -> SizePolicy {
    let filename = filename.trim_start_matches("./");
    let full = base_path.join(filename);

    if !full.exists() {
        return SizePolicy {
            warning: false,
            line_count: 0,
            reason: "new file".to_string(),
            context_hint: None,
        };
    }

    let line_count = line_count_of(&full);

    if line_count > SIZE_HARD_LIMIT {
        let hint = format!(
            "⚠️ Large-file caution ({filename}: {line_count} lines)\n\
             - Emitting the whole file risks truncation at the token limit\n\
             - Make the smallest possible change\n\
             - Prefer creating a new module and importing it from here\n\
             - If this file must change, keep its existing structure intact",
        );
        return SizePolicy {
            warning: true,
            line_count,
            reason: format!("{filename} is a {line_count}-line large file"),
            context_hint: Some(hint),
        };
    }

    if line_count > SIZE_THRESHOLD {
        return SizePolicy {
            warning: true,
            line_count,
            reason: format!(
                "{filename} has {line_count} lines, over the {SIZE_THRESHOLD}-line recommendation"
            ),
            context_hint: Some(format!(
                "⚠️ {filename} is {line_count} lines. Consider splitting new logic into a fresh module."
            )),
        };
    }

    SizePolicy {
        warning: false,
        line_count,
        reason: "ok".to_string(),
        context_hint: None,
    }
}

/// Size warnings for a batch of proposed updates, keyed by filename.
pub fn validate_update_sizes(
    base_path: &Path,
    filenames: &[String],
) -> Vec<(String, SizePolicy)> {
    filenames
        .iter()
        .map(|f| (f.clone(), check_file_size(base_path, f)))
        .filter(|(_, policy)| policy.warning)
        .collect()
}

/// Hint block appended to the coder prompt for oversize targets.
pub fn context_hints_for(base_path: &Path, target_files: &[String]) -> String {
    let hints: Vec<String> = target_files
        .iter()
        .filter_map(|f| check_file_size(base_path, f).context_hint)
        .collect();

    if hints.is_empty() {
        String::new()
    } else {
        format!("\n[🚨 Large-file warnings]\n{}", hints.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_lines(dir: &Path, name: &str, lines: usize) {
        let content: String = (0..lines).map(|i| format!("line_{i} = {i}\n")).collect();
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn new_files_have_no_warning() {
        let dir = tempfile::tempdir().unwrap();
        let policy = check_file_size(dir.path(), "fresh.py");
        assert!(!policy.warning);
        assert_eq!(policy.line_count, 0);
    }

    #[test]
    fn small_files_pass() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(dir.path(), "small.py", 40);
        assert!(!check_file_size(dir.path(), "small.py").warning);
    }

    #[test]
    fn over_threshold_warns_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(dir.path(), "mid.py", 170);
        let policy = check_file_size(dir.path(), "mid.py");
        assert!(policy.warning);
        assert!(policy.context_hint.is_some());
    }

    #[test]
    fn over_hard_limit_carries_full_guidance() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(dir.path(), "big.py", 250);
        let policy = check_file_size(dir.path(), "big.py");
        assert!(policy.warning);
        assert!(policy.context_hint.unwrap().contains("Large-file caution"));
    }

    #[test]
    fn batch_hints_collect_only_warnings() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(dir.path(), "small.py", 10);
        write_lines(dir.path(), "big.py", 220);
        let files = vec!["small.py".to_string(), "big.py".to_string()];
        let warned = validate_update_sizes(dir.path(), &files);
        assert_eq!(warned.len(), 1);
        assert_eq!(warned[0].0, "big.py");

        let hints = context_hints_for(dir.path(), &files);
        assert!(hints.contains("big.py"));
        assert!(!hints.contains("small.py is"));
    }
}
