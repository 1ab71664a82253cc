//! Post-processing for coder output.  Strips git conflict markers, converts
//! accidental diff format back into plain code, normalises fences and closes
//! dangling docstrings.  `sanitize` is pure and idempotent: a second pass
//! changes nothing and reports `cleaned == false`.

use std::sync::OnceLock;

use regex::Regex;

/// What the sanitizer saw and did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizeReport {
    /// Any rewrite was performed.
    pub cleaned: bool,
    /// Conflict markers survive in the output.
    pub has_conflict: bool,
    /// `+ `/`- ` diff lines (or `@@ ` hunks) survive in the output.
    pub has_diff: bool,
    /// Code-omission comments (`# ... existing` and friends) are present.
    pub has_omission: bool,
    pub diff_count: usize,
    pub removed_lines: usize,
    pub diff_converted: usize,
    pub diff_removed: usize,
}

impl SanitizeReport {
    pub fn is_valid(&self) -> bool {
        !(self.has_conflict || self.has_diff || self.has_omission)
    }

    /// Feedback line for the coder's next attempt.
    pub fn rejection_reason(&self) -> Option<String> {
        if self.has_conflict || self.has_diff {
            return Some(format!(
                "Git conflict markers or diff format (+/-) detected. \
                 diff lines: {}, conflict: {}. Never use diff format; \
                 rewrite the complete file.",
                self.diff_count, self.has_conflict
            ));
        }
        if self.has_omission {
            return Some(
                "Code omission pattern (`# ... existing` etc.) detected. \
                 Write the full file without omissions."
                    .to_string(),
            );
        }
        None
    }
}

fn omission_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"#\s*\.\.\.\s*existing",
            r"#\s*\.\.\.\s*rest",
            r"#\s*\.\.\.\s*same",
            r"#\s*\.\.\.\s*unchanged",
            r"#\s*keep\s+existing",
            r"#\s*unchanged\s+from",
            r"#\s*omitted",
            r"#\s*truncated",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Clean raw coder output and report what happened.
pub fn sanitize(raw: &str) -> (String, SanitizeReport) {
    let mut report = SanitizeReport::default();
    let mut text = raw.to_string();

    // Normalise triple-single-quote fences to backticks.
    if text.contains("'''") {
        text = text.replace("'''", "```");
        report.cleaned = true;
    }

    // Drop conflict-marker lines: any line containing the angle markers, and
    // lines that are exactly the seven-equals separator (documentation
    // decorations with more `=` survive).
    let mut kept = Vec::new();
    for line in text.split('\n') {
        let stripped = line.trim();
        if line.contains("<<<<<<<") || line.contains(">>>>>>>") || stripped == "=======" {
            report.removed_lines += 1;
            continue;
        }
        kept.push(line.to_string());
    }
    if report.removed_lines > 0 {
        text = kept.join("\n");
        report.cleaned = true;
    }

    // Diff-format detection and conversion.  `+ ` prefixes become plain
    // lines and `- ` lines are deleted, but only inside code fences; `@@`
    // hunk headers are stripped everywhere.
    let looks_like_diff = text
        .split('\n')
        .any(|l| l.trim().starts_with("+ ") || l.trim().starts_with("- "))
        || text.contains("@@ ");
    if looks_like_diff {
        let mut converted = Vec::new();
        let mut in_fence = false;
        for line in text.split('\n') {
            let stripped = line.trim();
            if stripped.starts_with("```") {
                in_fence = !in_fence;
                converted.push(line.to_string());
                continue;
            }
            if is_hunk_header(stripped) {
                report.diff_removed += 1;
                continue;
            }
            if in_fence {
                if stripped.starts_with("+ ") || stripped.starts_with("+\t") {
                    converted.push(strip_diff_prefix(line));
                    report.diff_converted += 1;
                    continue;
                }
                if stripped == "+" {
                    converted.push(String::new());
                    report.diff_converted += 1;
                    continue;
                }
                if stripped.starts_with("- ") || stripped.starts_with("-\t") || stripped == "-" {
                    report.diff_removed += 1;
                    continue;
                }
            }
            converted.push(line.to_string());
        }
        if report.diff_converted > 0 || report.diff_removed > 0 {
            text = converted.join("\n");
            report.cleaned = true;
        }
    }

    // Residual detection on the cleaned text.
    let residual: Vec<&str> = text
        .split('\n')
        .filter(|l| l.trim().starts_with("+ ") || l.trim().starts_with("- "))
        .collect();
    report.diff_count = residual.len();
    report.has_diff = !residual.is_empty() || text.contains("@@ ");
    report.has_conflict = text.contains("<<<<<<<")
        || text.contains(">>>>>>>")
        || text.split('\n').any(|l| l.trim() == "=======");
    report.has_omission = omission_patterns().iter().any(|p| p.is_match(&text));

    // Close odd-count docstring fences (the usual unterminated-string bug).
    for quote in ["\"\"\"", "'''"] {
        if text.matches(quote).count() % 2 != 0 {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(quote);
            report.cleaned = true;
        }
    }

    (text, report)
}

fn is_hunk_header(stripped: &str) -> bool {
    stripped.starts_with("@@") && stripped[2..].contains("@@")
}

/// Remove the `+` and the single separator after it, preserving indentation.
fn strip_diff_prefix(line: &str) -> String {
    match line.find('+') {
        Some(idx) => {
            let mut out = String::with_capacity(line.len());
            out.push_str(&line[..idx]);
            let rest = &line[idx + 1..];
            out.push_str(rest.strip_prefix(' ').or_else(|| rest.strip_prefix('\t')).unwrap_or(rest));
            out
        }
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── conflict markers ───────────────────────────────────────────────────

    #[test]
    fn removes_conflict_markers() {
        let raw = "a\n<<<<<<< HEAD\nb\n=======\nc\n>>>>>>> branch\nd";
        let (clean, report) = sanitize(raw);
        assert_eq!(clean, "a\nb\nc\nd");
        assert!(report.cleaned);
        assert!(!report.has_conflict);
        assert_eq!(report.removed_lines, 3);
    }

    #[test]
    fn keeps_long_equals_decorations() {
        let raw = "# ================\ncode()";
        let (clean, report) = sanitize(raw);
        assert_eq!(clean, raw);
        assert!(!report.cleaned);
        assert!(!report.has_conflict);
    }

    // ── diff conversion ────────────────────────────────────────────────────

    #[test]
    fn converts_plus_lines_inside_fences() {
        let raw = "```python\n+ import foo\n- foo()\nbar()\n```";
        let (clean, report) = sanitize(raw);
        assert_eq!(clean, "```python\nimport foo\nbar()\n```");
        assert_eq!(report.diff_converted, 1);
        assert_eq!(report.diff_removed, 1);
        assert!(!report.has_diff);
    }

    #[test]
    fn preserves_indent_when_stripping_plus() {
        let raw = "```python\n    + return 1\n```";
        let (clean, _) = sanitize(raw);
        assert_eq!(clean, "```python\n    return 1\n```");
    }

    #[test]
    fn strips_hunk_headers_outside_fences_too() {
        let raw = "@@ -1,3 +1,4 @@\ncode()";
        let (clean, report) = sanitize(raw);
        assert_eq!(clean, "code()");
        assert_eq!(report.diff_removed, 1);
    }

    #[test]
    fn diff_lines_outside_fences_flag_but_do_not_convert() {
        let raw = "+ import foo\nplain()";
        let (clean, report) = sanitize(raw);
        assert_eq!(clean, raw);
        assert!(report.has_diff);
        assert_eq!(report.diff_count, 1);
    }

    // ── fences and docstrings ──────────────────────────────────────────────

    #[test]
    fn replaces_triple_single_quotes() {
        let (clean, report) = sanitize("'''python\nx = 1\n'''");
        assert_eq!(clean, "```python\nx = 1\n```");
        assert!(report.cleaned);
    }

    #[test]
    fn closes_dangling_docstring() {
        let raw = "def f():\n    \"\"\"doc\n    pass";
        let (clean, report) = sanitize(raw);
        assert!(clean.ends_with("\"\"\""));
        assert!(report.cleaned);
    }

    // ── omission detection ─────────────────────────────────────────────────

    #[test]
    fn flags_omission_comments() {
        let (_, report) = sanitize("x = 1\n# ... existing code here\n");
        assert!(report.has_omission);
        assert!(!report.is_valid());
    }

    // ── idempotence ────────────────────────────────────────────────────────

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "a\n<<<<<<< HEAD\nb\n=======\nc\n>>>>>>> x\nd",
            "```python\n+ import foo\n- old()\nkeep()\n```",
            "'''\ndoc\n'''",
            "def f():\n    \"\"\"open\n    pass",
            "plain text\nwith nothing special",
        ];
        for raw in samples {
            let (once, _) = sanitize(raw);
            let (twice, second_report) = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {raw:?}");
            assert!(!second_report.cleaned, "second pass cleaned {raw:?}");
        }
    }

    #[test]
    fn clean_input_passes_untouched() {
        let raw = "def f():\n    return 1\n";
        let (clean, report) = sanitize(raw);
        assert_eq!(clean, raw);
        assert!(!report.cleaned);
        assert!(report.is_valid());
        assert!(report.rejection_reason().is_none());
    }
}
