//! Coder-output parsing: FILE-marker sections, fallback patterns, and the
//! `NO_EVOLUTION_NEEDED` sentinel.

use std::path::Path;
use std::sync::OnceLock;

use ouro_guard::{ProtectList, validate_update_sizes};
use regex::Regex;
use tracing::{info, warn};

/// One proposed whole-file replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpdate {
    pub filename: String,
    pub code: String,
}

/// Result of parsing a coder response.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub updates: Vec<FileUpdate>,
    pub no_evolution: bool,
    pub reason: Option<String>,
    pub error: Option<String>,
    /// Size-policy warnings per filename (never blocking).
    pub size_warnings: Vec<String>,
}

fn file_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^[#*\[ ]*FILE[ :\]]+\s*").expect("static pattern"))
}

fn fenced_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:\w+)?[ \t]*\n?(.*?)```").expect("static pattern"))
}

fn header_with_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:python|py):[ \t]*(\S+\.py)[ \t]*\n(.*?)```").expect("static pattern")
    })
}

fn filename_then_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?sm)^([a-zA-Z0-9_/]+\.py)[ \t]*\n\s*```(?:python|py)?\n(.*?)```")
            .expect("static pattern")
    })
}

fn py_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\w/]+\.py)").expect("static pattern"))
}

/// Parse a sanitized coder response into file updates.
pub fn parse_coder_output(
    code_output: &str,
    intent: &str,
    protect: &ProtectList,
) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    // A model that decides nothing needs doing says so explicitly.
    if let Some(idx) = code_output.find("NO_EVOLUTION_NEEDED") {
        let reason = code_output[idx..]
            .trim_start_matches("NO_EVOLUTION_NEEDED")
            .trim_start_matches(':')
            .trim()
            .to_string();
        info!(reason = %reason, "coder declined to evolve");
        outcome.no_evolution = true;
        outcome.reason = Some(reason);
        return outcome;
    }

    let mut updates = Vec::new();

    // Primary format: FILE: markers, one fenced block per section.
    let sections: Vec<&str> = {
        let mut parts: Vec<&str> = file_marker_re().split(code_output).collect();
        if parts.len() > 1 {
            parts.remove(0);
            parts
        } else {
            Vec::new()
        }
    };
    for section in &sections {
        if let Some(update) = parse_file_section(section) {
            updates.push(update);
        }
    }

    // Fallback patterns for models that ignore the marker format.
    if updates.is_empty() {
        updates = try_alternative_patterns(code_output);
    }
    if updates.is_empty() {
        match try_last_resort(code_output, intent) {
            Ok(found) => updates = found,
            Err(error) => {
                outcome.error = Some(error);
                return outcome;
            }
        }
    }

    if updates.is_empty() {
        let sample: String = code_output.chars().take(500).collect();
        outcome.error = Some(format!(
            "coder produced no parseable file sections.\n[response sample]\n{sample}"
        ));
        return outcome;
    }

    // Protected files are dropped silently; an all-protected proposal is an
    // error, not an empty success.
    let before = updates.len();
    updates.retain(|u| {
        let keep = !protect.is_protected(&u.filename);
        if !keep {
            warn!(file = %u.filename, "🛡️ protected file dropped from proposal");
        }
        keep
    });
    if updates.is_empty() && before > 0 {
        outcome.error = Some("proposal only touched protected files".to_string());
        return outcome;
    }

    let filenames: Vec<String> = updates.iter().map(|u| u.filename.clone()).collect();
    outcome.size_warnings = validate_update_sizes(protect.base_path(), &filenames)
        .into_iter()
        .map(|(file, policy)| format!("{file}: {}", policy.reason))
        .collect();

    outcome.updates = updates;
    outcome
}

fn parse_file_section(section: &str) -> Option<FileUpdate> {
    let first_line = section.lines().next()?.trim();
    let filename = normalize_filename(first_line);
    if filename.is_empty() || !filename.contains('.') {
        warn!(raw = first_line, "unusable filename in FILE section");
        return None;
    }

    let code = fenced_code_re()
        .captures(section)
        .map(|c| c[1].trim().to_string())?;
    if code.len() <= 10 {
        warn!(file = %filename, len = code.len(), "code block too short; section skipped");
        return None;
    }

    info!(file = %filename, bytes = code.len(), "parsed file section");
    Some(FileUpdate { filename, code })
}

fn try_alternative_patterns(code_output: &str) -> Vec<FileUpdate> {
    // Pattern 1: ```python:filename.py fenced headers.
    let mut updates: Vec<FileUpdate> = header_with_filename_re()
        .captures_iter(code_output)
        .map(|c| FileUpdate {
            filename: normalize_filename(&c[1]),
            code: c[2].trim().to_string(),
        })
        .filter(|u| !u.code.is_empty())
        .collect();

    // Pattern 2: a bare filename line immediately before a fence.
    if updates.is_empty() {
        updates = filename_then_fence_re()
            .captures_iter(code_output)
            .map(|c| FileUpdate {
                filename: normalize_filename(&c[1]),
                code: c[2].trim().to_string(),
            })
            .filter(|u| !u.code.is_empty())
            .collect();
    }

    if !updates.is_empty() {
        info!(count = updates.len(), "fallback pattern parse succeeded");
    }
    updates
}

/// Last resort: a single fenced block plus a filename hinted in the intent.
fn try_last_resort(code_output: &str, intent: &str) -> Result<Vec<FileUpdate>, String> {
    let Some(captures) = fenced_code_re().captures(code_output) else {
        return Err("no fenced code block found in coder output".to_string());
    };
    let code = captures[1].trim().to_string();
    if code.len() < 50 {
        return Err(format!("fenced block too short ({} chars)", code.len()));
    }

    match py_path_re().captures(intent) {
        Some(hint) => {
            let filename = normalize_filename(&hint[1]);
            info!(file = %filename, bytes = code.len(), "last-resort extraction used intent filename");
            Ok(vec![FileUpdate { filename, code }])
        }
        None => Err("could not infer a target filename from the intent".to_string()),
    }
}

fn normalize_filename(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '*' | '`' | '"' | '\''))
        .collect();
    let cleaned = cleaned.trim();
    let cleaned = cleaned.trim_start_matches("./");
    Path::new(cleaned)
        .to_string_lossy()
        .replace('\\', "/")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protect() -> (tempfile::TempDir, ProtectList) {
        let dir = tempfile::tempdir().unwrap();
        let list = ProtectList::load(dir.path());
        (dir, list)
    }

    const BODY: &str =
        "def ping():\n    return 'pong'\n\n\ndef pong():\n    return 'ping'\n# module helpers";

    #[test]
    fn parses_file_marker_sections() {
        let (_dir, protect) = protect();
        let output = format!("FILE: nexus/ping.py\n```python\n{BODY}\n```\n");
        let outcome = parse_coder_output(&output, "", &protect);
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].filename, "nexus/ping.py");
        assert!(outcome.updates[0].code.contains("return 'pong'"));
    }

    #[test]
    fn parses_multiple_sections_and_decorated_markers() {
        let (_dir, protect) = protect();
        let output = format!(
            "## FILE: a.py\n```python\n{BODY}\n```\n\n**FILE: b.py**\n```python\n{BODY}\n```\n"
        );
        let outcome = parse_coder_output(&output, "", &protect);
        let names: Vec<&str> = outcome.updates.iter().map(|u| u.filename.as_str()).collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
    }

    #[test]
    fn no_evolution_sentinel_short_circuits() {
        let (_dir, protect) = protect();
        let outcome =
            parse_coder_output("NO_EVOLUTION_NEEDED: everything already works", "", &protect);
        assert!(outcome.no_evolution);
        assert_eq!(outcome.reason.as_deref(), Some("everything already works"));
        assert!(outcome.updates.is_empty());
    }

    #[test]
    fn python_header_fallback() {
        let (_dir, protect) = protect();
        let output = format!("Here you go:\n```python:utils/tools.py\n{BODY}\n```\n");
        let outcome = parse_coder_output(&output, "", &protect);
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].filename, "utils/tools.py");
    }

    #[test]
    fn filename_line_before_fence_fallback() {
        let (_dir, protect) = protect();
        let output = format!("engine/helper.py\n```python\n{BODY}\n```\n");
        let outcome = parse_coder_output(&output, "", &protect);
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].filename, "engine/helper.py");
    }

    #[test]
    fn last_resort_uses_intent_filename() {
        let (_dir, protect) = protect();
        let output = format!("```python\n{BODY}\n```");
        let outcome = parse_coder_output(
            &output,
            "add function ping() to nexus/ping.py",
            &protect,
        );
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].filename, "nexus/ping.py");
    }

    #[test]
    fn last_resort_without_hint_errors() {
        let (_dir, protect) = protect();
        let output = format!("```python\n{BODY}\n```");
        let outcome = parse_coder_output(&output, "do something nice", &protect);
        assert!(outcome.updates.is_empty());
        assert!(outcome.error.unwrap().contains("filename"));
    }

    #[test]
    fn protected_sections_are_dropped() {
        let (_dir, protect) = protect();
        let output = format!(
            "FILE: main.py\n```python\n{BODY}\n```\nFILE: ok.py\n```python\n{BODY}\n```\n"
        );
        let outcome = parse_coder_output(&output, "", &protect);
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].filename, "ok.py");
    }

    #[test]
    fn all_protected_proposal_is_an_error() {
        let (_dir, protect) = protect();
        let output = format!("FILE: main.py\n```python\n{BODY}\n```\n");
        let outcome = parse_coder_output(&output, "", &protect);
        assert!(outcome.updates.is_empty());
        assert!(outcome.error.unwrap().contains("protected"));
    }

    #[test]
    fn unparseable_output_reports_sample() {
        let (_dir, protect) = protect();
        let outcome = parse_coder_output("I think you should refactor things.", "", &protect);
        assert!(outcome.updates.is_empty());
        assert!(outcome.error.unwrap().contains("response sample"));
    }

    #[test]
    fn filename_normalisation_strips_decoration() {
        assert_eq!(normalize_filename("**`./engine/core.py`**"), "engine/core.py");
        assert_eq!(normalize_filename("  utils/x.py  "), "utils/x.py");
    }
}
