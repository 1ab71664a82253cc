//! Coder pipeline: turn the dreamer's design into whole replacement files,
//! re-checking every attempt through the sanitizer, a syntax gate and a
//! no-change gate, and feeding each rejection back into the next prompt.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use ouro_guard::{check_python_syntax, context_hints_for, normalize_ws, sanitize};
use ouro_llm::{ChatClient, ChatMessage, TokenUsage};
use regex::Regex;
use tracing::{info, warn};

use crate::error_memory::ErrorMemory;

const CODER_TIMEOUT: Duration = Duration::from_secs(180);
const MAX_CODER_RETRIES: usize = 5;
/// Files above this line count are never inlined into the prompt.
const LARGE_FILE_LINES: usize = 200;

pub const CODER_SYSTEM_PROMPT: &str = "You are a File Content Generator.\n\n\
⛔️⛔️⛔️ ABSOLUTELY FORBIDDEN — DIFF FORMAT ⛔️⛔️⛔️\n\
DO NOT start any line with '+ ' or '- ' (plus/minus followed by space).\n\
DO NOT use '@@ ... @@' hunk markers.\n\
DO NOT show what to add or remove — output the FINAL complete file only.\n\n\
❌ WRONG (diff format — will be REJECTED):\n\
```python\n+ import new_module\n- import old_module\n  def foo():\n+     return new_value\n```\n\n\
✅ CORRECT (complete file — this is what you must output):\n\
```python\nimport new_module\n\ndef foo():\n    return new_value\n```\n\n\
CRITICAL RULES:\n\
1. Output the COMPLETE file from the first import to the last line.\n\
2. Your output OVERWRITES the existing file entirely.\n\
3. ANY line starting with '+ ' or '- ' = AUTOMATIC REJECTION.\n\n\
OUTPUT FORMAT:\n\
FILE: filename.py\n\
```python\n# complete file content — no + or - prefixes\n```";

#[derive(Debug)]
pub struct CodeOutcome {
    pub code_output: String,
    pub usage: TokenUsage,
}

fn fenced_python_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:python)?\n(.*?)```").expect("static pattern"))
}

fn file_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)FILE[ :\]]+\s*(\S+\.py)").expect("static pattern"))
}

fn py_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-zA-Z0-9_\-/]+\.py)").expect("static pattern"))
}

/// Pull the contents of files the dreamer's design mentions, skipping
/// anything above the large-file threshold.  Returns the prompt block plus
/// the mentioned-file list.
pub fn extract_target_files(intent_design: &str, base_path: &Path) -> (String, Vec<String>) {
    let mut targets: Vec<String> = py_path_re()
        .captures_iter(intent_design)
        .map(|c| c[1].trim_start_matches("./").to_string())
        .collect();
    targets.sort();
    targets.dedup();

    let mut block = String::new();
    let mut skipped: Vec<String> = Vec::new();

    for target in &targets {
        let full = base_path.join(target);
        let Ok(content) = std::fs::read_to_string(&full) else {
            continue;
        };
        let (content, _) = sanitize(&content);
        let line_count = content.lines().count();
        if line_count > LARGE_FILE_LINES {
            skipped.push(format!("{target} ({line_count} lines)"));
            continue;
        }
        block.push_str(&format!(
            "\n\n--- ORIGINAL FILE: {target} (full content, {line_count} lines) ---\n{content}\n"
        ));
    }

    if !skipped.is_empty() {
        warn!(skipped = ?skipped, "large files excluded from coder prompt");
        block.push_str(&format!(
            "\n\n⚠️ Large files ({}) must not be modified directly; create a new module instead.\n",
            skipped.join(", ")
        ));
    }

    (block, targets)
}

pub fn build_coder_prompt(
    intent_design: &str,
    target_files_block: &str,
    compressed_code: &str,
    target_files: &[String],
    error_memory: &ErrorMemory,
    base_path: &Path,
) -> String {
    let mut prompt = format!(
        "You are the system's code generator. You do not edit files — you write the \
complete replacement file from the first line to the last.\n\n\
[Writing rules — violations are rejected automatically]\n\
1. Whole-file output only: never a fragment, never a diff.\n\
2. One `FILE: name.py` marker plus one fenced code block per file.\n\
3. ⛔ No diff format: lines starting with `+ ` or `- ` are auto-rejected, as are \
`@@`, `<<<`, `===`, `>>>` markers.\n\
4. Never rewrite files over {LARGE_FILE_LINES} lines; create a new module instead.\n\
5. No omissions: never `# ...` or `(rest unchanged)`.\n\n\
[🚨 A change is mandatory]\n\
- Output identical to the current file fails as \"no change\".\n\
- If nothing needs doing, output exactly `NO_EVOLUTION_NEEDED: (reason)` instead of a file.\n\n\
[Output format]\n\
FILE: filename.py\n\
```python\n# purpose comment\nimport ...\n\n# full implementation\n```\n\n\
[Design: Dreamer's intent]\n{intent_design}\n\n\
[Reference: current file contents — rewrite these completely]\n{files}\n\n\
[System context]\n{compressed_code}",
        files = if target_files_block.is_empty() {
            "This is a new-module creation step."
        } else {
            target_files_block
        },
    );

    let hints = error_memory.hints_for(target_files);
    if !hints.is_empty() {
        prompt.push_str(&format!(
            "\n\n[🧠 Past failures on these files — do not repeat them]\n{hints}"
        ));
    }

    let size_hints = context_hints_for(base_path, target_files);
    if !size_hints.is_empty() {
        prompt.push_str(&format!("\n\n{size_hints}"));
    }

    prompt
}

/// Run the coder with the verify-reject-retry loop.  On success the returned
/// text is already sanitized.
pub async fn run_coder(
    client: &ChatClient,
    intent_design: &str,
    compressed_code: &str,
    base_path: &Path,
    error_memory: &mut ErrorMemory,
    temperature: f32,
) -> Result<CodeOutcome, (String, TokenUsage)> {
    let (target_block, targets) = extract_target_files(intent_design, base_path);
    let base_prompt = build_coder_prompt(
        intent_design,
        &target_block,
        compressed_code,
        &targets,
        error_memory,
        base_path,
    );

    let mut usage = TokenUsage::default();
    let mut last_error: Option<String> = None;

    for attempt in 1..=MAX_CODER_RETRIES {
        let prompt = match &last_error {
            Some(error) => format!(
                "{base_prompt}\n\n🚨 [Previous attempt failed — fix this!]\n{error}\n\
                 Rewrite the full file avoiding the error above.{diff_coda}",
                diff_coda = if error.to_lowercase().contains("diff") {
                    "\n⛔ Your last output used diff format. Never start a line with \
                     '+ ' or '- '. Write the complete file plainly."
                } else {
                    ""
                }
            ),
            None => base_prompt.clone(),
        };

        info!(attempt, max = MAX_CODER_RETRIES, "coder attempt");
        let messages = [
            ChatMessage::system(CODER_SYSTEM_PROMPT),
            ChatMessage::user(&prompt),
        ];
        let reply = match client.chat(&messages, 8192, temperature, CODER_TIMEOUT).await {
            Ok(reply) => reply,
            Err(err) => {
                usage.prompt_tokens += err.usage().prompt_tokens;
                usage.completion_tokens += err.usage().completion_tokens;
                last_error = Some(err.to_string());
                warn!(attempt, error = %err, "coder call failed");
                continue;
            }
        };
        usage.prompt_tokens += reply.usage.prompt_tokens;
        usage.completion_tokens += reply.usage.completion_tokens;

        let (code_output, report) = sanitize(&reply.content);
        if let Some(reason) = report.rejection_reason() {
            last_error = Some(reason);
            warn!(attempt, "sanitizer rejected coder output");
            continue;
        }

        // Syntax gate for the first Python block.
        if code_output.contains("FILE:") && code_output.contains(".py") {
            if let Some(captures) = fenced_python_re().captures(&code_output) {
                if let Some(err) = check_python_syntax(&captures[1]).await {
                    last_error = Some(format!(
                        "python syntax error: {err}. Rewrite with valid syntax."
                    ));
                    let error_type = err.split('(').next().unwrap_or("SyntaxError").trim();
                    for target in &targets {
                        error_memory.record_error(target, error_type, &err);
                    }
                    warn!(attempt, "coder output failed the syntax gate");
                    continue;
                }
            }
        }

        // No-change gate: the first FILE block must differ from disk.
        if let Some(no_change) = detect_no_change(&code_output, base_path) {
            last_error = Some(format!(
                "generated code is identical to the existing {no_change}. \
                 Apply the intent: something must actually change."
            ));
            warn!(attempt, file = %no_change, "coder reproduced the file verbatim");
            continue;
        }

        return Ok(CodeOutcome { code_output, usage });
    }

    Err((
        last_error.unwrap_or_else(|| "coder produced nothing usable".to_string()),
        usage,
    ))
}

/// Returns the filename when the first FILE block's code equals the on-disk
/// contents, whitespace-normalised.
fn detect_no_change(code_output: &str, base_path: &Path) -> Option<String> {
    let code = fenced_python_re().captures(code_output)?[1].trim().to_string();
    let filename = file_tag_re().captures(code_output)?[1]
        .trim_start_matches("./")
        .to_string();
    let existing = std::fs::read_to_string(base_path.join(&filename)).ok()?;
    if normalize_ws(&existing) == normalize_ws(&code) {
        Some(filename)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_extraction_reads_small_files_and_skips_large() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("engine")).unwrap();
        std::fs::write(dir.path().join("engine/small.py"), "x = 1\n").unwrap();
        let big: String = (0..LARGE_FILE_LINES + 50)
            .map(|i| format!("line_{i} = {i}\n"))
            .collect();
        std::fs::write(dir.path().join("engine/big.py"), big).unwrap();

        let design = "Update engine/small.py and engine/big.py accordingly.";
        let (block, targets) = extract_target_files(design, dir.path());

        assert!(block.contains("ORIGINAL FILE: engine/small.py"));
        assert!(block.contains("x = 1"));
        assert!(!block.contains("line_0 = 0"));
        assert!(block.contains("must not be modified directly"));
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn missing_targets_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (block, targets) = extract_target_files("touch ghost/file.py please", dir.path());
        assert!(block.is_empty());
        assert_eq!(targets, vec!["ghost/file.py".to_string()]);
    }

    #[test]
    fn no_change_detection_matches_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("engine")).unwrap();
        std::fs::write(dir.path().join("engine/core.py"), "def f():\n    return 1\n").unwrap();

        let verbatim = "FILE: engine/core.py\n```python\ndef f():\n    return 1\n```";
        assert_eq!(
            detect_no_change(verbatim, dir.path()),
            Some("engine/core.py".to_string())
        );

        let changed = "FILE: engine/core.py\n```python\ndef f():\n    return 2\n```";
        assert_eq!(detect_no_change(changed, dir.path()), None);
    }

    #[test]
    fn no_change_ignores_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = "FILE: brand/new.py\n```python\nvalue = 1\n```";
        assert_eq!(detect_no_change(output, dir.path()), None);
    }

    #[test]
    fn coder_prompt_embeds_sanitizer_rules_and_hints() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = ErrorMemory::open(dir.path());
        memory.record_error("engine/core.py", "SyntaxError", "bad indent");

        let prompt = build_coder_prompt(
            "SYSTEM_INTENT: improve engine/core.py",
            "",
            "context",
            &["engine/core.py".to_string()],
            &memory,
            dir.path(),
        );
        for expected in [
            "Whole-file output only",
            "NO_EVOLUTION_NEEDED",
            "Past failures on these files",
            "bad indent",
            "FILE: filename.py",
        ] {
            assert!(prompt.contains(expected), "missing {expected}");
        }
    }
}
