//! Post-sanitizer validation: filename policy, protection, per-extension
//! content checks, and no-change detection.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

use crate::imports::validate_relative_imports;
use crate::protect::ProtectList;
use crate::sanitize::sanitize;

/// Packages the evolving tree must keep listed in `requirements.txt`.
const REQUIRED_PACKAGES: &[&str] = &["requests", "redis", "lancedb"];

/// Character sequences that disqualify a filename outright.  The escaped
/// classes catch regex patterns leaking into the filename position.
const INVALID_FILENAME_SEQS: &[&str] = &["<", ">", "|", "\"", "?", "*", "\\s", "\\S", "\\d"];

const MAX_FILENAME_LEN: usize = 100;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("invalid filename '{filename}': contains '{sequence}'")]
    InvalidFilename { filename: String, sequence: String },
    #[error("filename too long: {0} chars (max {MAX_FILENAME_LEN})")]
    FilenameTooLong(usize),
    #[error("🛡️ '{0}' is a protected file; modification refused")]
    Protected(String),
    #[error("conflict markers or diff format survived sanitizing in '{0}'")]
    SanityFailure(String),
    #[error("python syntax error: {0}")]
    SyntaxError(String),
    #[error("import of missing module: {0}")]
    MissingImport(String),
    #[error("json syntax error: {0}")]
    JsonError(String),
    #[error("required package '{0}' missing from requirements.txt")]
    RequirementDropped(String),
    #[error("no change: proposal matches the current contents of '{0}'")]
    NoChange(String),
}

/// Filename must be a simple relative path.
pub fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    for seq in INVALID_FILENAME_SEQS {
        if filename.contains(seq) {
            return Err(ValidationError::InvalidFilename {
                filename: filename.to_string(),
                sequence: seq.to_string(),
            });
        }
    }
    if filename.len() > MAX_FILENAME_LEN {
        return Err(ValidationError::FilenameTooLong(filename.len()));
    }
    Ok(())
}

/// Whitespace-normalised equality; the basis of no-change rejection.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full validation for one proposed file.  Returns the (possibly re-cleaned)
/// code to apply.
pub async fn validate_code(
    protect: &ProtectList,
    filename: &str,
    code: &str,
    existing: Option<&str>,
) -> Result<String, ValidationError> {
    validate_filename(filename)?;

    // One more pass through the sanitizer right before apply; the coder loop
    // already cleaned, so anything surviving here is a hard reject.
    let (code, report) = sanitize(code);
    if !report.is_valid() {
        return Err(ValidationError::SanityFailure(filename.to_string()));
    }

    if protect.is_protected(filename) {
        return Err(ValidationError::Protected(filename.to_string()));
    }

    if let Some(existing) = existing {
        if normalize_ws(existing) == normalize_ws(&code) {
            return Err(ValidationError::NoChange(filename.to_string()));
        }
    }

    let path = Path::new(filename);
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let basename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    match (basename, ext) {
        ("requirements.txt", _) => {
            for pkg in REQUIRED_PACKAGES {
                if !code.contains(pkg) {
                    return Err(ValidationError::RequirementDropped(pkg.to_string()));
                }
            }
        }
        (_, "py") => {
            if let Some(err) = check_python_syntax(&code).await {
                return Err(ValidationError::SyntaxError(err));
            }
            if let Some(missing) =
                validate_relative_imports(&code, filename, protect.base_path())
            {
                return Err(ValidationError::MissingImport(missing));
            }
        }
        (_, "json") => {
            if let Err(err) = serde_json::from_str::<serde_json::Value>(&code) {
                return Err(ValidationError::JsonError(err.to_string()));
            }
        }
        // Text-ish formats and unknown extensions are accepted as-is; the
        // evolving tree is free to grow new file kinds.
        _ => {}
    }

    Ok(code)
}

/// Compile-check Python source through the interpreter.  Returns the error
/// text on failure, `None` when the code compiles — or when no interpreter
/// is installed, in which case the check is skipped with a warning.
pub async fn check_python_syntax(code: &str) -> Option<String> {
    for python in ["python3", "python"] {
        let spawned = Command::new(python)
            .args(["-c", "import sys; compile(sys.stdin.read(), '<proposal>', 'exec')"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => {
                warn!(%err, "failed to spawn python for syntax check; skipping");
                return None;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(code.as_bytes()).await.is_err() {
                return None;
            }
            drop(stdin);
        }

        let output = tokio::time::timeout(Duration::from_secs(10), child.wait_with_output()).await;
        return match output {
            Ok(Ok(out)) if out.status.success() => None,
            Ok(Ok(out)) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                Some(stderr.lines().last().unwrap_or("syntax error").to_string())
            }
            _ => {
                warn!("python syntax check timed out; skipping");
                None
            }
        };
    }

    warn!("no python interpreter found; syntax check skipped");
    None
}
