//! The supervisor: an outer process that never dies.  It spawns the engine
//! as a child, captures its stderr, and on a crash writes the crash log,
//! reports, cools down, runs the recovery chain and respawns.  It never
//! calls into engine code — only VCS primitives and file copies.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{error, info, warn};

use ouro_config::AppConfig;
use ouro_exec::{mark_stable, smart_rollback};
use ouro_telegram::TelegramBot;

const CRASH_LOG: &str = "last_crash.log";
/// Cool-down before recovery starts.
const CRASH_COOLDOWN: Duration = Duration::from_secs(30);
/// Extra wait after a failed recovery before forcing a respawn anyway.
const FAILED_RECOVERY_WAIT: Duration = Duration::from_secs(60);
/// Stderr tail preserved in the crash log and the notification.
const STDERR_TAIL: usize = 2000;

pub async fn run(config: AppConfig) -> Result<()> {
    let workspace = PathBuf::from(&config.agent.workspace_path);
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("creating workspace {}", workspace.display()))?;

    let telegram = TelegramBot::new(
        config.telegram.token.clone(),
        config.telegram.chat_id.clone(),
    );
    let branch = config.git.branch.clone();
    let engine_binary = std::env::current_exe().context("locating engine binary")?;

    info!("❤️ supervisor active");

    loop {
        info!("💓 spawning engine");
        let mut child = Command::new(&engine_binary)
            .arg("engine")
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("spawning engine process")?;

        // Drain stderr while the engine runs; keep only the tail.
        let mut stderr_buf = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut stderr_buf).await;
        }
        let status = child.wait().await.context("waiting on engine")?;

        if status.success() {
            info!("👋 engine exited cleanly; supervisor shutting down");
            return Ok(());
        }

        let code = status.code().unwrap_or(-1);
        let tail = tail_of(&stderr_buf, STDERR_TAIL);
        error!(code, "🚨 engine crashed");

        write_crash_log(&workspace, code, &stderr_buf);
        let _ = telegram
            .send_message(&format!(
                "❤️ supervisor: engine crashed (code {code}).\n\nstderr tail:\n{tail}\n\nRecovery starts in {}s.",
                CRASH_COOLDOWN.as_secs()
            ))
            .await;

        tokio::time::sleep(CRASH_COOLDOWN).await;

        let report = smart_rollback(&workspace, &branch).await;
        if report.success {
            info!(strategy = %report.strategy, detail = %report.detail, "♻️ recovery complete");
            let _ = telegram
                .send_message(&format!(
                    "🛠️ self-healed via {}: {}",
                    report.strategy, report.detail
                ))
                .await;
            // The tree is known-good again; refresh the stable anchor.
            let _ = mark_stable(&workspace).await;
        } else {
            warn!(detail = %report.detail, "⚠️ every recovery strategy failed; retrying after wait");
            let _ = telegram
                .send_message("⚠️ recovery failed on every strategy; forcing a respawn after a wait")
                .await;
            tokio::time::sleep(FAILED_RECOVERY_WAIT).await;
        }
    }
}

fn write_crash_log(workspace: &Path, code: i32, stderr: &str) {
    let body = format!(
        "Timestamp: {}\nExit Code: {code}\nError:\n{stderr}\n",
        Utc::now().to_rfc3339()
    );
    if let Err(err) = std::fs::write(workspace.join(CRASH_LOG), body) {
        error!(%err, "crash log write failed");
    }
}

fn tail_of(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_the_end() {
        let text = "abcdefghij";
        assert_eq!(tail_of(text, 4), "ghij");
        assert_eq!(tail_of(text, 100), text);
    }

    #[test]
    fn crash_log_contains_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        write_crash_log(dir.path(), 3, "Traceback: boom");
        let body = std::fs::read_to_string(dir.path().join(CRASH_LOG)).unwrap();
        assert!(body.contains("Exit Code: 3"));
        assert!(body.contains("Traceback: boom"));
    }
}
