//! Git synchronizer: CLI-first commit and push with remote verification,
//! bounded force-push retries against freshly fetched refs, and the
//! data-API fallback when the CLI path cannot move the branch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use tokio::process::Command;
use tracing::{info, warn};

const GIT_TIMEOUT: Duration = Duration::from_secs(60);
const FORCE_PUSH_ATTEMPTS: usize = 3;

/// Run one git command in `dir`, capturing combined output.
pub async fn run_git(dir: &Path, args: &[&str]) -> (bool, String) {
    let spawned = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match spawned {
        Ok(child) => child,
        Err(err) => return (false, format!("git spawn failed: {err}")),
    };

    match tokio::time::timeout(GIT_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).to_string();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            (output.status.success(), text.trim().to_string())
        }
        Ok(Err(err)) => (false, format!("git io error: {err}")),
        Err(_) => (false, "git command timeout".to_string()),
    }
}

/// Result of one synchronisation attempt.
#[derive(Debug)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub sha: Option<String>,
    /// Stage-by-stage trace for `/debug`.
    pub debug: BTreeMap<String, String>,
}

impl SyncOutcome {
    fn fail(message: impl Into<String>, debug: BTreeMap<String, String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            sha: None,
            debug,
        }
    }
}

pub struct GitSync {
    workdir: PathBuf,
    token: Option<String>,
    /// `owner/name`.
    pub repo: String,
    pub branch: String,
}

impl GitSync {
    pub fn new(
        workdir: impl AsRef<Path>,
        token: Option<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            workdir: canonical(workdir.as_ref()),
            token,
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some() && !self.repo.is_empty()
    }

    /// Token-injected HTTPS remote.
    pub fn remote_url(&self) -> Option<String> {
        let token = self.token.as_deref()?;
        Some(format!("https://{token}@github.com/{}.git", self.repo))
    }

    pub fn commit_url(&self, sha: &str) -> String {
        format!("https://github.com/{}/commit/{sha}", self.repo)
    }

    /// Safe-directory and identity setup; blank credential helper so the
    /// token in the URL is the only credential source.
    async fn configure(&self) {
        let dir_str = self.workdir.to_string_lossy().to_string();
        let _ = run_git(&self.workdir, &["config", "--global", "--add", "safe.directory", &dir_str]).await;
        let _ = run_git(&self.workdir, &["config", "--global", "credential.helper", ""]).await;
        let _ = run_git(&self.workdir, &["config", "--global", "user.email", "ouro@evolution.local"]).await;
        let _ = run_git(&self.workdir, &["config", "--global", "user.name", "Ouro Core"]).await;
    }

    async fn head_sha(&self) -> Option<String> {
        let (ok, output) = run_git(&self.workdir, &["rev-parse", "HEAD"]).await;
        ok.then(|| output.trim().to_string()).filter(|s| !s.is_empty())
    }

    async fn remote_head(&self, remote_url: &str) -> Option<String> {
        let branch_ref = format!("refs/heads/{}", self.branch);
        let (ok, output) = run_git(&self.workdir, &["ls-remote", remote_url, &branch_ref]).await;
        if !ok {
            return None;
        }
        output.split_whitespace().next().map(String::from).filter(|s| !s.is_empty())
    }

    /// Commit the working tree and push it to the remote branch, verifying
    /// the remote head afterwards.  Never deletes history: force pushes use
    /// explicit `<sha>:<branch>` refs after a fresh ref fetch.
    pub async fn commit_and_push(&self, message: &str) -> SyncOutcome {
        let mut debug = BTreeMap::new();

        let Some(remote_url) = self.remote_url() else {
            return SyncOutcome::fail("git token missing; commit stays local", debug);
        };

        self.configure().await;

        // Init + remote attach when the tree is not yet a repository.
        if !self.workdir.join(".git").exists() {
            let (ok, output) = run_git(&self.workdir, &["init"]).await;
            debug.insert("init".into(), output);
            if !ok {
                return SyncOutcome::fail("git init failed", debug);
            }
            let _ = run_git(&self.workdir, &["remote", "add", "origin", &remote_url]).await;
            let _ = run_git(&self.workdir, &["fetch", "origin", &self.branch]).await;
        }

        // Pull with the ours strategy so local evolution survives races;
        // a conflicted merge is aborted and local state kept.
        let (pull_ok, pull_out) = run_git(
            &self.workdir,
            &["pull", &remote_url, &self.branch, "--no-rebase", "--strategy-option=ours"],
        )
        .await;
        if !pull_ok {
            warn!(output = %pull_out, "pull conflicted; keeping local state");
            let _ = run_git(&self.workdir, &["merge", "--abort"]).await;
            let _ = run_git(&self.workdir, &["rebase", "--abort"]).await;
            let _ = run_git(&self.workdir, &["checkout", "--ours", "."]).await;
            let _ = run_git(&self.workdir, &["add", "."]).await;
        }

        let (add_ok, add_out) = run_git(&self.workdir, &["add", "."]).await;
        if !add_ok {
            debug.insert("add".into(), add_out);
            return SyncOutcome::fail("git add failed", debug);
        }

        let (_, diff_stat) = run_git(&self.workdir, &["diff", "--cached", "--stat"]).await;
        debug.insert("diff_stat".into(), diff_stat.chars().take(500).collect());

        let old_sha = self.head_sha().await;
        let commit_message = format!("🧬 {message}");
        let (_, commit_out) = run_git(&self.workdir, &["commit", "-m", &commit_message]).await;
        if commit_out.contains("nothing to commit") {
            debug.insert("commit".into(), "nothing to commit".into());
            return SyncOutcome {
                success: true,
                message: "no changes (already up to date)".into(),
                sha: None,
                debug,
            };
        }

        let new_sha = self.head_sha().await;
        if old_sha == new_sha {
            debug.insert("commit".into(), format!("sha unchanged: {commit_out}"));
            return SyncOutcome {
                success: true,
                message: "no changes (no commit created)".into(),
                sha: None,
                debug,
            };
        }
        let Some(new_sha) = new_sha else {
            return SyncOutcome::fail("commit created but HEAD unreadable", debug);
        };
        debug.insert("commit".into(), new_sha[..8.min(new_sha.len())].to_string());
        info!(sha = %new_sha, "commit created");

        // Push, retrying once after a rebase pull.
        let push_ref = format!("HEAD:{}", self.branch);
        let (mut push_ok, mut push_out) =
            run_git(&self.workdir, &["push", &remote_url, &push_ref]).await;
        if !push_ok {
            warn!(output = %push_out, "push rejected; pulling and retrying");
            let _ = run_git(&self.workdir, &["pull", &remote_url, &self.branch, "--rebase"]).await;
            (push_ok, push_out) = run_git(&self.workdir, &["push", &remote_url, &push_ref]).await;
        }
        debug.insert("push".into(), push_out.chars().take(300).collect());

        if !push_ok {
            return self.fallback_to_api(message, debug).await;
        }

        // Verify: remote head must equal the local commit.
        match self.remote_head(&remote_url).await {
            Some(remote_sha) if remote_sha == self.head_sha().await.unwrap_or_default() => {
                debug.insert("verify".into(), format!("remote at {}", &remote_sha[..8]));
                SyncOutcome {
                    success: true,
                    message: "✅ synchronised (push verified)".into(),
                    sha: Some(new_sha),
                    debug,
                }
            }
            Some(remote_sha) => {
                warn!(remote = %remote_sha, local = %new_sha, "remote diverged; forcing with explicit refs");
                debug.insert(
                    "verify".into(),
                    format!("mismatch {} != {}", &remote_sha[..8], &new_sha[..8.min(new_sha.len())]),
                );
                self.force_push_with_refresh(&remote_url, &new_sha, message, debug).await
            }
            None => {
                debug.insert("verify".into(), "ls-remote unavailable".into());
                SyncOutcome {
                    success: true,
                    message: "pushed (remote verification unavailable)".into(),
                    sha: Some(new_sha),
                    debug,
                }
            }
        }
    }

    /// Refresh remote refs then force-push the explicit sha, re-verifying
    /// each time.  History rewrites never happen against a stale ref.
    async fn force_push_with_refresh(
        &self,
        remote_url: &str,
        sha: &str,
        message: &str,
        mut debug: BTreeMap<String, String>,
    ) -> SyncOutcome {
        let refspec_fetch = format!("{}:refs/remotes/origin/{}", self.branch, self.branch);
        let _ = run_git(&self.workdir, &["fetch", "--force", remote_url, &refspec_fetch]).await;
        let _ = run_git(&self.workdir, &["remote", "prune", "origin"]).await;

        let push_ref = format!("{sha}:{}", self.branch);
        let full_ref = format!("{sha}:refs/heads/{}", self.branch);

        for attempt in 1..=FORCE_PUSH_ATTEMPTS {
            let args: Vec<&str> = if attempt < FORCE_PUSH_ATTEMPTS {
                vec!["push", "--force", remote_url, &push_ref]
            } else {
                vec!["push", "--force", "--no-thin", remote_url, &full_ref]
            };
            let (ok, output) = run_git(&self.workdir, &args).await;
            debug.insert(format!("force_push_{attempt}"), output.chars().take(200).collect());

            if ok {
                if let Some(remote_sha) = self.remote_head(remote_url).await {
                    if remote_sha == sha {
                        info!(sha, attempt, "force push verified");
                        return SyncOutcome {
                            success: true,
                            message: "✅ synchronised (force push verified)".into(),
                            sha: Some(sha.to_string()),
                            debug,
                        };
                    }
                    // Push "succeeded" but the remote did not move — token
                    // permissions; the data API is the remaining channel.
                    debug.insert("force_verify".into(), format!("remote still {}", &remote_sha[..8]));
                    return self.fallback_to_api(message, debug).await;
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        self.fallback_to_api(message, debug).await
    }

    async fn fallback_to_api(
        &self,
        message: &str,
        mut debug: BTreeMap<String, String>,
    ) -> SyncOutcome {
        warn!("CLI push failed; attempting data-API fallback");
        match crate::api_push::push_via_api(
            &self.workdir,
            self.token.as_deref().unwrap_or_default(),
            &self.repo,
            &self.branch,
            message,
        )
        .await
        {
            Ok(sha) => {
                debug.insert("api_push".into(), "success".into());
                SyncOutcome {
                    success: true,
                    message: "✅ synchronised via data API".into(),
                    sha: Some(sha),
                    debug,
                }
            }
            Err(err) => {
                debug.insert("api_push".into(), err.to_string());
                SyncOutcome::fail(
                    format!("push rejected and data-API fallback failed: {err}"),
                    debug,
                )
            }
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_url_injects_token() {
        let sync = GitSync::new("/tmp", Some("tok123".into()), "owner/repo", "main");
        assert_eq!(
            sync.remote_url().unwrap(),
            "https://tok123@github.com/owner/repo.git"
        );
        assert!(sync.is_configured());
    }

    #[test]
    fn unconfigured_without_token_or_repo() {
        assert!(!GitSync::new("/tmp", None, "owner/repo", "main").is_configured());
        assert!(!GitSync::new("/tmp", Some("t".into()), "", "main").is_configured());
    }

    #[test]
    fn commit_url_shape() {
        let sync = GitSync::new("/tmp", Some("t".into()), "owner/repo", "main");
        assert_eq!(
            sync.commit_url("abc123"),
            "https://github.com/owner/repo/commit/abc123"
        );
    }

    #[tokio::test]
    async fn missing_token_fails_without_touching_git() {
        let dir = tempfile::tempdir().unwrap();
        let sync = GitSync::new(dir.path(), None, "owner/repo", "main");
        let outcome = sync.commit_and_push("msg").await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("token missing"));
        assert!(!dir.path().join(".git").exists());
    }

    #[tokio::test]
    async fn run_git_reports_missing_repo() {
        let dir = tempfile::tempdir().unwrap();
        if run_git(dir.path(), &["--version"]).await.0 {
            let (ok, _) = run_git(dir.path(), &["rev-parse", "HEAD"]).await;
            assert!(!ok);
        }
    }
}
