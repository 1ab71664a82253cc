//! Data-API push: when the CLI cannot move the branch, build the commit
//! remotely — one blob per changed file, a tree on the live remote head, a
//! commit with that head as parent, then move the branch ref.  The remote
//! head is always re-read through the API so a stale local ref can never
//! rewrite history.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing::{info, warn};

use crate::git::run_git;

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Paths never shipped through the API channel.
const EXCLUDE_PATTERNS: &[&str] = &[
    ".ain_cache/",
    "data/",
    "lancedb/",
    "backups/",
    "__pycache__",
    ".pyc",
    ".env",
    ".venv",
];

fn api_client(token: &str) -> Result<reqwest::Client> {
    use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).context("building auth header")?,
    );
    headers.insert(USER_AGENT, HeaderValue::from_static("ouro-engine"));
    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(API_TIMEOUT)
        .build()?)
}

async fn api_get(client: &reqwest::Client, url: &str) -> Result<serde_json::Value> {
    let response = client.get(url).send().await?;
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    if !status.is_success() {
        bail!("GET {url} -> {status}: {body}");
    }
    Ok(body)
}

async fn api_post(
    client: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
) -> Result<serde_json::Value> {
    let response = client.post(url).json(payload).send().await?;
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    if !status.is_success() {
        bail!("POST {url} -> {status}: {body}");
    }
    Ok(body)
}

fn is_excluded(path: &str) -> bool {
    EXCLUDE_PATTERNS.iter().any(|pattern| path.contains(pattern))
}

/// Push the working tree's diff against the live remote head as a single
/// API-built commit.  Returns the new commit sha.
pub async fn push_via_api(
    workdir: &Path,
    token: &str,
    repo: &str,
    branch: &str,
    message: &str,
) -> Result<String> {
    if token.is_empty() || repo.is_empty() {
        bail!("data-API push needs a token and repository");
    }

    let client = api_client(token)?;
    let base = format!("https://api.github.com/repos/{repo}");

    // 1. The live remote head, read through the API (local refs ignored).
    let ref_url = format!("{base}/git/ref/heads/{branch}");
    let head_ref = api_get(&client, &ref_url).await.context("reading remote head ref")?;
    let head_sha = head_ref["object"]["sha"]
        .as_str()
        .context("remote ref missing sha")?
        .to_string();
    info!(head = %head_sha[..8.min(head_sha.len())], "remote head via API");

    // 2. Files changed relative to that head.
    let (ok, diff_out) = run_git(workdir, &["diff", "--name-only", &head_sha]).await;
    if !ok {
        bail!("git diff against remote head failed: {diff_out}");
    }
    let changed: Vec<String> = diff_out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !is_excluded(l))
        .map(String::from)
        .collect();
    if changed.is_empty() {
        bail!("no pushable files differ from the remote head");
    }
    info!(files = changed.len(), "building API commit");

    // 3. One blob per readable, text, conflict-free file.
    let mut tree_entries = Vec::new();
    for path in &changed {
        let full = workdir.join(path);
        let Ok(content) = std::fs::read_to_string(&full) else {
            // Deleted or binary files are left out of the fallback commit.
            warn!(file = %path, "skipping unreadable/binary file in API push");
            continue;
        };
        if content.contains("<<<<<<<") || content.contains(">>>>>>>") {
            warn!(file = %path, "skipping conflict-marked file in API push");
            continue;
        }

        let blob = api_post(
            &client,
            &format!("{base}/git/blobs"),
            &json!({ "content": content, "encoding": "utf-8" }),
        )
        .await
        .with_context(|| format!("creating blob for {path}"))?;
        let blob_sha = blob["sha"].as_str().context("blob missing sha")?;

        tree_entries.push(json!({
            "path": path,
            "mode": "100644",
            "type": "blob",
            "sha": blob_sha,
        }));
    }
    if tree_entries.is_empty() {
        bail!("every changed file was excluded from the API push");
    }

    // 4. Tree on the remote base, commit with the remote head as parent.
    let head_commit = api_get(&client, &format!("{base}/git/commits/{head_sha}"))
        .await
        .context("reading head commit")?;
    let base_tree = head_commit["tree"]["sha"]
        .as_str()
        .context("head commit missing tree")?;

    let tree = api_post(
        &client,
        &format!("{base}/git/trees"),
        &json!({ "base_tree": base_tree, "tree": tree_entries }),
    )
    .await
    .context("creating tree")?;
    let tree_sha = tree["sha"].as_str().context("tree missing sha")?;

    let commit = api_post(
        &client,
        &format!("{base}/git/commits"),
        &json!({
            "message": format!("🧬 {message}"),
            "tree": tree_sha,
            "parents": [head_sha],
        }),
    )
    .await
    .context("creating commit")?;
    let commit_sha = commit["sha"].as_str().context("commit missing sha")?.to_string();

    // 5. Move the branch ref to the new commit.
    let response = client
        .patch(format!("{base}/git/refs/heads/{branch}"))
        .json(&json!({ "sha": commit_sha, "force": false }))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        bail!("moving branch ref failed: {status}: {body}");
    }

    info!(sha = %commit_sha, "data-API commit landed");
    Ok(commit_sha)
}
