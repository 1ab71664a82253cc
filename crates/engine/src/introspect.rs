//! System 2: the full evolution pipeline.  Context build → dreamer → coder
//! → guard → apply → test sweep → commit → record, with rollback on test
//! failure and journal records for every terminal state.

use ouro_guard::{ValidationError, validate_code};
use ouro_memory::{Event, EventKind, EventStatus, MemoryKind};
use ouro_muse::DreamInput;
use serde_json::json;
use tracing::{info, warn};

use crate::Engine;
use crate::roadmap_check;

impl Engine {
    /// Run one evolution attempt.  `user_query` preempts the idle cadence;
    /// `error_context` carries crash logs into the dreamer prompt.
    pub async fn introspect(&mut self, user_query: Option<String>, error_context: Option<String>) {
        if !self.muse.is_configured() {
            warn!("llm credentials missing; evolution skipped");
            self.record_failure("Evolution", "", "LLM not configured; memory-only mode", None)
                .await;
            return;
        }

        if let Some(query) = &user_query {
            self.memory
                .record_conversation("user", query, "operator")
                .await;
        }

        // ── context build ─────────────────────────────────────────────────
        let step = self.facts.current_step();
        let step_label = step
            .as_ref()
            .map(|s| format!("{} — {} ({})", s.key, s.name, s.desc))
            .unwrap_or_else(|| "no active step".to_string());
        let criteria = step
            .as_ref()
            .map(|s| roadmap_check::check_step(&self.workspace, &s.key))
            .map(|c| roadmap_check::status_for_dreamer(&c))
            .unwrap_or_else(|| "(no step criteria)".to_string());

        let input = DreamInput {
            system_context: self.facts.system_snapshot(),
            current_step: step_label,
            step_status: criteria,
            recent_evolutions: self.memory.journal.evolution_summary(5),
            file_sizes: self.facts.file_sizes_info(),
            attention_context: self.attention.attention_context(),
            error_context,
            user_query,
        };

        // ── dream + code ──────────────────────────────────────────────────
        let temperature = self.tuner.current().temperature;
        let plan = self.muse.imagine(&input, temperature).await;
        self.resources.track_usage(
            &self.config.llm.coder_model,
            plan.usage.prompt_tokens,
            plan.usage.completion_tokens,
        );

        if let Some(error) = &plan.error {
            if error.contains("429") || error.to_lowercase().contains("rate limit") {
                self.enter_rate_limit_fallback().await;
            }
            self.record_failure("Evolution", "", &format!("pipeline failed: {error}"), None)
                .await;
            self.somatic.on_failure();
            self.notify(&format!("⚠️ evolution failed: {}", clip(error, 200)))
                .await;
            return;
        }
        if plan.no_evolution {
            info!(reason = %plan.intent, "no evolution needed this cycle");
            self.record_event(
                EventKind::Evolution,
                "Skip",
                "",
                &plan.intent,
                EventStatus::Skipped,
                None,
            )
            .await;
            return;
        }

        for warning in &plan.size_warnings {
            warn!(%warning, "large-file warning on proposed update");
        }

        // ── validate + apply ──────────────────────────────────────────────
        let protect = ouro_guard::ProtectList::load(&self.workspace);
        let mut applied = Vec::new();
        for update in &plan.updates {
            let existing = std::fs::read_to_string(self.workspace.join(&update.filename)).ok();
            let validated = match validate_code(
                &protect,
                &update.filename,
                &update.code,
                existing.as_deref(),
            )
            .await
            {
                Ok(code) => code,
                Err(err) => {
                    self.record_validation_failure(&update.filename, &err).await;
                    continue;
                }
            };

            match self.applier.apply_update(&update.filename, &validated) {
                Ok(outcome) => applied.push(outcome),
                Err(err) => {
                    self.record_failure(
                        "Update",
                        &update.filename,
                        &format!("apply failed: {err}"),
                        Some(err.to_string()),
                    )
                    .await;
                }
            }
        }

        if applied.is_empty() {
            self.somatic.on_failure();
            return;
        }

        // ── test sweep, rollback on failure ───────────────────────────────
        let sweep = ouro_exec::run_test_sweep(&self.workspace).await;
        if !sweep.is_success(ouro_exec::restricted_runtime()) {
            warn!(summary = %sweep.summary(), "tests failed; rolling back");
            let unrestored = self.applier.rollback_all(&applied);
            for outcome in &applied {
                self.muse
                    .remember_failure(&outcome.filename, "TestFailure", &sweep.summary());
                self.record_event(
                    EventKind::Evolution,
                    "Update",
                    &outcome.filename,
                    &format!("tests failed; rolled back — {}", sweep.summary()),
                    EventStatus::Failed,
                    Some(sweep.lines.join("\n")),
                )
                .await;
            }
            if !unrestored.is_empty() {
                warn!(files = ?unrestored, "rollback incomplete");
            }
            self.somatic.on_failure();
            self.notify(&format!(
                "🧪 evolution reverted: {}\n{}",
                sweep.summary(),
                clip(&sweep.lines.join("\n"), 500)
            ))
            .await;
            return;
        }

        // ── commit + record ───────────────────────────────────────────────
        let sync = self
            .git
            .commit_and_push(&format!("Evolution: {}", plan.intent))
            .await;
        if !sync.success {
            self.record_failure("Sync", "", &sync.message, None).await;
        }

        for outcome in &applied {
            self.record_event(
                EventKind::Evolution,
                "Update",
                &outcome.filename,
                &plan.intent,
                EventStatus::Success,
                None,
            )
            .await;
        }
        self.add_growth(10);
        self.somatic.on_success();

        self.check_roadmap_progress().await;

        let commit_note = sync
            .sha
            .as_deref()
            .map(|sha| self.git.commit_url(sha))
            .unwrap_or_else(|| sync.message.clone());
        let files: Vec<&str> = applied.iter().map(|o| o.filename.as_str()).collect();
        self.notify(&format!(
            "🧬 evolved: {}\nfiles: {}\n{}",
            clip(&plan.intent, 200),
            files.join(", "),
            commit_note
        ))
        .await;
        info!(files = ?files, "evolution cycle complete");
    }

    /// Advance the roadmap when the focused step's criteria are now met;
    /// the advance itself is committed.
    pub(crate) async fn check_roadmap_progress(&mut self) {
        let Some(step) = self.facts.current_step() else {
            return;
        };
        let check = roadmap_check::check_step(&self.workspace, &step.key);
        if !check.satisfied {
            return;
        }
        let Some(next) = check.next_step else {
            return;
        };
        if self.facts.advance_focus(&step.key, &next) {
            let sync = self
                .git
                .commit_and_push(&format!("Roadmap: {} completed, focus → {next}", step.key))
                .await;
            self.notify(&format!(
                "🗺️ roadmap advanced: {} → {next} ({})",
                step.key, sync.message
            ))
            .await;
        }
    }

    /// Rate-limit detection: stretch the cadence and tell the operator.
    pub(crate) async fn enter_rate_limit_fallback(&mut self) {
        if self.rate_limited {
            return;
        }
        self.rate_limited = true;
        self.current_interval = self.config.engine.rate_limit_interval;
        warn!(interval = self.current_interval, "rate limited; extended fallback interval");
        self.notify(&format!(
            "🚦 provider rate limit hit; slowing to every {}s",
            self.current_interval
        ))
        .await;
    }

    async fn record_validation_failure(&mut self, filename: &str, err: &ValidationError) {
        let error_type = match err {
            ValidationError::SyntaxError(_) => "SyntaxError",
            ValidationError::MissingImport(_) => "ImportError",
            ValidationError::Protected(_) => "PolicyViolation",
            ValidationError::NoChange(_) => "NoChange",
            _ => "ValidationError",
        };
        self.muse
            .remember_failure(filename, error_type, &err.to_string());
        self.record_event(
            EventKind::Evolution,
            "Update",
            filename,
            &err.to_string(),
            EventStatus::Failed,
            Some(err.to_string()),
        )
        .await;
    }

    pub(crate) async fn record_failure(
        &mut self,
        action: &str,
        file: &str,
        description: &str,
        error: Option<String>,
    ) {
        self.record_event(
            EventKind::Evolution,
            action,
            file,
            description,
            EventStatus::Failed,
            error.or_else(|| Some(description.to_string())),
        )
        .await;
    }

    pub(crate) async fn record_event(
        &mut self,
        kind: EventKind,
        action: &str,
        file: &str,
        description: &str,
        status: EventStatus,
        error: Option<String>,
    ) {
        let mut event = Event::new(kind, action, file, description, status);
        event.error = error;
        self.memory.record_event(event).await;
    }

    /// Dual-write a free-form insight into the vector store.
    pub(crate) async fn store_memory_text(
        &self,
        text: &str,
        kind: MemoryKind,
        source: &str,
    ) -> bool {
        self.memory
            .store_text(text, kind, source, json!({ "recorded_at": chrono::Utc::now().to_rfc3339() }))
            .await
    }
}

fn clip(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}…")
    }
}
