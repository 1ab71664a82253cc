//! Slash-command routing for the operator channel.  Every command returns
//! human-readable text; anything else becomes an evolution query.

use chrono::{Duration as ChronoDuration, Utc};
use tracing::info;

use crate::Engine;

impl Engine {
    /// Handle one `/command` line; returns the reply text.
    pub async fn handle_command(&mut self, line: &str) -> String {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let args = parts.next().unwrap_or("").trim().to_string();

        match command {
            "/status" => self.status_text().await,
            "/evolve" => {
                self.notify("🧠 manual evolution starting…").await;
                let query = if args.is_empty() { None } else { Some(args) };
                self.introspect(query, None).await;
                "evolution cycle finished; see the journal for the outcome".to_string()
            }
            "/sync" => {
                let outcome = self.git_sync("Manual sync requested by operator").await;
                outcome
            }
            "/roadmap" => self.facts.formatted_roadmap(),
            "/bridge" => self.bridge_text().await,
            "/burst" => self.enter_burst_mode().await,
            "/audit" => self.audit_text(),
            "/debug" => self.debug_text(),
            "/help" | "/start" => help_text(),
            _ => format!("unknown command '{command}'. {}", help_text()),
        }
    }

    async fn status_text(&mut self) -> String {
        let temporal = self.temporal.stats();
        let focus = self
            .attention
            .current_focus()
            .map(|f| f.content.chars().take(60).collect::<String>())
            .unwrap_or_else(|| "idle".to_string());
        [
            format!(
                "🧠 {} — growth score {}",
                self.facts
                    .get_fact_str(&["identity", "name"])
                    .unwrap_or("Ouro"),
                self.growth_score()
            ),
            format!(
                "mode: {} | interval: {}s | burst: {}",
                self.meta.current_mode().as_str(),
                self.current_interval,
                self.burst_mode
            ),
            format!(
                "uptime: {}s | cycles: {} | phase: {}",
                temporal.uptime_seconds as u64,
                temporal.total_cycles,
                temporal.phase.as_str()
            ),
            format!(
                "memories: {} vectors, {} journal events",
                self.memory.memory_count().await,
                self.memory.journal.evolutions().len()
            ),
            format!("feeling: {}", self.somatic.describe()),
            format!("focus: {focus}"),
            self.resources.report(),
        ]
        .join("\n")
    }

    async fn bridge_text(&self) -> String {
        [
            "=== MEMORY BRIDGE ===".to_string(),
            format!(
                "vector store: {} ({} rows)",
                if self.memory.vector_connected() {
                    "connected"
                } else {
                    "offline"
                },
                self.memory.memory_count().await
            ),
            format!(
                "kv store: {}",
                if self.kv.is_connected() {
                    "connected"
                } else {
                    "offline"
                }
            ),
            format!(
                "journal: {} evolutions on disk",
                self.memory.journal.evolutions().len()
            ),
        ]
        .join("\n")
    }

    fn audit_text(&self) -> String {
        format!(
            "{}\n{}",
            self.memory.journal.evolution_summary(10),
            self.memory.journal.lessons_learned(5)
        )
    }

    fn debug_text(&self) -> String {
        let params = self.tuner.current();
        [
            "=== DEBUG ===".to_string(),
            format!(
                "runtime params: interval={}s temp={:.2} validation={} monologue={}s burst_limit={} mode={}",
                params.evolution_interval,
                params.temperature,
                params.validation_level,
                params.monologue_interval,
                params.burst_limit,
                params.active_mode
            ),
            format!("efficacy trend: {}", self.meta.efficacy_trend()),
            format!("reflexes: {}", self.reflexes.names().join(", ")),
            format!("rate-limited: {}", self.rate_limited),
            self.resources.report(),
        ]
        .join("\n")
    }

    /// `/burst`: 600-second cadence for one hour, persisted so a restart
    /// resumes the burst.
    pub(crate) async fn enter_burst_mode(&mut self) -> String {
        let end = Utc::now() + ChronoDuration::seconds(self.config.engine.burst_duration as i64);
        self.burst_mode = true;
        self.burst_end = Some(end);
        self.burst_evolutions = 0;
        self.current_interval = self.config.engine.burst_interval;

        let persisted = self
            .kv
            .set_burst_mode(&end.to_rfc3339(), self.current_interval)
            .await;
        let burst_interval = self.config.engine.burst_interval;
        self.facts.with_object("system_state", |state| {
            state.insert("burst_mode".into(), serde_json::json!(true));
            state.insert("burst_end_time".into(), serde_json::json!(end.to_rfc3339()));
            state.insert("current_interval".into(), serde_json::json!(burst_interval));
        });

        let limit = self.tuner.current().burst_limit;
        info!(until = %end, persisted, limit, "burst mode engaged");
        self.notify(&format!(
            "🚀 burst mode: evolving every {}s until {} (at most {limit} evolutions)",
            self.current_interval,
            end.format("%H:%M:%S UTC")
        ))
        .await;
        format!("burst engaged until {end}")
    }

    /// Manual git sync used by `/sync`.
    async fn git_sync(&mut self, message: &str) -> String {
        let outcome = self.git.commit_and_push(message).await;
        if !outcome.success {
            self.record_failure("Sync", "", &outcome.message, None).await;
        }
        match &outcome.sha {
            Some(sha) => format!("{} — {}", outcome.message, self.git.commit_url(sha)),
            None => outcome.message.clone(),
        }
    }
}

fn help_text() -> String {
    [
        "commands:",
        "/status — engine vitals",
        "/evolve [focus] — run an evolution cycle now",
        "/sync — commit and push the working tree",
        "/roadmap — progress map",
        "/bridge — memory substrate status",
        "/burst — fast cadence for one hour",
        "/audit — recent journal and lessons",
        "/debug — runtime parameters",
    ]
    .join("\n")
}
