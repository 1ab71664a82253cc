//! The cognitive scheduler: a single cooperative loop at one-second tick
//! resolution.  Every tick polls the inbox, advances temporal awareness,
//! runs the consciousness/meta/persistence cadences, and — when the
//! evolution cadence fires — arbitrates System 1 against System 2.

use std::time::Duration;

use chrono::Utc;
use ouro_memory::{EventKind, EventStatus, MemoryKind};
use tracing::{error, info, warn};

use crate::gate::{self, ExecutionPath};
use crate::intuition;
use crate::reflex::ReflexContext;
use crate::{Engine, SignalSource};

/// Grace window past the burst deadline before it is cleared.
const BURST_GRACE_SECS: i64 = 10;

impl Engine {
    /// Run the engine until interrupted.  Every tick body is caught at the
    /// boundary: an unexpected error becomes a failed journal event and the
    /// loop continues.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!(
            interval = self.current_interval,
            monologue = self.tuner.current().monologue_interval,
            meta = self.config.engine.meta_interval,
            "scheduler started"
        );
        self.notify("♻️ engine online").await;

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                error!(%err, "tick failed; recorded and continuing");
                self.record_event(
                    EventKind::Journal,
                    "Tick",
                    "",
                    &format!("tick error: {err}"),
                    EventStatus::Failed,
                    Some(err.to_string()),
                )
                .await;
            }
        }
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        // 1. Inbox: each message preempts the periodic cadence.
        self.poll_inbox().await;

        // 2. Subjective time; a phase transition bids for attention.
        let temporal_stats = self.temporal.tick();
        if temporal_stats.phase != self.last_phase {
            self.last_phase = temporal_stats.phase;
            self.attention.add_signal(
                SignalSource::Temporal,
                0.3,
                0.6,
                format!("entered the {} phase", temporal_stats.phase.as_str()),
                600.0,
            );
        }

        // 3. Consciousness cadence.
        let monologue_due = self.last_monologue.elapsed().as_secs()
            >= self.tuner.current().monologue_interval;
        if monologue_due {
            self.last_monologue = std::time::Instant::now();
            self.run_inner_monologue().await;
        }

        // 4. Meta cadence.
        if self.last_meta.elapsed().as_secs() >= self.config.engine.meta_interval {
            self.last_meta = std::time::Instant::now();
            self.run_meta_cycle().await;
            self.run_consolidation().await;
        }

        // 5. Persistence walk; the active goal and any somatic strain keep
        // bidding for focus.
        if self.last_persist.elapsed().as_secs() >= self.config.engine.persist_interval {
            self.last_persist = std::time::Instant::now();
            self.persist_cognitive_state();

            if let Some(step) = self.facts.current_step() {
                self.attention.add_signal(
                    SignalSource::Goal,
                    0.4,
                    0.8,
                    format!("advance {}: {}", step.key, step.name),
                    self.config.engine.persist_interval as f32 * 2.0,
                );
            }
            if self.somatic.tension > 0.7 {
                self.attention.add_signal(
                    SignalSource::System,
                    self.somatic.attention_urgency(),
                    0.6,
                    format!("internal strain: {}", self.somatic.describe()),
                    300.0,
                );
            }
        }

        // 6. Evolution cadence through the decision gate.  Elapsed whole
        // seconds gate the attempt, so two ticks inside one second collapse
        // into a single effective attempt.  Burst attempts count against the
        // published burst limit.
        if self.last_evolution.elapsed().as_secs() >= self.current_interval {
            self.last_evolution = std::time::Instant::now();
            if self.burst_mode {
                self.burst_evolutions += 1;
            }
            self.gated_evolution().await;

            let limit = self.tuner.current().burst_limit;
            if self.burst_mode && self.burst_evolutions >= limit {
                self.end_burst(&format!("burst limit of {limit} evolutions spent"))
                    .await;
            }
        }

        // 7. Burst expiry.
        self.check_burst_expiry().await;

        // Quiet ticks let the somatic state settle.
        self.somatic.relax();
        Ok(())
    }

    async fn poll_inbox(&mut self) {
        if !self.telegram.enabled {
            return;
        }
        let updates = match self.telegram.get_updates(self.last_update_id, 0).await {
            Ok(updates) => updates,
            Err(err) => {
                warn!(%err, "inbox poll failed");
                return;
            }
        };

        for message in self.telegram.filter_own(updates) {
            // Bump the offset first so a crash mid-handling never replays.
            self.last_update_id = message.update_id;

            self.attention.add_signal(
                SignalSource::External,
                0.9,
                0.7,
                message.text.clone(),
                120.0,
            );

            if message.text.trim().starts_with('/') {
                let reply = self.handle_command(&message.text).await;
                let _ = self.telegram.send_message(&reply).await;
            } else {
                self.introspect(Some(message.text), None).await;
            }
            self.last_evolution = std::time::Instant::now();
        }
    }

    /// System 1 vs System 2 arbitration for one due evolution slot.
    async fn gated_evolution(&mut self) {
        let context_key = "system_idle_state".to_string();

        let memories = self.memory.search_relevant(&context_key, 5).await;
        let intuition = intuition::judge(&context_key, &memories);

        // Familiarity mirrors intuition confidence; complexity rises while
        // errors accumulate.
        let error_pressure =
            (self.memory.journal.recent_error_count(10) as f32 / 10.0).clamp(0.0, 1.0);
        let uncertainty =
            self.uncertainty
                .quantify(intuition.confidence, error_pressure, self.somatic.tension);

        if intuition.strength >= crate::IntuitionStrength::Moderate {
            self.attention.add_signal(
                SignalSource::Intuition,
                intuition.confidence,
                0.5,
                intuition.reasoning.clone(),
                90.0,
            );
        }

        let decision = gate::decide(
            &intuition,
            &uncertainty,
            self.resources.status(),
            &self.reflexes,
        );

        match decision.path {
            ExecutionPath::System1Reflex => {
                let name = decision.reflex_name.unwrap_or_default();
                let context = ReflexContext {
                    query: None,
                    pattern: intuition.pattern_match.clone(),
                    confidence: intuition.confidence,
                };
                let consumed = self
                    .reflexes
                    .get(&name)
                    .and_then(|action| action.execute(&context));

                match consumed {
                    Some(summary) => {
                        info!(reflex = %name, %summary, "⚡ reflex consumed the tick");
                        let workspace = self.workspace.clone();
                        self.reflexes.note_fired(&name, &workspace);
                        self.record_event(
                            EventKind::Reflex,
                            "Reflex",
                            &name,
                            &summary,
                            EventStatus::Success,
                            None,
                        )
                        .await;
                    }
                    None => {
                        // Handler declined: fall through to deliberation.
                        let error_context = self.pending_error_context.take();
                        self.introspect(None, error_context).await;
                    }
                }
            }
            ExecutionPath::System2Evolution => {
                info!(reason = %decision.reason, "🧠 deliberate path selected");
                let error_context = self.pending_error_context.take();
                self.introspect(None, error_context).await;
            }
        }
    }

    async fn run_inner_monologue(&mut self) {
        let recent_memories = self
            .memory
            .recent_memories(5)
            .await
            .iter()
            .map(|m| format!("- {}", m.text.chars().take(120).collect::<String>()))
            .collect::<Vec<_>>()
            .join("\n");
        let recent_errors = self
            .memory
            .journal
            .recent_errors(3)
            .iter()
            .map(|e| format!("- {}", e.error.as_deref().unwrap_or(&e.description)))
            .collect::<Vec<_>>()
            .join("\n");
        let step = self
            .facts
            .current_step()
            .map(|s| format!("{} — {}", s.key, s.name))
            .unwrap_or_default();

        let prompt = self.consciousness.monologue_prompt(
            &step,
            &recent_memories,
            &self.memory.journal.evolution_summary(3),
            &recent_errors,
            &self.temporal.narrative(),
            &self.somatic.describe(),
        );

        let Some((thought, usage)) = self
            .muse
            .ask_dreamer(crate::consciousness::MONOLOGUE_SYSTEM_PROMPT, &prompt, 0.8)
            .await
        else {
            return;
        };
        self.resources.track_usage(
            &self.config.llm.dreamer_model,
            usage.prompt_tokens,
            usage.completion_tokens,
        );

        let thought = thought.trim().to_string();
        if thought.is_empty() {
            return;
        }
        info!(thought = %thought.chars().take(120).collect::<String>(), "💭 inner monologue");
        self.consciousness.record_thought(&thought);
        self.store_memory_text(
            &format!("[Inner Monologue] {thought}"),
            MemoryKind::Consciousness,
            "inner_monologue",
        )
        .await;
        self.notify(&format!("💭 {thought}")).await;
    }

    async fn run_meta_cycle(&mut self) {
        let memories = self
            .memory
            .search_relevant("recent evolution outcomes", 5)
            .await;
        let error_count = self.memory.journal.recent_error_count(10);
        let events: Vec<&ouro_memory::Event> = self.memory.journal.recent_events(5);

        let report = self.meta.process_cycle(
            &events,
            &memories,
            error_count,
            "medium",
            &self.workspace,
        );
        drop(events);

        if report.mode_changed {
            let params = self.tuner.apply_strategy(report.recommended_mode);
            if !self.burst_mode && !self.rate_limited {
                self.current_interval = params.evolution_interval;
            }
            let narrative = self.meta.shift_narrative(&report);
            self.store_memory_text(&narrative, MemoryKind::MetaJournal, "meta_cycle")
                .await;
            self.record_event(
                EventKind::Reflection,
                "StrategyShift",
                "",
                &narrative,
                EventStatus::Success,
                None,
            )
            .await;
            self.attention.add_signal(
                SignalSource::Meta,
                0.5,
                0.8,
                narrative,
                300.0,
            );
        }
    }

    /// Distil the recent journal window into one semantic insight.
    async fn run_consolidation(&mut self) {
        let recent = self.memory.journal.recent_events(10);
        if recent.len() < 3 {
            return;
        }
        let lines: Vec<String> = recent
            .iter()
            .map(|e| format!("- [{}] {}: {}", e.timestamp.format("%H:%M"), e.file, e.description))
            .collect();
        let step = self
            .facts
            .current_step()
            .map(|s| s.name)
            .unwrap_or_default();
        let prompt = crate::consolidation::consolidation_prompt(&lines.join("\n"), &step);

        let Some((reply, usage)) = self
            .muse
            .ask_dreamer(crate::consolidation::CONSOLIDATION_SYSTEM_PROMPT, &prompt, 0.4)
            .await
        else {
            return;
        };
        self.resources.track_usage(
            &self.config.llm.dreamer_model,
            usage.prompt_tokens,
            usage.completion_tokens,
        );

        let insight = crate::consolidation::parse_insight(&reply);
        if insight.insight.is_empty() {
            return;
        }
        info!(insight = %insight.insight, "✨ memory consolidated");
        self.store_memory_text(
            &format!("[INSIGHT] {}", insight.insight),
            MemoryKind::Semantic,
            "consolidation",
        )
        .await;
    }

    async fn check_burst_expiry(&mut self) {
        let Some(end) = self.burst_end else {
            return;
        };
        if !self.burst_mode {
            return;
        }
        if Utc::now() > end + chrono::Duration::seconds(BURST_GRACE_SECS) {
            self.end_burst("burst window elapsed").await;
        }
    }

    /// Leave burst mode (deadline or limit), restoring the published
    /// interval and persisting the cleared state.
    async fn end_burst(&mut self, reason: &str) {
        self.burst_mode = false;
        self.burst_end = None;
        self.burst_evolutions = 0;
        self.current_interval = self.tuner.current().evolution_interval;
        let _ = self.kv.clear_burst_mode(self.current_interval).await;
        let interval = self.current_interval;
        self.facts.with_object("system_state", |state| {
            state.insert("burst_mode".into(), serde_json::json!(false));
            state.insert("burst_end_time".into(), serde_json::Value::Null);
            state.insert("current_interval".into(), serde_json::json!(interval));
        });
        info!(interval, reason, "🍃 burst mode ended; normal cadence restored");
        self.notify(&format!("🍃 burst over ({reason}); back to normal cadence"))
            .await;
    }
}
