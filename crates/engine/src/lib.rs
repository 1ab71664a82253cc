//! The engine: one struct owning concrete collaborators, one cooperative
//! tick loop.  Boot order is deterministic: KV → journal → vector store →
//! fact hydration → messaging → scheduler.

mod attention;
mod consciousness;
mod consolidation;
mod gate;
mod handlers;
mod intuition;
mod introspect;
mod meta;
mod reflex;
mod resources;
mod roadmap_check;
mod scheduler;
mod somatic;
mod temporal;
mod uncertainty;

pub use attention::{AttentionManager, AttentionSignal, SignalSource};
pub use consciousness::ConsciousnessState;
pub use gate::{ExecutionPath, GateDecision};
pub use intuition::{IntuitionResult, IntuitionStrength};
pub use meta::{CycleReport, MetaCycle, RuntimeParameters, RuntimeTuner, StrategyMode};
pub use reflex::{ReflexContext, ReflexKind, ReflexRegistry};
pub use resources::{ResourceMonitor, ResourceStatus};
pub use somatic::SomaticState;
pub use temporal::{TemporalPhase, TemporalState};
pub use uncertainty::{UncertaintyProfile, UncertaintyQuantifier};

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use ouro_config::AppConfig;
use ouro_exec::{Applier, GitSync};
use ouro_facts::FactCore;
use ouro_llm::ChatClient;
use ouro_memory::{EmbedClient, Journal, MemoryHub, StateStore, VectorMemory};
use ouro_muse::Muse;
use ouro_telegram::TelegramBot;

/// Persisted burst state, `ain:state:system_state` in the KV store.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SystemState {
    burst_mode: bool,
    burst_end_time: Option<String>,
    current_interval: u64,
}

pub struct Engine {
    pub config: AppConfig,
    workspace: PathBuf,

    facts: FactCore,
    memory: MemoryHub,
    muse: Muse,
    applier: Applier,
    git: GitSync,
    telegram: TelegramBot,
    kv: StateStore,

    attention: AttentionManager,
    temporal: TemporalState,
    meta: MetaCycle,
    tuner: RuntimeTuner,
    resources: ResourceMonitor,
    reflexes: ReflexRegistry,
    uncertainty: UncertaintyQuantifier,
    somatic: SomaticState,
    consciousness: ConsciousnessState,

    // Scheduler bookkeeping.
    last_update_id: i64,
    last_evolution: Instant,
    last_monologue: Instant,
    last_meta: Instant,
    last_persist: Instant,
    current_interval: u64,
    burst_mode: bool,
    burst_end: Option<DateTime<Utc>>,
    /// Evolution attempts consumed by the active burst; checked against the
    /// published `RuntimeParameters.burst_limit`.
    burst_evolutions: u32,
    rate_limited: bool,
    /// Crash log carried into the first evolution after a recovery.
    pending_error_context: Option<String>,
    last_phase: temporal::TemporalPhase,
}

impl Engine {
    /// Boot the engine against a working tree.  Missing credentials degrade
    /// the affected subsystem to memory-only mode; nothing here is fatal
    /// except an unwritable workspace.
    pub async fn bootstrap(config: AppConfig) -> Result<Self> {
        let workspace = PathBuf::from(&config.agent.workspace_path);
        std::fs::create_dir_all(&workspace)
            .with_context(|| format!("creating workspace at {}", workspace.display()))?;

        for subsystem in config.degraded_subsystems() {
            warn!(subsystem, "credentials missing; running degraded");
        }

        // 1. KV state store.
        let kv = StateStore::open(config.kv.url.as_deref(), &config.kv.key_prefix).await;

        // 2. Journal hydration.
        let journal = Journal::open(
            &workspace,
            config.memory.evolution_cap,
            config.memory.dialogue_cap,
        );

        // 3. Vector store (optional; dimension enforced, mismatch rebuilds).
        let vector_path = if PathBuf::from(&config.memory.vector_path).is_absolute() {
            config.memory.vector_path.clone()
        } else {
            workspace
                .join(&config.memory.vector_path)
                .to_string_lossy()
                .to_string()
        };
        let vector = match VectorMemory::open(&vector_path, config.memory.vector_dim).await {
            Ok(store) => Some(store),
            Err(err) => {
                warn!(%err, "vector store unavailable; journal-only memory");
                None
            }
        };
        let embed = EmbedClient::new(
            &config.llm.base_url,
            config.memory.embedding_api_key.clone(),
            config.memory.vector_dim,
        );
        let memory = MemoryHub::new(journal, vector, embed);

        // 4. Fact core hydration.
        let facts = FactCore::open(&workspace);

        // 5. Messaging.
        let telegram = TelegramBot::new(
            config.telegram.token.clone(),
            config.telegram.chat_id.clone(),
        );

        let dreamer = ChatClient::new(
            &config.llm.base_url,
            config.llm.api_key.clone(),
            &config.llm.dreamer_model,
        );
        let coder = ChatClient::new(
            &config.llm.base_url,
            config.llm.api_key.clone(),
            &config.llm.coder_model,
        );
        let muse = Muse::new(dreamer, coder, facts.prime_directive(), &workspace);

        let applier = Applier::new(&workspace).context("initialising applier")?;
        let git = GitSync::new(
            &workspace,
            config.git.token.clone(),
            &config.git.repo,
            &config.git.branch,
        );

        let mut reflexes = ReflexRegistry::new();
        reflexes.register_defaults();
        reflexes.load_learned(&workspace);

        // A crash log left by the supervisor seeds the first evolution's
        // error context, then is marked consumed.
        let crash_log = workspace.join("last_crash.log");
        let pending_error_context = std::fs::read_to_string(&crash_log).ok().map(|raw| {
            let _ = std::fs::rename(&crash_log, workspace.join("last_crash.log.handled"));
            raw
        });
        if pending_error_context.is_some() {
            info!("crash log found; first evolution will run in error-recovery mode");
        }

        let tuner = RuntimeTuner::new(config.engine.evolution_interval);
        let resources = ResourceMonitor::open(&workspace, config.engine.daily_budget_usd);

        let now = Instant::now();
        let mut engine = Self {
            current_interval: config.engine.evolution_interval,
            workspace,
            facts,
            memory,
            muse,
            applier,
            git,
            telegram,
            kv,
            attention: AttentionManager::new(),
            temporal: TemporalState::new(),
            meta: MetaCycle::new(),
            tuner,
            resources,
            reflexes,
            uncertainty: UncertaintyQuantifier,
            somatic: SomaticState::default(),
            consciousness: ConsciousnessState::new(),
            last_update_id: 0,
            last_evolution: now,
            last_monologue: now,
            last_meta: now,
            last_persist: now,
            burst_mode: false,
            burst_end: None,
            burst_evolutions: 0,
            rate_limited: false,
            pending_error_context,
            last_phase: temporal::TemporalPhase::Nascent,
            config,
        };

        engine.restore_burst_state().await;
        info!(
            workspace = %engine.workspace.display(),
            interval = engine.current_interval,
            vector = engine.memory.vector_connected(),
            kv = engine.kv.is_connected(),
            "engine bootstrapped"
        );
        Ok(engine)
    }

    /// Burst state persisted in the KV store wins over the file default.
    async fn restore_burst_state(&mut self) {
        let Some(state) = self.kv.get_state::<SystemState>("system_state").await else {
            return;
        };
        if !state.burst_mode {
            return;
        }
        let end = state
            .burst_end_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        match end {
            Some(end) if end > Utc::now() => {
                self.burst_mode = true;
                self.burst_end = Some(end);
                self.burst_evolutions = 0;
                self.current_interval = state.current_interval;
                info!(until = %end, interval = state.current_interval, "burst mode restored from KV");
            }
            _ => {
                // Stale burst: clear it in the store.
                let _ = self
                    .kv
                    .clear_burst_mode(self.config.engine.evolution_interval)
                    .await;
            }
        }
    }

    /// Outbound operator notification.
    pub(crate) async fn notify(&self, text: &str) {
        let sent = self.telegram.send_message(&format!("🤖 Ouro: {text}")).await;
        if !sent {
            info!(message = text, "notification (telegram disabled)");
        }
    }

    /// Growth metrics mirrored to `nexus_metrics.json` on each persistence
    /// walk; a compact externally-readable vitals file.
    fn write_metrics_file(&self) {
        let temporal = self.temporal.stats();
        let metrics = json!({
            "growth_score": self.growth_score(),
            "total_cycles": temporal.total_cycles,
            "uptime_seconds": temporal.uptime_seconds as u64,
            "phase": temporal.phase.as_str(),
            "journal_events": self.memory.journal.evolutions().len(),
            "recent_failures": self.memory.journal.recent_error_count(20),
            "strategy_mode": self.meta.current_mode().as_str(),
            "updated_at": Utc::now().to_rfc3339(),
        });
        let path = self.workspace.join("nexus_metrics.json");
        if let Err(err) = std::fs::write(&path, metrics.to_string()) {
            warn!(%err, "metrics file write failed");
        }
    }

    /// Snapshot cognitive state into the fact core; the persistence walk.
    pub(crate) fn persist_cognitive_state(&mut self) {
        let temporal = self.temporal.stats();
        let focus = self
            .attention
            .current_focus()
            .map(|f| f.content.chars().take(80).collect::<String>());
        let somatic = self.somatic;
        let mode = self.meta.current_mode().as_str().to_string();
        let resources = format!("{:?}", self.resources.status());

        self.facts.with_object("cognitive_state", |state| {
            state.insert("phase".into(), json!(temporal.phase.as_str()));
            state.insert("total_cycles".into(), json!(temporal.total_cycles));
            state.insert(
                "subjective_pace".into(),
                json!((temporal.subjective_pace * 100.0).round() / 100.0),
            );
            state.insert("strategy_mode".into(), json!(mode));
            state.insert("attention_focus".into(), json!(focus));
            state.insert("valence".into(), json!(somatic.valence));
            state.insert("tension".into(), json!(somatic.tension));
            state.insert("resources".into(), json!(resources));
            state.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
        });
        self.write_metrics_file();
    }

    pub(crate) fn growth_score(&self) -> i64 {
        self.facts
            .get_fact(&["growth_score"])
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0)
    }

    pub(crate) fn add_growth(&mut self, points: i64) {
        let score = self.growth_score() + points;
        self.facts.add_fact("growth_score", json!(score));
    }
}
