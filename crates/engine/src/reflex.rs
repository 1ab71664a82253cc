//! Reflexes: registered fast-path handlers fired by the decision gate when
//! a pattern is recognised with high confidence.  No LLM involved.
//! Learned registrations and firing counts persist in
//! `learned_reflexes.json` so restarts keep the acquired fast paths.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const REFLEX_FILE: &str = "learned_reflexes.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflexKind {
    QuickFix,
    Ignore,
    RetryWithHint,
    Escalate,
    Rollback,
    Notify,
}

/// Context handed to a firing reflex.
#[derive(Debug, Clone, Default)]
pub struct ReflexContext {
    pub query: Option<String>,
    pub pattern: String,
    pub confidence: f32,
}

/// A handler returns `Some(summary)` when it consumed the situation; `None`
/// falls through to System 2.
pub type ReflexHandler = Arc<dyn Fn(&ReflexContext) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct ReflexAction {
    pub name: String,
    pub kind: ReflexKind,
    pub min_confidence: f32,
    handler: Option<ReflexHandler>,
}

impl ReflexAction {
    pub fn can_execute(&self, confidence: f32) -> bool {
        confidence >= self.min_confidence
    }

    pub fn execute(&self, context: &ReflexContext) -> Option<String> {
        match &self.handler {
            Some(handler) => handler(context),
            None => None,
        }
    }
}

impl std::fmt::Debug for ReflexAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflexAction")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("min_confidence", &self.min_confidence)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// One persisted registration with its firing tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredReflex {
    name: String,
    kind: ReflexKind,
    min_confidence: f32,
    #[serde(default)]
    fired: u64,
}

/// Engine-owned registry; created at boot, never global.
#[derive(Debug, Default)]
pub struct ReflexRegistry {
    actions: HashMap<String, ReflexAction>,
    fired: HashMap<String, u64>,
}

impl ReflexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a reflex by unique name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: ReflexKind,
        min_confidence: f32,
        handler: Option<ReflexHandler>,
    ) {
        let name = name.into();
        if self.actions.contains_key(&name) {
            warn!(reflex = %name, "replacing existing reflex registration");
        }
        self.actions.insert(
            name.clone(),
            ReflexAction {
                name,
                kind,
                min_confidence,
                handler,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ReflexAction> {
        self.actions.get(name)
    }

    /// A reflex for the pattern that accepts the given confidence.
    pub fn executable_for(&self, pattern: &str, confidence: f32) -> Option<&ReflexAction> {
        self.actions
            .get(pattern)
            .filter(|action| action.can_execute(confidence))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The stock reflexes wired at boot.  Handlers that only produce a
    /// summary are inline; ones needing engine state are installed by the
    /// engine with real closures.
    pub fn register_defaults(&mut self) {
        self.register(
            "syntax_error_retry",
            ReflexKind::RetryWithHint,
            0.85,
            Some(Arc::new(|ctx: &ReflexContext| {
                Some(format!(
                    "queued retry hint for recurring syntax error (confidence {:.2})",
                    ctx.confidence
                ))
            })),
        );
        self.register(
            "import_error_fix",
            ReflexKind::QuickFix,
            0.9,
            Some(Arc::new(|_: &ReflexContext| {
                Some("queued known import correction".to_string())
            })),
        );
        self.register(
            "protected_file_block",
            ReflexKind::Ignore,
            0.95,
            Some(Arc::new(|_: &ReflexContext| {
                Some("ignored repeat attempt against a protected file".to_string())
            })),
        );
        // Escalation deliberately has no handler: it must fall through to
        // System 2.
        self.register("critical_error_escalate", ReflexKind::Escalate, 0.7, None);
        self.register(
            "failed_evolution_rollback",
            ReflexKind::Rollback,
            0.9,
            None,
        );
        self.register(
            "success_notify",
            ReflexKind::Notify,
            0.95,
            Some(Arc::new(|_: &ReflexContext| {
                Some("notified operator of repeated success pattern".to_string())
            })),
        );
        info!(count = self.len(), "default reflexes registered");
    }

    /// Restore learned registrations and firing tallies from disk.
    /// Returns how many entries were loaded.
    pub fn load_learned(&mut self, base_path: &Path) -> usize {
        let path = base_path.join(REFLEX_FILE);
        let stored: Vec<StoredReflex> = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => return 0,
        };

        let count = stored.len();
        for entry in stored {
            self.fired.insert(entry.name.clone(), entry.fired);
            if !self.actions.contains_key(&entry.name) {
                // Learned reflexes come back without handlers for the
                // escalating kinds, and with a summary handler otherwise.
                let handler: Option<ReflexHandler> = match entry.kind {
                    ReflexKind::Escalate | ReflexKind::Rollback => None,
                    _ => {
                        let name = entry.name.clone();
                        Some(Arc::new(move |_: &ReflexContext| {
                            Some(format!("learned reflex '{name}' applied"))
                        }))
                    }
                };
                self.register(entry.name, entry.kind, entry.min_confidence, handler);
            }
        }
        if count > 0 {
            info!(count, "learned reflexes restored");
        }
        count
    }

    /// Record a firing and persist the learned set.
    pub fn note_fired(&mut self, name: &str, base_path: &Path) {
        *self.fired.entry(name.to_string()).or_insert(0) += 1;
        self.persist_learned(base_path);
    }

    pub fn fired_count(&self, name: &str) -> u64 {
        self.fired.get(name).copied().unwrap_or(0)
    }

    fn persist_learned(&self, base_path: &Path) {
        let mut stored: Vec<StoredReflex> = self
            .actions
            .values()
            .map(|action| StoredReflex {
                name: action.name.clone(),
                kind: action.kind,
                min_confidence: action.min_confidence,
                fired: self.fired_count(&action.name),
            })
            .collect();
        stored.sort_by(|a, b| a.name.cmp(&b.name));

        match serde_json::to_string_pretty(&stored) {
            Ok(rendered) => {
                if let Err(err) = std::fs::write(base_path.join(REFLEX_FILE), rendered) {
                    warn!(%err, "reflex store save failed");
                }
            }
            Err(err) => warn!(%err, "reflex store serialisation failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_gate_matches_threshold() {
        let mut registry = ReflexRegistry::new();
        registry.register("r", ReflexKind::Notify, 0.8, None);
        let action = registry.get("r").unwrap();
        assert!(action.can_execute(0.8));
        assert!(action.can_execute(0.95));
        assert!(!action.can_execute(0.79));
    }

    #[test]
    fn names_are_unique_and_replaced_on_rebind() {
        let mut registry = ReflexRegistry::new();
        registry.register("same", ReflexKind::Notify, 0.5, None);
        registry.register("same", ReflexKind::Ignore, 0.9, None);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("same").unwrap().kind, ReflexKind::Ignore);
    }

    #[test]
    fn executable_for_honours_threshold() {
        let mut registry = ReflexRegistry::new();
        registry.register_defaults();
        assert!(registry.executable_for("import_error_fix", 0.95).is_some());
        assert!(registry.executable_for("import_error_fix", 0.5).is_none());
        assert!(registry.executable_for("unknown_pattern", 1.0).is_none());
    }

    #[test]
    fn handlerless_reflex_falls_through() {
        let mut registry = ReflexRegistry::new();
        registry.register_defaults();
        let escalate = registry.get("critical_error_escalate").unwrap();
        assert!(escalate.execute(&ReflexContext::default()).is_none());
    }

    #[test]
    fn handler_consumes_with_summary() {
        let mut registry = ReflexRegistry::new();
        registry.register_defaults();
        let ctx = ReflexContext {
            query: None,
            pattern: "syntax_error_retry".to_string(),
            confidence: 0.9,
        };
        let summary = registry
            .get("syntax_error_retry")
            .unwrap()
            .execute(&ctx)
            .unwrap();
        assert!(summary.contains("retry hint"));
    }

    #[test]
    fn default_set_is_complete() {
        let mut registry = ReflexRegistry::new();
        registry.register_defaults();
        assert_eq!(registry.len(), 6);
        assert!(registry.names().contains(&"protected_file_block"));
    }

    #[test]
    fn firing_counts_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut registry = ReflexRegistry::new();
            registry.register_defaults();
            registry.note_fired("success_notify", dir.path());
            registry.note_fired("success_notify", dir.path());
        }
        let mut registry = ReflexRegistry::new();
        let loaded = registry.load_learned(dir.path());
        assert_eq!(loaded, 6);
        assert_eq!(registry.fired_count("success_notify"), 2);
        // Restored entries remain executable.
        assert!(registry.executable_for("success_notify", 0.99).is_some());
    }

    #[test]
    fn load_learned_registers_novel_entries() {
        let dir = tempfile::tempdir().unwrap();
        let stored = r#"[{"name": "skip_known_noise", "kind": "ignore", "min_confidence": 0.8, "fired": 3}]"#;
        std::fs::write(dir.path().join(REFLEX_FILE), stored).unwrap();

        let mut registry = ReflexRegistry::new();
        registry.load_learned(dir.path());
        let action = registry.get("skip_known_noise").unwrap();
        assert_eq!(action.kind, ReflexKind::Ignore);
        assert!(action.execute(&ReflexContext::default()).unwrap().contains("learned"));
    }
}
