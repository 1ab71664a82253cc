//! Attention: typed signals compete by salience and a single winner becomes
//! the current focus, which biases downstream prompt context.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Focus-switch history depth.
const HISTORY_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    External,
    Intuition,
    Temporal,
    Goal,
    Meta,
    System,
}

impl SignalSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalSource::External => "external",
            SignalSource::Intuition => "intuition",
            SignalSource::Temporal => "temporal",
            SignalSource::Goal => "goal",
            SignalSource::Meta => "meta",
            SignalSource::System => "system",
        }
    }
}

/// An ephemeral bid for focus.
#[derive(Debug, Clone)]
pub struct AttentionSignal {
    pub id: String,
    pub source: SignalSource,
    /// Does this need handling *now*?  Clamped to [0, 1].
    pub urgency: f32,
    /// Does this matter long-term?  Clamped to [0, 1].
    pub importance: f32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: f32,
}

impl AttentionSignal {
    /// salience = 0.6·urgency + 0.4·importance
    pub fn salience(&self) -> f32 {
        self.urgency * 0.6 + self.importance * 0.4
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.created_at).num_milliseconds() as f32 / 1000.0;
        age >= self.ttl_seconds
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusSwitch {
    pub timestamp: DateTime<Utc>,
    pub source: SignalSource,
    pub salience: f32,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct AttentionManager {
    signals: Vec<AttentionSignal>,
    current_focus_id: Option<String>,
    history: Vec<FocusSwitch>,
}

impl AttentionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signal; urgency/importance are clamped.  Returns its id.
    pub fn add_signal(
        &mut self,
        source: SignalSource,
        urgency: f32,
        importance: f32,
        content: impl Into<String>,
        ttl_seconds: f32,
    ) -> String {
        let signal = AttentionSignal {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            source,
            urgency: urgency.clamp(0.0, 1.0),
            importance: importance.clamp(0.0, 1.0),
            content: content.into(),
            created_at: Utc::now(),
            ttl_seconds,
        };
        let id = signal.id.clone();
        self.signals.push(signal);
        id
    }

    pub fn remove_signal(&mut self, id: &str) -> bool {
        let before = self.signals.len();
        self.signals.retain(|s| s.id != id);
        self.signals.len() < before
    }

    fn cleanup(&mut self) {
        let now = Utc::now();
        self.signals.retain(|s| !s.is_expired(now));
    }

    /// Winner-take-all focus election: cleanup, then a deterministic stable
    /// sort by salience descending with id as tiebreaker.
    pub fn current_focus(&mut self) -> Option<AttentionSignal> {
        self.cleanup();
        if self.signals.is_empty() {
            self.current_focus_id = None;
            return None;
        }

        let mut ranked: Vec<&AttentionSignal> = self.signals.iter().collect();
        ranked.sort_by(|a, b| {
            b.salience()
                .total_cmp(&a.salience())
                .then_with(|| a.id.cmp(&b.id))
        });
        let top = ranked[0].clone();

        if self.current_focus_id.as_deref() != Some(&top.id) {
            self.current_focus_id = Some(top.id.clone());
            debug!(source = top.source.as_str(), salience = top.salience(), "focus switched");
            self.history.push(FocusSwitch {
                timestamp: Utc::now(),
                source: top.source,
                salience: top.salience(),
                content: top.content.chars().take(50).collect(),
            });
            if self.history.len() > HISTORY_CAP {
                self.history.remove(0);
            }
        }

        Some(top)
    }

    pub fn active_signals(&mut self) -> Vec<AttentionSignal> {
        self.cleanup();
        self.signals.clone()
    }

    pub fn focus_history(&self) -> &[FocusSwitch] {
        &self.history
    }

    /// Short prompt fragment describing what the system is attending to.
    pub fn attention_context(&mut self) -> String {
        let focus = self.current_focus();
        let background = self.signals.len().saturating_sub(1);
        match focus {
            None => "Attention Status: Idle (no active signals)".to_string(),
            Some(focus) => {
                let content: String = focus.content.chars().take(100).collect();
                let mut lines = vec![
                    "Attention Status: FOCUSED".to_string(),
                    format!("- Source: {}", focus.source.as_str().to_uppercase()),
                    format!(
                        "- Salience: {:.2} (urg:{:.1}, imp:{:.1})",
                        focus.salience(),
                        focus.urgency,
                        focus.importance
                    ),
                    format!("- Content: {content}"),
                ];
                if background > 0 {
                    lines.push(format!("- Background signals: {background}"));
                }
                lines.join("\n")
            }
        }
    }

    pub fn clear(&mut self) {
        self.signals.clear();
        self.current_focus_id = None;
    }
}
