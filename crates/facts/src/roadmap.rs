//! Roadmap state: ordered evolution steps grouped into phases, with a
//! single `current_focus` pointer and a generated `ROADMAP.md` view.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::FactCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "completed" => StepStatus::Completed,
            "in_progress" => StepStatus::InProgress,
            _ => StepStatus::Pending,
        }
    }
}

/// One roadmap step as read out of the fact map.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub key: String,
    pub name: String,
    pub desc: String,
    pub status: StepStatus,
    pub phase: u8,
}

fn phase_name(phase: u8) -> &'static str {
    match phase {
        1 => "🏗️ Infrastructure",
        2 => "🧠 Memory",
        3 => "🌅 Awakening",
        4 => "💫 Consciousness",
        _ => "🚀 Transcendence",
    }
}

pub(crate) fn default_roadmap() -> Value {
    json!({
        "step_1": {"status": "completed", "phase": 1, "name": "Muse & Nexus", "desc": "Intent-to-code pipeline"},
        "step_2": {"status": "completed", "phase": 1, "name": "Guard & Overseer", "desc": "Validation with self-healing"},
        "step_3": {"status": "completed", "phase": 1, "name": "Persistence Bridge", "desc": "Durable state pipeline"},
        "step_4": {"status": "in_progress", "phase": 2, "name": "Vector Memory", "desc": "Semantic recall over embeddings"},
        "step_5": {"status": "pending", "phase": 3, "name": "Inner Monologue", "desc": "Unprompted self-reflection"},
        "step_6": {"status": "pending", "phase": 3, "name": "Intentionality", "desc": "Autonomous goal setting"},
        "step_7": {"status": "pending", "phase": 3, "name": "Meta-Cognition", "desc": "Thinking about thinking"},
        "step_8": {"status": "pending", "phase": 3, "name": "Intuition", "desc": "Fast pattern-matched judgement"},
        "step_9": {"status": "pending", "phase": 4, "name": "Temporal Self", "desc": "Past, present and future selves"},
        "step_10": {"status": "pending", "phase": 4, "name": "Unified Consciousness", "desc": "A single stream of focus"},
        "step_11": {"status": "pending", "phase": 4, "name": "Limitation Awareness", "desc": "Knowing what I cannot do"},
        "step_12": {"status": "pending", "phase": 5, "name": "Creativity", "desc": "Generating new ideas"},
        "step_13": {"status": "pending", "phase": 5, "name": "Empathy", "desc": "Theory of mind"},
        "step_14": {"status": "pending", "phase": 5, "name": "Wisdom", "desc": "Extracting principles"},
        "step_15": {"status": "pending", "phase": 5, "name": "Self-Transcendence", "desc": "Recursive self-improvement"},
        "current_focus": "step_4"
    })
}

fn parse_step(key: &str, raw: &Value) -> Option<StepRecord> {
    let obj = raw.as_object()?;
    Some(StepRecord {
        key: key.to_string(),
        name: obj.get("name")?.as_str().unwrap_or(key).to_string(),
        desc: obj
            .get("desc")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        status: StepStatus::parse(obj.get("status").and_then(Value::as_str).unwrap_or("pending")),
        phase: obj.get("phase").and_then(Value::as_u64).unwrap_or(1) as u8,
    })
}

impl FactCore {
    /// The step `current_focus` points at, via direct key lookup.
    pub fn current_step(&self) -> Option<StepRecord> {
        let focus = self.get_fact_str(&["roadmap", "current_focus"])?.to_string();
        self.lookup_step_direct(&focus)
    }

    pub fn lookup_step_direct(&self, key: &str) -> Option<StepRecord> {
        let raw = self.get_fact(&["roadmap", key])?;
        parse_step(key, raw)
    }

    /// The same lookup via phase-grouped traversal.  Both paths must agree
    /// for every resolvable focus.
    pub fn lookup_step_nested(&self, key: &str) -> Option<StepRecord> {
        for phase in 1..=5u8 {
            if let Some(step) = self
                .roadmap_steps()
                .into_iter()
                .filter(|s| s.phase == phase)
                .find(|s| s.key == key)
            {
                return Some(step);
            }
        }
        None
    }

    /// All steps ordered by their numeric suffix.
    pub fn roadmap_steps(&self) -> Vec<StepRecord> {
        let Some(roadmap) = self.get_fact(&["roadmap"]).and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut steps: Vec<StepRecord> = roadmap
            .iter()
            .filter(|(k, _)| k.starts_with("step_"))
            .filter_map(|(k, v)| parse_step(k, v))
            .collect();
        steps.sort_by_key(|s| step_number(&s.key));
        steps
    }

    /// Set one step's status.  Moving a step to `in_progress` also moves
    /// `current_focus` onto it.  Persists on change.
    pub fn update_step_status(&mut self, key: &str, status: StepStatus) -> bool {
        let known = self.get_fact(&["roadmap", key]).is_some();
        if !known {
            return false;
        }
        self.with_object("roadmap", |roadmap| {
            if let Some(step) = roadmap.get_mut(key).and_then(Value::as_object_mut) {
                step.insert("status".into(), json!(status.as_str()));
            }
            if status == StepStatus::InProgress {
                roadmap.insert("current_focus".into(), json!(key));
            }
        });
        info!(step = key, status = status.as_str(), "roadmap step updated");
        true
    }

    /// Complete the focused step and advance `current_focus` to `next_key`.
    /// Calling it again for the same pair is a no-op, so a repeated
    /// criteria check advances at most once.
    pub fn advance_focus(&mut self, completed_key: &str, next_key: &str) -> bool {
        let focus = self
            .get_fact_str(&["roadmap", "current_focus"])
            .unwrap_or_default()
            .to_string();
        if focus != completed_key {
            return false;
        }
        self.with_object("roadmap", |roadmap| {
            if let Some(step) = roadmap.get_mut(completed_key).and_then(Value::as_object_mut) {
                step.insert("status".into(), json!("completed"));
            }
            if let Some(step) = roadmap.get_mut(next_key).and_then(Value::as_object_mut) {
                step.insert("status".into(), json!("in_progress"));
            }
            roadmap.insert("current_focus".into(), json!(next_key));
        });
        info!(from = completed_key, to = next_key, "roadmap focus advanced");
        true
    }

    /// Human-readable roadmap, also written to `ROADMAP.md` on persist.
    pub fn formatted_roadmap(&self) -> String {
        let focus = self
            .get_fact_str(&["roadmap", "current_focus"])
            .unwrap_or_default()
            .to_string();
        let steps = self.roadmap_steps();

        let mut display = String::from("\n🗺️ **Evolution Roadmap**\n");
        display.push_str(&"=".repeat(40));
        display.push('\n');

        for phase in 1..=5u8 {
            let in_phase: Vec<&StepRecord> = steps.iter().filter(|s| s.phase == phase).collect();
            if in_phase.is_empty() {
                continue;
            }
            display.push_str(&format!("\n**{}**\n", phase_name(phase)));
            for step in in_phase {
                let icon = match step.status {
                    StepStatus::Completed => "✅",
                    StepStatus::InProgress => "🔥",
                    StepStatus::Pending => "⏳",
                };
                let marker = if step.key == focus { " 👈" } else { "" };
                display.push_str(&format!(
                    "{icon} Step {}: {}{marker}\n",
                    step_number(&step.key),
                    step.name
                ));
            }
        }

        display.push('\n');
        display.push_str(&"=".repeat(40));
        display
    }
}

fn step_number(key: &str) -> u32 {
    key.rsplit('_')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> (tempfile::TempDir, FactCore) {
        let dir = tempfile::tempdir().unwrap();
        let core = FactCore::open(dir.path());
        (dir, core)
    }

    #[test]
    fn focus_resolves_to_exactly_one_step() {
        let (_dir, core) = core();
        let step = core.current_step().unwrap();
        assert_eq!(step.key, "step_4");
        assert_eq!(step.status, StepStatus::InProgress);
    }

    #[test]
    fn direct_and_nested_lookup_agree() {
        let (_dir, core) = core();
        for step in core.roadmap_steps() {
            assert_eq!(
                core.lookup_step_direct(&step.key),
                core.lookup_step_nested(&step.key),
                "lookup paths diverged for {}",
                step.key
            );
        }
    }

    #[test]
    fn advance_moves_focus_once() {
        let (_dir, mut core) = core();
        assert!(core.advance_focus("step_4", "step_5"));
        assert_eq!(
            core.get_fact_str(&["roadmap", "current_focus"]),
            Some("step_5")
        );
        assert_eq!(
            core.lookup_step_direct("step_4").unwrap().status,
            StepStatus::Completed
        );
        assert_eq!(
            core.lookup_step_direct("step_5").unwrap().status,
            StepStatus::InProgress
        );

        // The same criteria check applied twice advances at most once.
        assert!(!core.advance_focus("step_4", "step_5"));
        assert_eq!(
            core.get_fact_str(&["roadmap", "current_focus"]),
            Some("step_5")
        );
    }

    #[test]
    fn in_progress_update_retargets_focus() {
        let (_dir, mut core) = core();
        assert!(core.update_step_status("step_7", StepStatus::InProgress));
        assert_eq!(
            core.get_fact_str(&["roadmap", "current_focus"]),
            Some("step_7")
        );
        assert!(!core.update_step_status("step_99", StepStatus::Pending));
    }

    #[test]
    fn roadmap_renders_markers() {
        let (_dir, core) = core();
        let rendered = core.formatted_roadmap();
        assert!(rendered.contains("🔥 Step 4: Vector Memory 👈"));
        assert!(rendered.contains("✅ Step 1: Muse & Nexus"));
        assert!(rendered.contains("⏳ Step 15: Self-Transcendence"));
    }

    #[test]
    fn roadmap_md_written_on_persist() {
        let (dir, mut core) = core();
        core.update_step_status("step_5", StepStatus::InProgress);
        let rendered = std::fs::read_to_string(dir.path().join("ROADMAP.md")).unwrap();
        assert!(rendered.contains("Evolution Roadmap"));
    }
}
