//! The meta cycle: evaluator → adapter, with a report trail and trend
//! analysis.  The engine feeds the report into the tuner and journals
//! material mode shifts.

use std::path::Path;

use chrono::Utc;
use ouro_memory::{Event, MemoryHit};
use serde::Serialize;
use tracing::info;

use super::adapter::{StrategyAdapter, StrategyMode};
use super::evaluator::MetaEvaluator;

const MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub timestamp: chrono::DateTime<Utc>,
    pub efficacy_score: f32,
    pub confidence_score: f32,
    pub current_mode: StrategyMode,
    pub recommended_mode: StrategyMode,
    pub mode_changed: bool,
    pub reasoning: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug)]
pub struct MetaCycle {
    evaluator: MetaEvaluator,
    adapter: StrategyAdapter,
    current_mode: StrategyMode,
    history: Vec<CycleReport>,
}

impl MetaCycle {
    pub fn new() -> Self {
        Self {
            evaluator: MetaEvaluator,
            adapter: StrategyAdapter,
            current_mode: StrategyMode::Normal,
            history: Vec::new(),
        }
    }

    pub fn current_mode(&self) -> StrategyMode {
        self.current_mode
    }

    /// One full cycle: score efficacy, pick a mode, record the report.
    pub fn process_cycle(
        &mut self,
        recent_history: &[&Event],
        relevant_memories: &[MemoryHit],
        error_count: usize,
        complexity: &str,
        workspace: &Path,
    ) -> CycleReport {
        let evaluation =
            self.evaluator
                .evaluate(recent_history, relevant_memories, None, workspace);

        let recommended =
            self.adapter
                .evaluate_mode(evaluation.efficacy_score, error_count, complexity);
        let mode_changed = recommended != self.current_mode;

        let report = CycleReport {
            timestamp: Utc::now(),
            efficacy_score: evaluation.efficacy_score,
            confidence_score: evaluation.confidence_score,
            current_mode: self.current_mode,
            recommended_mode: recommended,
            mode_changed,
            reasoning: evaluation.reasoning,
            suggestions: suggestions_for(&recommended, evaluation.efficacy_score, mode_changed),
        };

        if mode_changed {
            info!(
                from = self.current_mode.as_str(),
                to = recommended.as_str(),
                efficacy = evaluation.efficacy_score,
                "strategy mode changed"
            );
            self.current_mode = recommended;
        }

        self.history.push(report.clone());
        if self.history.len() > MAX_HISTORY {
            self.history.remove(0);
        }

        report
    }

    pub fn history(&self) -> &[CycleReport] {
        &self.history
    }

    /// Direction of recent efficacy: improving, declining, or stable.
    pub fn efficacy_trend(&self) -> &'static str {
        if self.history.len() < 3 {
            return "insufficient_data";
        }
        let scores: Vec<f32> = self.history.iter().map(|r| r.efficacy_score).collect();
        let recent: f32 = scores[scores.len() - 3..].iter().sum::<f32>() / 3.0;
        let older_slice = &scores[..scores.len() - 3];
        if older_slice.is_empty() {
            return "stable";
        }
        let older: f32 = older_slice.iter().sum::<f32>() / older_slice.len() as f32;
        if recent > older + 0.1 {
            "improving"
        } else if recent < older - 0.1 {
            "declining"
        } else {
            "stable"
        }
    }

    /// Narrative journaled when the mode shifts materially.
    pub fn shift_narrative(&self, report: &CycleReport) -> String {
        format!(
            "Strategy shifted {} → {} (efficacy {:.2}). {}",
            report.current_mode.as_str(),
            report.recommended_mode.as_str(),
            report.efficacy_score,
            report.reasoning
        )
    }
}

impl Default for MetaCycle {
    fn default() -> Self {
        Self::new()
    }
}

fn suggestions_for(mode: &StrategyMode, efficacy: f32, changed: bool) -> Vec<String> {
    let mut suggestions = Vec::new();
    if efficacy < 0.3 {
        suggestions.push("efficacy is very low; rethink the approach".to_string());
    } else if efficacy < 0.5 {
        suggestions.push("efficacy is soft; evolve in smaller increments".to_string());
    }
    if changed {
        match mode {
            StrategyMode::Cautious => {
                suggestions.push("cautious mode: stricter validation, smaller changes".to_string())
            }
            StrategyMode::Accelerated => {
                suggestions.push("accelerated mode: faster cadence, keep quality up".to_string())
            }
            StrategyMode::DeepReflection => suggestions.push(
                "deep reflection: decompose the problem, verify intermediate steps".to_string(),
            ),
            StrategyMode::Normal => {}
        }
    }
    if suggestions.is_empty() {
        suggestions.push("state healthy; keep the current strategy".to_string());
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use ouro_memory::{EventKind, EventStatus};

    fn events(status: EventStatus, n: usize) -> Vec<Event> {
        (0..n)
            .map(|_| Event::new(EventKind::Evolution, "Update", "f.py", "c", status))
            .collect()
    }

    #[test]
    fn failing_history_moves_mode_to_cautious() {
        let dir = tempfile::tempdir().unwrap();
        let mut cycle = MetaCycle::new();
        let failed = events(EventStatus::Failed, 5);
        let refs: Vec<&Event> = failed.iter().collect();

        let report = cycle.process_cycle(&refs, &[], 4, "medium", dir.path());
        assert!(report.mode_changed);
        assert_eq!(report.recommended_mode, StrategyMode::Cautious);
        assert_eq!(cycle.current_mode(), StrategyMode::Cautious);
    }

    #[test]
    fn repeat_cycles_without_change_do_not_flap() {
        let dir = tempfile::tempdir().unwrap();
        let mut cycle = MetaCycle::new();
        let ok = events(EventStatus::Success, 3);
        let refs: Vec<&Event> = ok.iter().collect();

        let first = cycle.process_cycle(&refs, &[], 0, "medium", dir.path());
        let second = cycle.process_cycle(&refs, &[], 0, "medium", dir.path());
        assert_eq!(first.recommended_mode, second.recommended_mode);
        assert!(!second.mode_changed);
    }

    #[test]
    fn history_is_bounded_and_trend_computed() {
        let dir = tempfile::tempdir().unwrap();
        let mut cycle = MetaCycle::new();
        for _ in 0..(MAX_HISTORY + 5) {
            cycle.process_cycle(&[], &[], 0, "medium", dir.path());
        }
        assert_eq!(cycle.history().len(), MAX_HISTORY);
        assert!(["improving", "declining", "stable"].contains(&cycle.efficacy_trend()));
    }

    #[test]
    fn shift_narrative_names_both_modes() {
        let dir = tempfile::tempdir().unwrap();
        let mut cycle = MetaCycle::new();
        let failed = events(EventStatus::Failed, 5);
        let refs: Vec<&Event> = failed.iter().collect();
        let report = cycle.process_cycle(&refs, &[], 4, "medium", dir.path());
        let narrative = cycle.shift_narrative(&report);
        assert!(narrative.contains("normal"));
        assert!(narrative.contains("cautious"));
    }
}
