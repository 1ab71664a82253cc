//! Self-efficacy evaluation: how likely is the next action to succeed,
//! judged from recent momentum, remembered experience and target
//! complexity.

use std::path::Path;

use ouro_guard::ProtectList;
use ouro_memory::{Event, EventStatus, MemoryHit};
use serde::Serialize;

const LARGE_FILE_THRESHOLD: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct EfficacyEvaluation {
    /// Clamped to [0.1, 1.0].
    pub confidence_score: f32,
    pub efficacy_score: f32,
    /// high_efficacy ≥ 0.7 > uncertain ≥ 0.4 > low_efficacy.
    pub status: &'static str,
    pub reasoning: String,
    pub factors: Factors,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Factors {
    pub success_momentum: f32,
    pub memory_relevance: f32,
    pub complexity_penalty: f32,
}

#[derive(Debug, Default)]
pub struct MetaEvaluator;

impl MetaEvaluator {
    pub fn evaluate(
        &self,
        recent_history: &[&Event],
        relevant_memories: &[MemoryHit],
        target_file: Option<&str>,
        workspace: &Path,
    ) -> EfficacyEvaluation {
        let mut score = 0.5f32;
        let mut reasons = Vec::new();
        let mut factors = Factors::default();

        let (momentum, momentum_reason) = momentum_of(recent_history);
        score += momentum;
        factors.success_momentum = momentum;
        reasons.push(momentum_reason);

        let (relevance, relevance_reason) = relevance_of(relevant_memories);
        score += relevance;
        factors.memory_relevance = relevance;
        reasons.push(relevance_reason);

        if let Some(target) = target_file {
            let (penalty, penalty_reason) = complexity_of(target, workspace);
            score += penalty;
            factors.complexity_penalty = penalty;
            reasons.push(penalty_reason);
        }

        let score = score.clamp(0.1, 1.0);
        EfficacyEvaluation {
            confidence_score: score,
            efficacy_score: score,
            status: status_of(score),
            reasoning: reasons.join(" | "),
            factors,
        }
    }
}

fn momentum_of(recent: &[&Event]) -> (f32, String) {
    if recent.is_empty() {
        return (0.0, "no recent history (neutral)".to_string());
    }
    let successes = recent
        .iter()
        .filter(|e| e.status == EventStatus::Success)
        .count();
    let rate = successes as f32 / recent.len() as f32;
    if rate >= 0.8 {
        (0.2, format!("high success rate ({successes}/{})", recent.len()))
    } else if rate >= 0.6 {
        (0.1, format!("good success rate ({:.0}%)", rate * 100.0))
    } else if rate >= 0.4 {
        (0.0, format!("middling success rate ({:.0}%)", rate * 100.0))
    } else {
        (-0.2, format!("low success rate ({:.0}%) — caution", rate * 100.0))
    }
}

fn relevance_of(memories: &[MemoryHit]) -> (f32, String) {
    if memories.is_empty() {
        return (-0.1, "no similar past experience (uncertain)".to_string());
    }
    let high_quality = memories.iter().filter(|m| m.distance < 0.5).count();
    if high_quality >= 2 {
        (0.2, format!("{high_quality} high-quality similar experiences"))
    } else if memories.len() >= 3 {
        (0.15, format!("{} similar experiences", memories.len()))
    } else {
        (0.1, format!("{} related experience(s)", memories.len()))
    }
}

fn complexity_of(target: &str, workspace: &Path) -> (f32, String) {
    let protect = ProtectList::load(workspace);
    if protect.is_protected(target) {
        return (-0.3, format!("protected file ({target}) — modification risk"));
    }

    let full = workspace.join(target);
    if !full.exists() {
        return (0.1, "new file — low collision risk".to_string());
    }
    match std::fs::read_to_string(&full) {
        Ok(content) => {
            let lines = content.lines().count();
            if lines > LARGE_FILE_THRESHOLD {
                (-0.15, format!("large file ({lines} lines) — context limits"))
            } else if lines > 100 {
                (-0.05, format!("medium file ({lines} lines)"))
            } else {
                (0.05, format!("small file ({lines} lines) — easy edit"))
            }
        }
        Err(_) => (0.0, "file size unreadable".to_string()),
    }
}

fn status_of(score: f32) -> &'static str {
    if score >= 0.7 {
        "high_efficacy"
    } else if score >= 0.4 {
        "uncertain"
    } else {
        "low_efficacy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ouro_memory::EventKind;

    fn event(status: EventStatus) -> Event {
        Event::new(EventKind::Evolution, "Update", "f.py", "change", status)
    }

    fn hit(distance: f32) -> MemoryHit {
        MemoryHit {
            id: String::new(),
            text: "memory".to_string(),
            memory_type: "evolution".to_string(),
            source: "test".to_string(),
            timestamp: String::new(),
            metadata: "{}".to_string(),
            distance,
        }
    }

    #[test]
    fn streak_of_successes_scores_high() {
        let dir = tempfile::tempdir().unwrap();
        let events: Vec<Event> = (0..5).map(|_| event(EventStatus::Success)).collect();
        let refs: Vec<&Event> = events.iter().collect();
        let memories = vec![hit(0.2), hit(0.3)];

        let eval = MetaEvaluator.evaluate(&refs, &memories, None, dir.path());
        // 0.5 + 0.2 momentum + 0.2 relevance.
        assert!((eval.efficacy_score - 0.9).abs() < 1e-6);
        assert_eq!(eval.status, "high_efficacy");
    }

    #[test]
    fn failures_and_no_memory_score_low() {
        let dir = tempfile::tempdir().unwrap();
        let events: Vec<Event> = (0..5).map(|_| event(EventStatus::Failed)).collect();
        let refs: Vec<&Event> = events.iter().collect();

        let eval = MetaEvaluator.evaluate(&refs, &[], None, dir.path());
        // 0.5 - 0.2 - 0.1 = 0.2.
        assert!(eval.efficacy_score < 0.4);
        assert_eq!(eval.status, "low_efficacy");
    }

    #[test]
    fn protected_target_pulls_the_score_down() {
        let dir = tempfile::tempdir().unwrap();
        let eval = MetaEvaluator.evaluate(&[], &[hit(0.2), hit(0.2)], Some("main.py"), dir.path());
        assert!(eval.factors.complexity_penalty <= -0.29);
        assert!(eval.reasoning.contains("protected"));
    }

    #[test]
    fn new_file_target_gets_a_bonus() {
        let dir = tempfile::tempdir().unwrap();
        let eval = MetaEvaluator.evaluate(&[], &[], Some("fresh/module.py"), dir.path());
        assert!(eval.factors.complexity_penalty > 0.0);
    }

    #[test]
    fn large_file_target_is_penalised() {
        let dir = tempfile::tempdir().unwrap();
        let big: String = (0..250).map(|i| format!("x{i} = {i}\n")).collect();
        std::fs::write(dir.path().join("big.py"), big).unwrap();
        let eval = MetaEvaluator.evaluate(&[], &[], Some("big.py"), dir.path());
        assert!((eval.factors.complexity_penalty + 0.15).abs() < 1e-6);
    }

    #[test]
    fn score_never_leaves_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let events: Vec<Event> = (0..9).map(|_| event(EventStatus::Failed)).collect();
        let refs: Vec<&Event> = events.iter().collect();
        let eval = MetaEvaluator.evaluate(&refs, &[], Some("main.py"), dir.path());
        assert!(eval.efficacy_score >= 0.1);
    }
}
