//! Uncertainty quantification: how far the current situation sits from
//! known territory.  High scores force the decision gate onto System 2.

use serde::Serialize;

const WEIGHT_FAMILIARITY: f32 = 0.5;
const WEIGHT_COMPLEXITY: f32 = 0.3;
const WEIGHT_CONFLICT: f32 = 0.2;
/// Conflicting memories above this rate amplify the score.
const CONFLICT_AMPLIFIER: f32 = 1.5;

const THRESHOLD_KNOWN: f32 = 0.3;
const THRESHOLD_FRONTIER: f32 = 0.6;
const THRESHOLD_UNKNOWN: f32 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeState {
    Known,
    Frontier,
    Unknown,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct UncertaintyProfile {
    pub score: f32,
    pub state: KnowledgeState,
    pub primary_factor: &'static str,
}

impl UncertaintyProfile {
    /// Above this the gate must take the deliberate path.
    pub const SYSTEM_2_FLOOR: f32 = 0.6;

    pub fn forces_deliberation(&self) -> bool {
        self.score >= Self::SYSTEM_2_FLOOR
    }
}

#[derive(Debug, Default)]
pub struct UncertaintyQuantifier;

impl UncertaintyQuantifier {
    /// Combine familiarity (1.0 = seen it before), complexity and internal
    /// conflict into one uncertainty score.
    pub fn quantify(
        &self,
        familiarity: f32,
        complexity: f32,
        conflict_rate: f32,
    ) -> UncertaintyProfile {
        let familiarity = familiarity.clamp(0.0, 1.0);
        let complexity = complexity.clamp(0.0, 1.0);
        let conflict = conflict_rate.clamp(0.0, 1.0);
        let unfamiliarity = 1.0 - familiarity;

        let mut score = unfamiliarity * WEIGHT_FAMILIARITY
            + complexity * WEIGHT_COMPLEXITY
            + conflict * WEIGHT_CONFLICT;
        if conflict > 0.5 {
            score = (score + (conflict - 0.5) * CONFLICT_AMPLIFIER * WEIGHT_CONFLICT).min(1.0);
        }

        let primary_factor = if unfamiliarity >= complexity && unfamiliarity >= conflict {
            "unfamiliarity"
        } else if complexity >= conflict {
            "complexity"
        } else {
            "conflict"
        };

        UncertaintyProfile {
            score,
            state: state_for(score, conflict),
            primary_factor,
        }
    }
}

fn state_for(score: f32, conflict: f32) -> KnowledgeState {
    if conflict > 0.7 {
        return KnowledgeState::Critical;
    }
    if score < THRESHOLD_KNOWN {
        KnowledgeState::Known
    } else if score < THRESHOLD_FRONTIER {
        KnowledgeState::Frontier
    } else if score < THRESHOLD_UNKNOWN {
        KnowledgeState::Unknown
    } else {
        KnowledgeState::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn familiar_simple_situations_are_known() {
        let profile = UncertaintyQuantifier.quantify(0.95, 0.1, 0.0);
        assert_eq!(profile.state, KnowledgeState::Known);
        assert!(!profile.forces_deliberation());
    }

    #[test]
    fn unfamiliar_complex_situations_force_system_2() {
        let profile = UncertaintyQuantifier.quantify(0.1, 0.9, 0.2);
        assert!(profile.score >= 0.6);
        assert!(profile.forces_deliberation());
    }

    #[test]
    fn heavy_conflict_is_critical_regardless_of_score() {
        let profile = UncertaintyQuantifier.quantify(0.9, 0.1, 0.8);
        assert_eq!(profile.state, KnowledgeState::Critical);
    }

    #[test]
    fn conflict_amplification_applies_above_half() {
        let calm = UncertaintyQuantifier.quantify(0.5, 0.5, 0.4);
        let tense = UncertaintyQuantifier.quantify(0.5, 0.5, 0.9);
        assert!(tense.score > calm.score + 0.1);
    }

    #[test]
    fn inputs_are_clamped() {
        let profile = UncertaintyQuantifier.quantify(5.0, -2.0, 0.0);
        assert_eq!(profile.state, KnowledgeState::Known);
        assert!(profile.score >= 0.0 && profile.score <= 1.0);
    }
}
