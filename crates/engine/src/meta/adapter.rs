//! Strategy selection: a stateless decision table from evaluation metrics
//! to an operating mode.

use serde::{Deserialize, Serialize};

const HIGH_EFFICACY: f32 = 0.75;
const LOW_EFFICACY: f32 = 0.4;
const HIGH_ERROR_COUNT: usize = 3;

/// Named operating point; the tuner maps each to concrete parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    Normal,
    /// High confidence: shorter intervals, bolder sampling.
    Accelerated,
    /// Error-prone or ineffective: longer intervals, strict validation.
    Cautious,
    /// Facing genuinely hard problems: slowest cadence, coldest sampling,
    /// most frequent monologue.
    DeepReflection,
}

impl StrategyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyMode::Normal => "normal",
            StrategyMode::Accelerated => "accelerated",
            StrategyMode::Cautious => "cautious",
            StrategyMode::DeepReflection => "deep_reflection",
        }
    }
}

#[derive(Debug, Default)]
pub struct StrategyAdapter;

impl StrategyAdapter {
    /// Decision table, first match wins:
    /// complexity high → DeepReflection; errors ≥ 3 → Cautious;
    /// efficacy ≥ 0.75 with ≤ 1 error → Accelerated; efficacy ≤ 0.4 →
    /// Cautious; otherwise Normal.
    pub fn evaluate_mode(
        &self,
        efficacy_score: f32,
        error_count: usize,
        complexity: &str,
    ) -> StrategyMode {
        let efficacy = efficacy_score.clamp(0.0, 1.0);

        if complexity.eq_ignore_ascii_case("high") {
            return StrategyMode::DeepReflection;
        }
        if error_count >= HIGH_ERROR_COUNT {
            return StrategyMode::Cautious;
        }
        if efficacy >= HIGH_EFFICACY {
            return if error_count <= 1 {
                StrategyMode::Accelerated
            } else {
                StrategyMode::Normal
            };
        }
        if efficacy <= LOW_EFFICACY {
            return StrategyMode::Cautious;
        }
        StrategyMode::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_complexity_always_reflects() {
        let adapter = StrategyAdapter;
        assert_eq!(
            adapter.evaluate_mode(0.95, 0, "high"),
            StrategyMode::DeepReflection
        );
        assert_eq!(
            adapter.evaluate_mode(0.1, 9, "HIGH"),
            StrategyMode::DeepReflection
        );
    }

    #[test]
    fn error_storms_force_caution() {
        assert_eq!(
            StrategyAdapter.evaluate_mode(0.9, 3, "medium"),
            StrategyMode::Cautious
        );
    }

    #[test]
    fn confident_and_clean_accelerates() {
        assert_eq!(
            StrategyAdapter.evaluate_mode(0.8, 1, "medium"),
            StrategyMode::Accelerated
        );
        // Two errors keep it at normal despite high efficacy.
        assert_eq!(
            StrategyAdapter.evaluate_mode(0.8, 2, "medium"),
            StrategyMode::Normal
        );
    }

    #[test]
    fn low_efficacy_is_cautious() {
        assert_eq!(
            StrategyAdapter.evaluate_mode(0.3, 0, "low"),
            StrategyMode::Cautious
        );
    }

    #[test]
    fn middle_ground_is_normal() {
        assert_eq!(
            StrategyAdapter.evaluate_mode(0.55, 1, "medium"),
            StrategyMode::Normal
        );
    }
}
