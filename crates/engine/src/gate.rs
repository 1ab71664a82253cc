//! The decision gate: System 1 (reflex) versus System 2 (full evolution
//! pipeline).  Pure arbitration — execution stays with the engine.

use serde::Serialize;

use crate::intuition::{IntuitionResult, IntuitionStrength, PatternBucket};
use crate::reflex::ReflexRegistry;
use crate::resources::ResourceStatus;
use crate::uncertainty::UncertaintyProfile;

/// Confidence floor for the fast path under normal resources.
const CONFIDENCE_THRESHOLD: f32 = 0.85;
/// Relaxed floor when resources are scarce and the cheap path is preferred.
const SCARCE_CONFIDENCE_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionPath {
    /// Fast, intuitive, cheap.
    System1Reflex,
    /// Slow, deliberate, expensive.
    System2Evolution,
}

#[derive(Debug, Clone)]
pub struct GateDecision {
    pub path: ExecutionPath,
    /// Registered reflex to fire when the fast path was chosen.
    pub reflex_name: Option<String>,
    pub confidence: f32,
    pub reason: String,
}

/// Which registered reflex answers a recognised pattern.  Failure and
/// caution patterns map to escalating reflexes that have no handler, so
/// they deliberately fall through to System 2.
pub fn reflex_name_for(bucket: PatternBucket) -> Option<&'static str> {
    match bucket {
        PatternBucket::Success => Some("success_notify"),
        PatternBucket::Failure => Some("failed_evolution_rollback"),
        PatternBucket::Caution => Some("critical_error_escalate"),
        PatternBucket::Neutral => None,
    }
}

/// Arbitrate one tick.
///
/// Order of authority: the uncertainty quantifier can force deliberation
/// outright; otherwise a strong, confident intuition with an executable
/// registered reflex takes the fast path.  Scarce resources lower the bar
/// to moderate-strength intuitions.
pub fn decide(
    intuition: &IntuitionResult,
    uncertainty: &UncertaintyProfile,
    resources: ResourceStatus,
    registry: &ReflexRegistry,
) -> GateDecision {
    if uncertainty.forces_deliberation() {
        return GateDecision {
            path: ExecutionPath::System2Evolution,
            reflex_name: None,
            confidence: intuition.confidence,
            reason: format!(
                "uncertainty override (score {:.2}, {})",
                uncertainty.score, uncertainty.primary_factor
            ),
        };
    }

    let scarce = resources.biases_fast_path();
    let (min_strength, threshold) = if scarce {
        (IntuitionStrength::Moderate, SCARCE_CONFIDENCE_THRESHOLD)
    } else {
        (IntuitionStrength::Strong, CONFIDENCE_THRESHOLD)
    };

    let strong_enough = intuition.strength >= min_strength;
    let confident_enough = intuition.confidence >= threshold;

    if strong_enough && confident_enough {
        if let Some(name) = reflex_name_for(intuition.bucket) {
            if registry.executable_for(name, intuition.confidence).is_some() {
                return GateDecision {
                    path: ExecutionPath::System1Reflex,
                    reflex_name: Some(name.to_string()),
                    confidence: intuition.confidence,
                    reason: format!(
                        "{} intuition ({:.2}){}",
                        intuition.pattern_match,
                        intuition.confidence,
                        if scarce { ", resource-biased" } else { "" }
                    ),
                };
            }
        }
    }

    GateDecision {
        path: ExecutionPath::System2Evolution,
        reflex_name: None,
        confidence: intuition.confidence,
        reason: format!(
            "intuition {:?} at {:.2}; deliberate path",
            intuition.strength, intuition.confidence
        ),
    }
}
