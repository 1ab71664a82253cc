//! Intuition: fast pattern matching over remembered experience.  No
//! reasoning — a vector lookup plus keyword bucketing, cheap enough to run
//! before every gate decision.

use ouro_memory::MemoryHit;
use serde::Serialize;

/// Memories consulted per judgement.
const MEMORY_LIMIT: usize = 5;
/// Below this confidence the intuition carries no signal at all.
const CONFIDENCE_FLOOR: f32 = 0.3;

const SUCCESS_KEYWORDS: &[&str] = &["success", "completed", "resolved", "implemented", "improved"];
const FAILURE_KEYWORDS: &[&str] = &["failed", "failure", "error", "bug", "broken", "rejected"];
const CAUTION_KEYWORDS: &[&str] = &["caution", "warning", "risk", "careful", "verify"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntuitionStrength {
    None,
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternBucket {
    Success,
    Failure,
    Caution,
    Neutral,
}

impl PatternBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternBucket::Success => "success",
            PatternBucket::Failure => "failure",
            PatternBucket::Caution => "caution",
            PatternBucket::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntuitionResult {
    pub pattern_match: String,
    pub bucket: PatternBucket,
    pub confidence: f32,
    pub strength: IntuitionStrength,
    pub memory_count: usize,
    pub suggested_action: Option<String>,
    pub reasoning: String,
}

impl IntuitionResult {
    fn blank(reasoning: &str) -> Self {
        Self {
            pattern_match: "new situation".to_string(),
            bucket: PatternBucket::Neutral,
            confidence: 0.1,
            strength: IntuitionStrength::None,
            memory_count: 0,
            suggested_action: None,
            reasoning: reasoning.to_string(),
        }
    }
}

/// Derive an intuition from retrieved memories.  The caller does the vector
/// search; this stays a pure judgement over the hits.
pub fn judge(situation: &str, memories: &[MemoryHit]) -> IntuitionResult {
    if situation.trim().is_empty() {
        return IntuitionResult::blank("no situation described");
    }
    if memories.is_empty() {
        return IntuitionResult::blank("no similar past experience; deliberate analysis needed");
    }

    let mut counts = [0usize; 4]; // success, failure, caution, neutral
    for memory in memories.iter().take(MEMORY_LIMIT) {
        let text = memory.text.to_lowercase();
        let bucket = if FAILURE_KEYWORDS.iter().any(|k| text.contains(k)) {
            1
        } else if SUCCESS_KEYWORDS.iter().any(|k| text.contains(k)) {
            0
        } else if CAUTION_KEYWORDS.iter().any(|k| text.contains(k)) {
            2
        } else {
            3
        };
        counts[bucket] += 1;
    }

    let (dominant_idx, dominant_count) = counts
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| **c)
        .map(|(i, c)| (i, *c))
        .unwrap_or((3, 0));
    let bucket = match dominant_idx {
        0 => PatternBucket::Success,
        1 => PatternBucket::Failure,
        2 => PatternBucket::Caution,
        _ => PatternBucket::Neutral,
    };
    let total: usize = counts.iter().sum();
    let dominance = dominant_count as f32 / total.max(1) as f32;

    // Confidence: how many memories surfaced, and how close they are.
    let count_factor = (memories.len().min(MEMORY_LIMIT) as f32 / MEMORY_LIMIT as f32) * 0.5;
    let similarity: f32 = memories
        .iter()
        .take(MEMORY_LIMIT)
        .map(|m| (1.0 - m.distance).max(0.0))
        .sum::<f32>()
        / memories.len().min(MEMORY_LIMIT) as f32;
    let confidence = (count_factor + similarity * 0.5).min(1.0);

    let strength = if confidence >= 0.7 {
        IntuitionStrength::Strong
    } else if confidence >= 0.4 {
        IntuitionStrength::Moderate
    } else if confidence >= CONFIDENCE_FLOOR {
        IntuitionStrength::Weak
    } else {
        IntuitionStrength::None
    };

    let suggested_action = if dominance < 0.4 {
        Some("pattern unclear; gather more context".to_string())
    } else {
        Some(
            match bucket {
                PatternBucket::Success => "a similar attempt succeeded before; the same approach should work",
                PatternBucket::Failure => "a similar attempt failed before; choose a different approach",
                PatternBucket::Caution => "this situation has burned us before; proceed carefully",
                PatternBucket::Neutral => "no strong pattern; follow the normal procedure",
            }
            .to_string(),
        )
    };

    IntuitionResult {
        pattern_match: bucket.as_str().to_string(),
        bucket,
        confidence,
        strength,
        memory_count: memories.len(),
        suggested_action,
        reasoning: format!(
            "{} similar memories | dominant pattern: {} ({:.0}%) | confidence {:.0}%",
            memories.len(),
            bucket.as_str(),
            dominance * 100.0,
            confidence * 100.0
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, distance: f32) -> MemoryHit {
        MemoryHit {
            id: String::new(),
            text: text.to_string(),
            memory_type: "evolution".to_string(),
            source: "test".to_string(),
            timestamp: String::new(),
            metadata: "{}".to_string(),
            distance,
        }
    }

    #[test]
    fn empty_memories_give_no_signal() {
        let result = judge("a novel situation", &[]);
        assert_eq!(result.strength, IntuitionStrength::None);
        assert_eq!(result.memory_count, 0);
    }

    #[test]
    fn close_consistent_memories_give_strong_intuition() {
        let memories = vec![
            hit("evolution success on ping module", 0.05),
            hit("successfully implemented retrieval", 0.1),
            hit("change completed and resolved", 0.08),
            hit("improved attention loop success", 0.12),
            hit("success again on memory wiring", 0.07),
        ];
        let result = judge("wire the next module", &memories);
        assert_eq!(result.bucket, PatternBucket::Success);
        assert_eq!(result.strength, IntuitionStrength::Strong);
        assert!(result.confidence >= 0.85);
    }

    #[test]
    fn failure_keywords_beat_success_on_mixed_lines() {
        let memories = vec![hit("evolution failed with an error in module", 0.2)];
        let result = judge("try that module again", &memories);
        assert_eq!(result.bucket, PatternBucket::Failure);
        assert!(result.suggested_action.unwrap().contains("different approach"));
    }

    #[test]
    fn few_distant_memories_stay_weak() {
        let memories = vec![hit("some unrelated note", 0.95)];
        let result = judge("anything", &memories);
        assert!(result.strength <= IntuitionStrength::Weak);
        assert!(result.confidence < 0.4);
    }

    #[test]
    fn blank_situation_short_circuits() {
        let result = judge("  ", &[hit("x", 0.0)]);
        assert_eq!(result.strength, IntuitionStrength::None);
    }
}
