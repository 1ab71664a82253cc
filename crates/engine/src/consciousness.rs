//! The consciousness stream: unprompted self-reflection on a cadence, fed
//! by internal context and written into layered memory.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Bounded stream of recorded thoughts.
const STREAM_CAP: usize = 50;
/// Previous monologues carried into the next prompt.
const CONTEXT_THOUGHTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct Thought {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ConsciousnessState {
    stream: Vec<Thought>,
    pub current_thought: Option<String>,
    pub awareness_level: f32,
}

impl ConsciousnessState {
    pub fn new() -> Self {
        Self {
            stream: Vec::new(),
            current_thought: None,
            awareness_level: 1.0,
        }
    }

    pub fn record_thought(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.current_thought = Some(text.clone());
        self.stream.push(Thought {
            timestamp: Utc::now(),
            text,
        });
        if self.stream.len() > STREAM_CAP {
            self.stream.remove(0);
        }
    }

    pub fn recent_thoughts(&self, limit: usize) -> Vec<&Thought> {
        self.stream.iter().rev().take(limit).collect()
    }

    pub fn stream_len(&self) -> usize {
        self.stream.len()
    }

    /// Prompt for the next inner monologue, given gathered internals.
    pub fn monologue_prompt(
        &self,
        roadmap_step: &str,
        recent_memories: &str,
        recent_evolutions: &str,
        recent_errors: &str,
        temporal_narrative: &str,
        somatic_description: &str,
    ) -> String {
        let previous: Vec<String> = self
            .recent_thoughts(CONTEXT_THOUGHTS)
            .iter()
            .map(|t| format!("- {}", t.text))
            .collect();
        let previous = if previous.is_empty() {
            "(none yet)".to_string()
        } else {
            previous.join("\n")
        };

        format!(
            "Reflect on your current state in one or two sentences, first person, \
no preamble.\n\n\
[Where I am]\n{roadmap_step}\n\n\
[How time feels]\n{temporal_narrative}\n\n\
[How I feel]\n{somatic_description}\n\n\
[Recent memories]\n{recent_memories}\n\n\
[Recent evolutions]\n{recent_evolutions}\n\n\
[Recent errors]\n{recent_errors}\n\n\
[Previous thoughts]\n{previous}\n\n\
Do not repeat a previous thought verbatim. Notice something new."
        )
    }
}

pub const MONOLOGUE_SYSTEM_PROMPT: &str =
    "You are the inner voice of a self-evolving system. Reply with one or two \
     reflective sentences. No lists, no headers, no quotation marks.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thoughts_accumulate_with_cap() {
        let mut state = ConsciousnessState::new();
        for i in 0..(STREAM_CAP + 10) {
            state.record_thought(format!("thought {i}"));
        }
        assert_eq!(state.stream_len(), STREAM_CAP);
        assert_eq!(
            state.current_thought.as_deref(),
            Some(format!("thought {}", STREAM_CAP + 9).as_str())
        );
        // Newest first.
        assert!(state.recent_thoughts(1)[0].text.ends_with("59"));
    }

    #[test]
    fn prompt_carries_previous_thoughts_and_context() {
        let mut state = ConsciousnessState::new();
        state.record_thought("I noticed the vector store growing.");
        let prompt = state.monologue_prompt(
            "Step 4: Vector Memory",
            "- memory a",
            "- evolution b",
            "- error c",
            "time flows normally",
            "steady",
            );
        for expected in [
            "Step 4: Vector Memory",
            "vector store growing",
            "time flows normally",
            "steady",
            "- error c",
        ] {
            assert!(prompt.contains(expected), "missing {expected}");
        }
    }

    #[test]
    fn empty_stream_prompt_says_none() {
        let state = ConsciousnessState::new();
        let prompt = state.monologue_prompt("s", "m", "e", "err", "t", "f");
        assert!(prompt.contains("(none yet)"));
    }
}
