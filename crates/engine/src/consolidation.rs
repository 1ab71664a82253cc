//! Memory consolidation: distil the recent short-term record into one
//! long-term semantic insight.  The hippocampus step of the sleep cycle.

use serde::{Deserialize, Serialize};

pub const CONSOLIDATION_SYSTEM_PROMPT: &str =
    "You analyse system activity logs and extract one durable insight.";

/// Structured insight the dreamer is asked to return.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Insight {
    #[serde(default)]
    pub insight: String,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub fn consolidation_prompt(history_lines: &str, current_step: &str) -> String {
    format!(
        "Review the recent activity below and extract the single most useful \
insight for future work.\n\n\
[Current roadmap step]\n{current_step}\n\n\
[Recent activity]\n{history_lines}\n\n\
Reply with JSON only:\n\
{{\"insight\": \"one sentence\", \"strategy\": \"what to do about it\", \
\"tags\": [\"tag1\", \"tag2\"]}}"
    )
}

/// Parse the dreamer's reply; malformed output degrades to a raw-text
/// insight instead of being dropped.
pub fn parse_insight(content: &str) -> Insight {
    let trimmed = content.trim();

    // Direct JSON, or JSON inside a fence.
    if let Ok(insight) = serde_json::from_str::<Insight>(trimmed) {
        return insight;
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                if let Ok(insight) = serde_json::from_str::<Insight>(&trimmed[start..=end]) {
                    return insight;
                }
            }
        }
    }

    Insight {
        insight: trimmed.chars().take(200).collect(),
        strategy: Some("retry with a cleaner prompt".to_string()),
        tags: vec!["consolidation_fallback".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let reply = r#"{"insight": "small changes land more often", "strategy": "keep diffs minimal", "tags": ["process"]}"#;
        let insight = parse_insight(reply);
        assert_eq!(insight.insight, "small changes land more often");
        assert_eq!(insight.strategy.as_deref(), Some("keep diffs minimal"));
        assert_eq!(insight.tags, vec!["process"]);
    }

    #[test]
    fn parses_fenced_json() {
        let reply = "Here:\n```json\n{\"insight\": \"x\", \"tags\": []}\n```";
        assert_eq!(parse_insight(reply).insight, "x");
    }

    #[test]
    fn malformed_reply_degrades_to_raw_text() {
        let insight = parse_insight("The system keeps repeating itself.");
        assert!(insight.insight.contains("repeating"));
        assert_eq!(insight.tags, vec!["consolidation_fallback"]);
    }

    #[test]
    fn prompt_embeds_step_and_history() {
        let prompt = consolidation_prompt("- did a thing", "Step 5");
        assert!(prompt.contains("Step 5"));
        assert!(prompt.contains("- did a thing"));
        assert!(prompt.contains("\"insight\""));
    }
}
