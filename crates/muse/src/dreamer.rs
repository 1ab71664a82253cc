//! Dreamer pipeline: compress the system snapshot, assemble the design
//! prompt, call the architect model with bounded retries, and extract a
//! usable intent from whatever it replies.

use std::sync::OnceLock;
use std::time::Duration;

use ouro_llm::{ChatClient, ChatMessage, TokenUsage};
use regex::Regex;
use tracing::{info, warn};

const DREAMER_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_DREAMER_RETRIES: usize = 3;
const BACKOFF_SECS: [u64; 3] = [0, 2, 4];
/// Replies shorter than this are treated as failures.
const MIN_REPLY_CHARS: usize = 50;

/// Escalating-brevity system prompts; later attempts get simpler asks.
const DREAMER_SYSTEM_PROMPTS: [&str; 3] = [
    "You are the Dreamer (architect) of a self-evolving system. Design the next \
     evolution step. Focus on logic and architecture. ALWAYS start with \
     'SYSTEM_INTENT:' followed by a specific, actionable intent.",
    "You are the system's Dreamer. Output format: SYSTEM_INTENT: [one sentence \
     describing the change]. Then explain briefly.",
    "Dreamer. Start reply with: SYSTEM_INTENT: [action]. Be concise.",
];

/// Prepared context the engine hands to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct DreamInput {
    pub system_context: String,
    pub current_step: String,
    pub step_status: String,
    pub recent_evolutions: String,
    pub file_sizes: String,
    pub attention_context: String,
    pub error_context: Option<String>,
    pub user_query: Option<String>,
}

#[derive(Debug)]
pub struct DreamOutcome {
    pub intent_design: String,
    pub intent: String,
    pub compressed_code: String,
    pub usage: TokenUsage,
}

/// Shrink a `--- FILE: … ---` snapshot to per-file byte budgets: core files
/// keep 10 000 bytes, engine files 4 000, everything else 1 000.
pub fn compress_context(system_context: &str) -> String {
    let mut compressed = String::new();

    for section in system_context.split("--- FILE: ") {
        let Some((header, content)) = section.split_once(" ---") else {
            continue;
        };
        let filename = header.trim();
        let content = content.trim();

        let limit = if filename.contains("fact_core")
            || filename.contains("nexus/")
            || filename.contains("database/")
        {
            10_000
        } else if filename.contains("engine/") || filename.contains("muse/") {
            4_000
        } else {
            1_000
        };

        let body = truncate_chars(content, limit);
        compressed.push_str(&format!("\n--- FILE: {filename} ---\n{body}\n"));
    }

    compressed
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_dream_prompt(prime_directive: &str, input: &DreamInput, compressed_code: &str) -> String {
    let mut prompt = format!(
        "{prime_directive}\n\n\
[Current system state and code summary]\n{compressed_code}\n\n\
[Current roadmap step]\n{step}\n\n\
[Mission]\n\
1. Judge the maturity of the current roadmap step against the code above and pick the \
smallest next evolution task that does not duplicate what already exists.\n\
2. Design a concrete, technical intent: name the file and function that exists but is \
never called, or the field that is defined but unused, and say exactly what to wire up.\n\
3. Do not write code. Provide the design, implementation guidance and the list of files \
to change.\n\n\
[Anti-duplication rules — critical]\n\
- Before proposing, verify in the code above whether the class/function/import already exists.\n\
- If the current step is already implemented, propose the next step instead.\n\
- If the same intent keeps repeating, switch to a different file or feature.\n\n\
[Step completion status — automated check]\n{status}\n\
Only implement items marked ❌; items marked ✅ are done, leave them alone.\n\n\
[Anti-hallucination]\n\
- If something is not in the snapshot above, it does not exist. Quote the snapshot when \
claiming something is implemented.\n\n\
[Module design rules]\n\
- Prefer new small modules over editing large files; files over 150 lines must not be \
rewritten — create a helper module and add an import instead.\n\n\
{sizes}\n\n\
[Attention]\n{attention}\n\n\
[Recent evolutions]\n{recent}\n\n\
[Output rules]\n\
- The first line MUST be `SYSTEM_INTENT: (intent)`.",
        step = input.current_step,
        status = input.step_status,
        sizes = input.file_sizes,
        attention = input.attention_context,
        recent = input.recent_evolutions,
    );

    if let Some(error_context) = &input.error_context {
        prompt.push_str(&format!("\n\n🚨 [Error recovery mode]\n{error_context}"));
    }
    if let Some(user_query) = &input.user_query {
        prompt.push_str(&format!("\n\n💡 [Operator command]\n{user_query}"));
    }

    prompt
}

/// Run the dreamer with retries.  Returns the design text and the extracted
/// intent, or the last error.
pub async fn run_dreamer(
    client: &ChatClient,
    prime_directive: &str,
    input: &DreamInput,
    temperature: f32,
) -> Result<DreamOutcome, (String, TokenUsage)> {
    let compressed_code = compress_context(&input.system_context);
    let prompt = build_dream_prompt(prime_directive, input, &compressed_code);

    let mut usage = TokenUsage::default();
    let mut last_error = String::new();

    for attempt in 1..=MAX_DREAMER_RETRIES {
        let delay = BACKOFF_SECS[attempt - 1];
        if delay > 0 {
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        let system = DREAMER_SYSTEM_PROMPTS[(attempt - 1).min(DREAMER_SYSTEM_PROMPTS.len() - 1)];
        let messages = [ChatMessage::system(system), ChatMessage::user(&prompt)];

        let reply = match client.chat(&messages, 8192, temperature, DREAMER_TIMEOUT).await {
            Ok(reply) => reply,
            Err(err) => {
                usage.prompt_tokens += err.usage().prompt_tokens;
                usage.completion_tokens += err.usage().completion_tokens;
                last_error = err.to_string();
                warn!(attempt, error = %last_error, "dreamer call failed");
                continue;
            }
        };
        usage.prompt_tokens += reply.usage.prompt_tokens;
        usage.completion_tokens += reply.usage.completion_tokens;

        if reply.content.trim().len() < MIN_REPLY_CHARS {
            last_error = format!("reply too short ({} chars)", reply.content.trim().len());
            warn!(attempt, "dreamer reply too short");
            continue;
        }

        let intent = extract_intent(&reply.content);
        if intent.contains("empty response") || intent.contains("parse failed") {
            last_error = format!("intent extraction failed: {}", truncate_chars(&intent, 100));
            warn!(attempt, "dreamer intent unusable");
            continue;
        }

        info!(
            attempt,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "dreamer succeeded"
        );
        return Ok(DreamOutcome {
            intent_design: reply.content,
            intent,
            compressed_code,
            usage,
        });
    }

    Err((
        format!("dreamer failed after {MAX_DREAMER_RETRIES} attempts: {last_error}"),
        usage,
    ))
}

fn intent_tag_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?is)SYSTEM_INTENT:\s*(.+?)(?:\n\n|\n\[|\n##|\n\*\*|$)",
            r"(?is)SYSTEM_INTENT[:\s]+(.+?)(?:\n[A-Z\[]|$)",
            r"(?i)\*\*SYSTEM_INTENT\*\*[:\s]*(.+?)(?:\n|$)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Robust intent extraction: tag variants first, then the first meaningful
/// line, then a cleaned whole-text digest.
pub fn extract_intent(dreamer_response: &str) -> String {
    if dreamer_response.trim().is_empty() {
        return "System Evolution (empty response)".to_string();
    }

    for re in intent_tag_res() {
        if let Some(captures) = re.captures(dreamer_response) {
            let intent = captures[1].trim().replace('\n', " ");
            if intent.len() > 20 {
                return clamp(&intent, 500);
            }
        }
    }

    // First meaningful line: long enough and not markup.
    for line in dreamer_response.lines() {
        let line = line.trim();
        if line.len() > 30
            && !line.starts_with(['#', '*', '-', '`', '['])
            && !line.starts_with("```")
        {
            return clamp(line, 500);
        }
    }

    // Cleaned whole text as a digest.
    let cleaned: String = dreamer_response
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '`' | '[' | ']'))
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.len() > 20 {
        clamp(&cleaned, 500)
    } else {
        "System Evolution (parse failed)".to_string()
    }
}

fn clamp(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tagged_intent() {
        let reply = "SYSTEM_INTENT: wire retrieve_relevant_memories into the intuition module\n\nDetails follow.";
        let intent = extract_intent(reply);
        assert!(intent.starts_with("wire retrieve_relevant_memories"));
    }

    #[test]
    fn extracts_bold_tag_variant() {
        let reply = "**SYSTEM_INTENT**: add a ping helper to nexus/ping.py and call it from core\nmore text";
        assert!(extract_intent(reply).contains("ping helper"));
    }

    #[test]
    fn falls_back_to_first_meaningful_line() {
        let reply = "## Analysis\nThe evolution should connect the vector store to the attention loop.\n- detail";
        let intent = extract_intent(reply);
        assert!(intent.contains("connect the vector store"));
    }

    #[test]
    fn empty_reply_is_marked() {
        assert!(extract_intent("  ").contains("empty response"));
    }

    #[test]
    fn intent_is_clamped() {
        let reply = format!("SYSTEM_INTENT: {}", "do a thing ".repeat(100));
        assert!(extract_intent(&reply).chars().count() <= 500);
    }

    #[test]
    fn compression_applies_per_file_budgets() {
        let small = "s".repeat(2_000);
        let engine = "e".repeat(8_000);
        let core = "c".repeat(20_000);
        let snapshot = format!(
            "--- FILE: readme.md ---\n{small}\n--- FILE: engine/loop.py ---\n{engine}\n--- FILE: nexus/core.py ---\n{core}\n"
        );
        let compressed = compress_context(&snapshot);

        let count = |ch: char| compressed.chars().filter(|c| *c == ch).count();
        assert_eq!(count('s'), 1_000);
        assert_eq!(count('e'), 4_000);
        assert_eq!(count('c'), 10_000);
    }

    #[test]
    fn prompt_carries_all_context_blocks() {
        let input = DreamInput {
            system_context: String::new(),
            current_step: "Step 4: Vector Memory".to_string(),
            step_status: "❌ retrieval not wired".to_string(),
            recent_evolutions: "- a.py: change".to_string(),
            file_sizes: "a.py: 10 lines".to_string(),
            attention_context: "Attention Status: Idle".to_string(),
            error_context: Some("Traceback ...".to_string()),
            user_query: Some("/evolve focus retrieval".to_string()),
        };
        let prompt = build_dream_prompt("directive text", &input, "code blocks");
        for expected in [
            "directive text",
            "Step 4: Vector Memory",
            "❌ retrieval not wired",
            "Attention Status: Idle",
            "Error recovery mode",
            "Operator command",
            "SYSTEM_INTENT:",
        ] {
            assert!(prompt.contains(expected), "missing {expected}");
        }
    }
}
