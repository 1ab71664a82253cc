//! The Muse: orchestration of the dreamer (architect) and coder (codegen)
//! roles into one evolution proposal.

mod coder;
mod dreamer;
mod error_memory;
mod parser;

pub use coder::CODER_SYSTEM_PROMPT;
pub use dreamer::{DreamInput, compress_context, extract_intent};
pub use error_memory::{ERROR_MEMORY_FILE, ErrorMemory};
pub use parser::{FileUpdate, ParseOutcome, parse_coder_output};

use std::path::PathBuf;

use ouro_guard::ProtectList;
use ouro_llm::{ChatClient, TokenUsage};
use tracing::info;

/// Outcome of one imagination cycle.  Exactly one of these holds:
/// a non-empty `updates` list with an intent, `no_evolution`, or `error`.
#[derive(Debug, Default)]
pub struct EvolutionPlan {
    pub intent: String,
    pub updates: Vec<FileUpdate>,
    pub no_evolution: bool,
    pub error: Option<String>,
    pub size_warnings: Vec<String>,
    /// Token spend across every dreamer/coder call, including failed ones.
    pub usage: TokenUsage,
}

pub struct Muse {
    dreamer: ChatClient,
    coder: ChatClient,
    prime_directive: String,
    workspace: PathBuf,
    error_memory: ErrorMemory,
}

impl Muse {
    pub fn new(
        dreamer: ChatClient,
        coder: ChatClient,
        prime_directive: impl Into<String>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        let workspace = workspace.into();
        let error_memory = ErrorMemory::open(&workspace);
        Self {
            dreamer,
            coder,
            prime_directive: prime_directive.into(),
            workspace,
            error_memory,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.dreamer.is_configured() && self.coder.is_configured()
    }

    /// A short one-shot question to the dreamer, used by the inner monologue
    /// and consolidation.  Returns the reply text with its usage, or None.
    pub async fn ask_dreamer(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Option<(String, TokenUsage)> {
        use ouro_llm::ChatMessage;
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        match self
            .dreamer
            .chat(&messages, 1024, temperature, std::time::Duration::from_secs(120))
            .await
        {
            Ok(reply) => Some((reply.content, reply.usage)),
            Err(err) => {
                tracing::warn!(error = %err, "dreamer side-question failed");
                None
            }
        }
    }

    /// Full dreamer → coder → parse cycle.
    pub async fn imagine(&mut self, input: &DreamInput, temperature: f32) -> EvolutionPlan {
        let mut plan = EvolutionPlan::default();

        // 1. The dreamer designs the change.
        let dream = match dreamer::run_dreamer(
            &self.dreamer,
            &self.prime_directive,
            input,
            temperature,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err((error, usage)) => {
                plan.intent = "Dreaming failed".to_string();
                plan.error = Some(error);
                plan.usage = usage;
                return plan;
            }
        };
        plan.usage.prompt_tokens += dream.usage.prompt_tokens;
        plan.usage.completion_tokens += dream.usage.completion_tokens;
        info!(intent = %truncate(&dream.intent, 100), "dreamer intent extracted");

        // 2. The coder writes the replacement files.
        let coded = match coder::run_coder(
            &self.coder,
            &dream.intent_design,
            &dream.compressed_code,
            &self.workspace,
            &mut self.error_memory,
            temperature,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err((error, usage)) => {
                plan.intent = "Coding failed after retries".to_string();
                plan.error = Some(error);
                plan.usage.prompt_tokens += usage.prompt_tokens;
                plan.usage.completion_tokens += usage.completion_tokens;
                return plan;
            }
        };
        plan.usage.prompt_tokens += coded.usage.prompt_tokens;
        plan.usage.completion_tokens += coded.usage.completion_tokens;

        // 3. Parse the coder output into file updates.
        let protect = ProtectList::load(&self.workspace);
        let parsed = parse_coder_output(&coded.code_output, &dream.intent, &protect);

        if parsed.no_evolution {
            plan.intent = format!(
                "evolution skipped: {}",
                parsed.reason.unwrap_or_default()
            );
            plan.no_evolution = true;
            return plan;
        }
        if let Some(error) = parsed.error {
            plan.intent = dream.intent;
            plan.error = Some(error);
            return plan;
        }

        plan.intent = dream.intent;
        plan.updates = parsed.updates;
        plan.size_warnings = parsed.size_warnings;
        plan
    }

    /// Record an externally-detected failure (apply/test stage) so future
    /// prompts carry the hint.
    pub fn remember_failure(&mut self, file: &str, error_type: &str, detail: &str) {
        self.error_memory.record_error(file, error_type, detail);
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
