use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    /// Root of the working tree the engine evolves.  The runtime itself is
    /// never a mutation target.
    pub workspace_path: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Ouro".to_string(),
            workspace_path: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Architect model: designs the next change, never emits code.
    pub dreamer_model: String,
    /// Codegen model: emits full replacement files from an intent.
    pub coder_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// API key, taken from `OPENROUTER_API_KEY` at boot.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            dreamer_model: "google/gemini-3.0-flash".to_string(),
            coder_model: "anthropic/claude-sonnet-4.5".to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GitConfig {
    /// `owner/name` of the remote repository.
    pub repo: String,
    pub branch: String,
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelegramConfig {
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(skip)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// On-disk path of the vector table.
    pub vector_path: String,
    /// Embedding dimension, fixed at deployment.  The open store is forced
    /// to this value; a mismatched table is dropped and rebuilt on boot.
    pub vector_dim: usize,
    pub evolution_cap: usize,
    pub dialogue_cap: usize,
    #[serde(skip)]
    pub embedding_api_key: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            vector_path: "data/lancedb".to_string(),
            vector_dim: 384,
            evolution_cap: 100,
            dialogue_cap: 50,
            embedding_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    #[serde(skip)]
    pub url: Option<String>,
    pub key_prefix: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: "ain:state".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between evolution attempts in normal mode.
    pub evolution_interval: u64,
    pub monologue_interval: u64,
    pub meta_interval: u64,
    /// Cognitive-state snapshot cadence.
    pub persist_interval: u64,
    /// Interval while burst mode is active.
    pub burst_interval: u64,
    /// How long a burst lasts once triggered.
    pub burst_duration: u64,
    /// Fallback interval used after rate-limit detection.
    pub rate_limit_interval: u64,
    pub daily_budget_usd: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evolution_interval: 3600,
            monologue_interval: 3600,
            meta_interval: 600,
            persist_interval: 300,
            burst_interval: 600,
            burst_duration: 3600,
            rate_limit_interval: 7200,
            daily_budget_usd: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub git: GitConfig,
    pub telegram: TelegramConfig,
    pub memory: MemoryConfig,
    pub kv: KvConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load configuration: TOML file if present, defaults otherwise, then
    /// environment overrides.  All environment variables are read exactly
    /// once here; nothing mutates configuration at runtime.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        config.apply_env();
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.llm.api_key = non_empty(env::var("OPENROUTER_API_KEY").ok());
        self.git.token = non_empty(env::var("GITHUB_TOKEN").ok());
        if let Some(repo) = non_empty(env::var("GITHUB_REPO").ok()) {
            self.git.repo = repo;
        }
        if let Some(branch) = non_empty(env::var("GITHUB_BRANCH").ok()) {
            self.git.branch = branch;
        }
        if self.git.branch.is_empty() {
            self.git.branch = "main".to_string();
        }
        self.telegram.token = non_empty(env::var("TELEGRAM_BOT_TOKEN").ok());
        self.telegram.chat_id = non_empty(env::var("TELEGRAM_CHAT_ID").ok());
        self.kv.url = non_empty(env::var("REDIS_URL").ok());
        self.memory.embedding_api_key = non_empty(env::var("EMBEDDING_API_KEY").ok());
        if let Some(path) = non_empty(env::var("LANCEDB_PATH").ok()) {
            self.memory.vector_path = path;
        }
        if let Some(ws) = non_empty(env::var("OURO_WORKSPACE").ok()) {
            self.agent.workspace_path = ws;
        }
    }

    /// Subsystems missing their credentials run in degraded, memory-only
    /// mode rather than failing boot.
    pub fn degraded_subsystems(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.llm.api_key.is_none() {
            missing.push("llm");
        }
        if self.git.token.is_none() || self.git.repo.is_empty() {
            missing.push("git");
        }
        if self.telegram.token.is_none() || self.telegram.chat_id.is_none() {
            missing.push("telegram");
        }
        if self.kv.url.is_none() {
            missing.push("kv");
        }
        missing
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.engine.evolution_interval, 3600);
        assert_eq!(config.engine.burst_interval, 600);
        assert_eq!(config.memory.vector_dim, 384);
        assert_eq!(config.kv.key_prefix, "ain:state");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ouro.toml");

        let mut config = AppConfig::default();
        config.agent.name = "test-agent".to_string();
        config.engine.evolution_interval = 120;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.agent.name, "test-agent");
        assert_eq!(loaded.engine.evolution_interval, 120);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let loaded = AppConfig::load_from("/nonexistent/ouro.toml").unwrap();
        assert_eq!(loaded.agent.name, "Ouro");
    }

    #[test]
    fn degraded_subsystems_reported() {
        let config = AppConfig::default();
        let missing = config.degraded_subsystems();
        // No env in tests: everything external is degraded unless the
        // ambient environment provides credentials.
        assert!(missing.contains(&"git"));
    }
}
