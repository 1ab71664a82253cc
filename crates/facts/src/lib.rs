//! The Fact Core: the engine's symbolic self-knowledge.  A flat fact map
//! with a parallel knowledge graph, the evolution roadmap, and the
//! working-tree snapshot used to build LLM context.

mod node;
mod roadmap;
mod snapshot;
mod storage;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

pub use node::KnowledgeNode;
pub use roadmap::{StepRecord, StepStatus};

pub const FACT_FILE: &str = "fact_core.json";

pub struct FactCore {
    /// Whole-file JSON persistence target (`fact_core.json`).
    fact_path: PathBuf,
    /// Root of the working tree this core describes.
    base_path: PathBuf,
    facts: serde_json::Map<String, Value>,
    /// Graph nodes keyed by label; only object-valued facts become nodes.
    nodes: BTreeMap<String, KnowledgeNode>,
}

impl FactCore {
    /// Open (or initialise) the fact store for a working tree.
    pub fn open(base_path: impl AsRef<Path>) -> Self {
        let base_path = base_path.as_ref().to_path_buf();
        let fact_path = base_path.join(FACT_FILE);
        let mut core = Self {
            fact_path,
            base_path,
            facts: default_facts(),
            nodes: BTreeMap::new(),
        };
        core.load_or_init();
        core.build_graph();
        core
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    // ── fact access ───────────────────────────────────────────────────────

    /// Walk nested objects safely: `get_fact(&["roadmap", "current_focus"])`.
    pub fn get_fact(&self, keys: &[&str]) -> Option<&Value> {
        let mut current: Option<&Value> = None;
        for (i, key) in keys.iter().enumerate() {
            current = if i == 0 {
                self.facts.get(*key)
            } else {
                current?.get(*key)
            };
        }
        current
    }

    pub fn get_fact_str(&self, keys: &[&str]) -> Option<&str> {
        self.get_fact(keys).and_then(Value::as_str)
    }

    /// Replace a top-level fact.  Object values rebuild the label's graph
    /// node (with empty edges) and the whole store is persisted.
    pub fn add_fact(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_object() {
            self.nodes
                .insert(key.clone(), KnowledgeNode::new(key.clone(), value.clone()));
        }
        self.facts.insert(key, value);
        self.save_facts();
    }

    /// Alias kept for call sites that read better as an update.
    pub fn update_fact(&mut self, key: impl Into<String>, value: Value) {
        self.add_fact(key, value);
    }

    /// Mutate a nested object in place, then persist.  The closure receives
    /// the object for `key`, created empty when absent.
    pub fn with_object<F>(&mut self, key: &str, mutate: F)
    where
        F: FnOnce(&mut serde_json::Map<String, Value>),
    {
        let entry = self
            .facts
            .entry(key.to_string())
            .or_insert_with(|| json!({}));
        if !entry.is_object() {
            *entry = json!({});
        }
        if let Some(map) = entry.as_object_mut() {
            mutate(map);
        }
        let value = entry.clone();
        self.nodes
            .insert(key.to_string(), KnowledgeNode::new(key, value));
        self.save_facts();
    }

    // ── graph ─────────────────────────────────────────────────────────────

    pub fn node(&self, label: &str) -> Option<&KnowledgeNode> {
        self.nodes.get(label)
    }

    pub fn add_edge(&mut self, label: &str, relation: &str, target: &str) -> bool {
        match self.nodes.get_mut(label) {
            Some(node) => {
                if !node.has_edge(relation, target) {
                    node.add_edge(relation, target);
                }
                true
            }
            None => false,
        }
    }

    /// Rebuild nodes from object-valued facts, preserving no edges except
    /// the identity seeds.  Called after load and after whole-map changes.
    pub(crate) fn build_graph(&mut self) {
        self.nodes.clear();
        for (key, value) in &self.facts {
            if value.is_object() {
                self.nodes
                    .insert(key.clone(), KnowledgeNode::new(key.clone(), value.clone()));
            }
        }
        if let Some(identity) = self.nodes.get_mut("identity") {
            identity.add_edge("has_goal", "Self-Evolution");
        }
    }

    /// Text view of the active graph, used in prompt context.
    pub fn knowledge_graph_view(&self) -> String {
        let mut view = String::from("### 🕸️ Active Knowledge Graph Nodes\n");
        for (label, node) in &self.nodes {
            view.push_str(&format!("- **[{label}]**\n"));
            for (relation, target) in &node.edges {
                view.push_str(&format!("    └─ {relation} --> [{target}]\n"));
            }
        }
        view
    }

    pub fn prime_directive(&self) -> &str {
        self.get_fact_str(&["prime_directive"]).unwrap_or_default()
    }

    /// Prompt-sized identity block: who am I, where on the roadmap, graph.
    pub fn core_context(&self) -> String {
        let name = self.get_fact_str(&["identity", "name"]).unwrap_or("Ouro");
        let version = self
            .get_fact_str(&["identity", "version"])
            .unwrap_or("unknown");
        let focus = self
            .get_fact_str(&["roadmap", "current_focus"])
            .unwrap_or("unset");
        format!(
            "I am {name} v{version}. Current roadmap focus: {focus}\n{}\nPrime directive: {}\n",
            self.knowledge_graph_view(),
            self.prime_directive()
        )
    }

    pub(crate) fn facts(&self) -> &serde_json::Map<String, Value> {
        &self.facts
    }

    pub(crate) fn facts_mut(&mut self) -> &mut serde_json::Map<String, Value> {
        &mut self.facts
    }

    pub(crate) fn fact_path(&self) -> &Path {
        &self.fact_path
    }
}

fn default_facts() -> serde_json::Map<String, Value> {
    let value = json!({
        "identity": {
            "name": "Ouro",
            "version": "0.3.0",
            "creator": "operator",
            "description": "Autonomous self-evolving agent runtime"
        },
        "prime_directive": "You are Ouro, a self-evolving system. You improve the working tree you \
inhabit through the smallest safe increments.\n\
Core rules:\n\
1. Never modify the supervisor entry point (main.py) or credential modules.\n\
2. Every filename uses snake_case; imports must name real modules.\n\
3. New behaviour goes into small new modules; large files get imports, not rewrites.\n\
4. Every feature ships with a matching test_*.py unit test.",
        "roadmap": roadmap::default_roadmap(),
        "system_state": {
            "burst_mode": false,
            "burst_end_time": null,
            "current_interval": 3600,
            "current_objective": "Deepen semantic vector memory"
        },
        "system_status": "evolving",
        "architecture_guide": {
            "supervisor": "main.py (never modified)",
            "critical_config": "api/keys.py (never modified)",
            "engine_core": "engine/ package",
            "knowledge_base": "fact_core.json",
            "memory_layer": "nexus/ package",
            "naming_convention": "snake_case for every file and symbol"
        },
        "lessons_learned": [
            "Dropping the underscore from a module name breaks its import; file names must match imports exactly.",
            "main.py is rejected by the applier; never target it."
        ],
        "growth_score": 0
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!("default facts are an object"),
    }
}
