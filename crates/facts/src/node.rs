use serde::{Deserialize, Serialize};

/// One symbolic fact in the knowledge graph.  Edges hold target *labels*,
/// not node references — dangling targets are allowed and resolved lazily,
/// so the graph never forms pointer cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub label: String,
    pub data: serde_json::Value,
    /// `(relation, target_label)` pairs in insertion order.
    pub edges: Vec<(String, String)>,
}

impl KnowledgeNode {
    pub fn new(label: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            label: label.into(),
            data,
            edges: Vec::new(),
        }
    }

    pub fn add_edge(&mut self, relation: impl Into<String>, target_label: impl Into<String>) {
        self.edges.push((relation.into(), target_label.into()));
    }

    pub fn has_edge(&self, relation: &str, target_label: &str) -> bool {
        self.edges
            .iter()
            .any(|(r, t)| r == relation && t == target_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn edges_keep_insertion_order() {
        let mut node = KnowledgeNode::new("identity", json!({"name": "Ouro"}));
        node.add_edge("created_by", "operator");
        node.add_edge("has_goal", "Self-Evolution");
        assert_eq!(node.edges[0].0, "created_by");
        assert_eq!(node.edges[1].1, "Self-Evolution");
        assert!(node.has_edge("has_goal", "Self-Evolution"));
        assert!(!node.has_edge("has_goal", "nothing"));
    }

    #[test]
    fn dangling_targets_are_legal() {
        let mut node = KnowledgeNode::new("a", json!({}));
        node.add_edge("points_at", "label-that-does-not-exist-yet");
        assert_eq!(node.edges.len(), 1);
    }
}
