//! Roadmap completion criteria: a step finishes when the declared files
//! exist in the working tree and contain the declared marker strings.
//! Advancing commits the roadmap change.

use std::path::Path;

/// `(step_key, [(file, required substring)], next_step_key)`
const STEP_CRITERIA: &[(&str, &[(&str, &str)], &str)] = &[
    (
        "step_4",
        &[
            ("nexus/retrieval.py", "RetrievalMixin"),
            ("nexus/memory.py", "VectorMemory"),
        ],
        "step_5",
    ),
    (
        "step_5",
        &[
            ("engine/consciousness.py", "ConsciousnessMixin"),
            ("engine/consciousness.py", "_inner_monologue"),
        ],
        "step_6",
    ),
    (
        "step_6",
        &[
            ("engine/goal_manager.py", "GoalManagerMixin"),
            ("engine/__init__.py", "GoalManagerMixin"),
        ],
        "step_7",
    ),
    (
        "step_7",
        &[
            ("engine/meta_cognition.py", "MetaCognitionMixin"),
            ("engine/meta_controller.py", "MetaController"),
        ],
        "step_8",
    ),
    (
        "step_8",
        &[
            ("engine/intuition.py", "IntuitionMixin"),
            ("engine/decision_gate.py", "DecisionGate"),
        ],
        "step_9",
    ),
    (
        "step_9",
        &[
            ("engine/temporal.py", "TemporalAwarenessMixin"),
            ("engine/temporal_integration.py", "activate_temporal_awareness"),
        ],
        "step_10",
    ),
    (
        "step_10",
        &[
            ("engine/unified_consciousness.py", "UnifiedConsciousnessMixin"),
            ("engine/attention.py", "AttentionManager"),
        ],
        "step_11",
    ),
    (
        "step_11",
        &[
            ("engine/resource_monitor.py", "ResourceAwarenessMixin"),
            ("engine/resource_monitor.py", "ResourceStatus"),
        ],
        "step_12",
    ),
];

#[derive(Debug, Clone)]
pub struct CriteriaCheck {
    pub step_key: String,
    pub satisfied: bool,
    /// `(file, marker, present)` per criterion.
    pub items: Vec<(String, String, bool)>,
    pub next_step: Option<String>,
}

fn criteria_for(step_key: &str) -> Option<(&'static [(&'static str, &'static str)], &'static str)> {
    STEP_CRITERIA
        .iter()
        .find(|(key, _, _)| *key == step_key)
        .map(|(_, checks, next)| (*checks, *next))
}

/// Evaluate one step's criteria against the working tree.
pub fn check_step(workspace: &Path, step_key: &str) -> CriteriaCheck {
    let Some((checks, next)) = criteria_for(step_key) else {
        return CriteriaCheck {
            step_key: step_key.to_string(),
            satisfied: false,
            items: Vec::new(),
            next_step: None,
        };
    };

    let items: Vec<(String, String, bool)> = checks
        .iter()
        .map(|(file, marker)| {
            let present = std::fs::read_to_string(workspace.join(file))
                .map(|content| content.contains(marker))
                .unwrap_or(false);
            (file.to_string(), marker.to_string(), present)
        })
        .collect();

    CriteriaCheck {
        step_key: step_key.to_string(),
        satisfied: !items.is_empty() && items.iter().all(|(_, _, present)| *present),
        items,
        next_step: Some(next.to_string()),
    }
}

/// Checklist block handed to the dreamer so it targets only missing items.
pub fn status_for_dreamer(check: &CriteriaCheck) -> String {
    if check.items.is_empty() {
        return "(no automated criteria for this step)".to_string();
    }
    check
        .items
        .iter()
        .map(|(file, marker, present)| {
            format!("{} {file}: {marker}", if *present { "✅" } else { "❌" })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmet_criteria_report_missing_items() {
        let dir = tempfile::tempdir().unwrap();
        let check = check_step(dir.path(), "step_4");
        assert!(!check.satisfied);
        assert_eq!(check.items.len(), 2);
        assert!(status_for_dreamer(&check).contains("❌ nexus/retrieval.py"));
    }

    #[test]
    fn satisfied_criteria_name_the_next_step() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nexus")).unwrap();
        std::fs::write(
            dir.path().join("nexus/retrieval.py"),
            "class RetrievalMixin:\n    pass\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("nexus/memory.py"),
            "class VectorMemory:\n    pass\n",
        )
        .unwrap();

        let check = check_step(dir.path(), "step_4");
        assert!(check.satisfied);
        assert_eq!(check.next_step.as_deref(), Some("step_5"));
        assert!(status_for_dreamer(&check).contains("✅"));
    }

    #[test]
    fn partial_markers_do_not_satisfy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nexus")).unwrap();
        std::fs::write(dir.path().join("nexus/retrieval.py"), "class RetrievalMixin: ...").unwrap();
        // memory.py missing entirely.
        let check = check_step(dir.path(), "step_4");
        assert!(!check.satisfied);
    }

    #[test]
    fn unknown_steps_have_no_criteria() {
        let dir = tempfile::tempdir().unwrap();
        let check = check_step(dir.path(), "step_99");
        assert!(!check.satisfied);
        assert!(check.next_step.is_none());
    }
}
