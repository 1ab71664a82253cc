//! Resource metabolism: token and cost accounting per LLM call, a rolling
//! daily ledger on disk, and the scarcity signal the decision gate uses to
//! prefer the cheap path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const RESOURCE_FILE: &str = "resource_stats.json";
/// Daily ledger ring size.
const LEDGER_CAP: usize = 30;

/// Cost table: $ per 1M input/output tokens.  Approximate, for budget
/// signalling only.
const COST_TABLE: &[(&str, f64, f64)] = &[
    ("claude-opus", 15.0, 75.0),
    ("claude-sonnet", 3.0, 15.0),
    ("claude-haiku", 0.25, 1.25),
    ("gpt-4o", 5.0, 15.0),
    ("gpt-4o-mini", 0.15, 0.6),
    ("gemini-3.0-flash", 0.1, 0.4),
    ("gemini-2.0-flash", 0.1, 0.4),
    ("gemini-1.5-pro", 3.5, 10.5),
];
const DEFAULT_COST: (f64, f64) = (1.0, 3.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Plenty of budget: System 2 freely.
    Abundant,
    /// Default posture.
    Sufficient,
    /// Prefer System 1 and compressed context.
    Scarce,
    /// Survival mode: System 1 and the cheapest tier.
    Critical,
}

impl ResourceStatus {
    pub fn biases_fast_path(self) -> bool {
        matches!(self, ResourceStatus::Scarce | ResourceStatus::Critical)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayTally {
    pub day: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost: f64,
    pub call_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedStats {
    current: DayTally,
    ledger: Vec<DayTally>,
}

#[derive(Debug)]
pub struct ResourceMonitor {
    path: PathBuf,
    daily_budget: f64,
    day_start: NaiveDate,
    current: DayTally,
    ledger: Vec<DayTally>,
    pub last_call: Option<DateTime<Utc>>,
}

impl ResourceMonitor {
    pub fn open(base_path: impl AsRef<Path>, daily_budget: f64) -> Self {
        let path = base_path.as_ref().join(RESOURCE_FILE);
        let today = Local::now().date_naive();

        let persisted: PersistedStats = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        // Resume today's tally only when it actually is today's.
        let (current, mut ledger) = if persisted.current.day == today.to_string() {
            (persisted.current, persisted.ledger)
        } else {
            let mut ledger = persisted.ledger;
            if !persisted.current.day.is_empty() {
                ledger.push(persisted.current);
            }
            (
                DayTally {
                    day: today.to_string(),
                    ..DayTally::default()
                },
                ledger,
            )
        };
        trim_ledger(&mut ledger);

        Self {
            path,
            daily_budget,
            day_start: today,
            current,
            ledger,
            last_call: None,
        }
    }

    /// Record one LLM call.  The day-rollover check runs first so an
    /// in-flight event lands in the correct day.
    pub fn track_usage(&mut self, model: &str, input_tokens: u64, output_tokens: u64) {
        self.check_day_rollover();

        let (input_rate, output_rate) = cost_for(model);
        let cost = input_tokens as f64 / 1_000_000.0 * input_rate
            + output_tokens as f64 / 1_000_000.0 * output_rate;

        self.current.input_tokens += input_tokens;
        self.current.output_tokens += output_tokens;
        self.current.estimated_cost += cost;
        self.current.call_count += 1;
        self.last_call = Some(Utc::now());

        self.persist();
    }

    fn check_day_rollover(&mut self) {
        let today = Local::now().date_naive();
        if today == self.day_start {
            return;
        }
        info!(closed = %self.current.day, "daily resource ledger rolled over");
        self.ledger.push(std::mem::take(&mut self.current));
        trim_ledger(&mut self.ledger);
        self.day_start = today;
        self.current.day = today.to_string();
        self.persist();
    }

    pub fn budget_ratio(&self) -> f64 {
        if self.daily_budget <= 0.0 {
            return 1.0;
        }
        self.current.estimated_cost / self.daily_budget
    }

    pub fn status(&self) -> ResourceStatus {
        match self.budget_ratio() {
            r if r < 0.25 => ResourceStatus::Abundant,
            r if r < 0.5 => ResourceStatus::Sufficient,
            r if r < 0.75 => ResourceStatus::Scarce,
            _ => ResourceStatus::Critical,
        }
    }

    pub fn today(&self) -> &DayTally {
        &self.current
    }

    pub fn ledger(&self) -> &[DayTally] {
        &self.ledger
    }

    pub fn report(&self) -> String {
        format!(
            "resources: {:?} — today {} calls, {} in / {} out tokens, ~${:.4} of ${:.2}",
            self.status(),
            self.current.call_count,
            self.current.input_tokens,
            self.current.output_tokens,
            self.current.estimated_cost,
            self.daily_budget
        )
    }

    fn persist(&self) {
        let persisted = PersistedStats {
            current: self.current.clone(),
            ledger: self.ledger.clone(),
        };
        match serde_json::to_string_pretty(&persisted) {
            Ok(rendered) => {
                if let Err(err) = std::fs::write(&self.path, rendered) {
                    warn!(%err, "resource ledger save failed");
                }
            }
            Err(err) => warn!(%err, "resource ledger serialisation failed"),
        }
    }
}

fn trim_ledger(ledger: &mut Vec<DayTally>) {
    if ledger.len() > LEDGER_CAP {
        let overflow = ledger.len() - LEDGER_CAP;
        ledger.drain(..overflow);
    }
}

fn cost_for(model: &str) -> (f64, f64) {
    let lower = model.to_lowercase();
    COST_TABLE
        .iter()
        .find(|(name, _, _)| lower.contains(name))
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or(DEFAULT_COST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_accumulates_cost_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = ResourceMonitor::open(dir.path(), 5.0);
        monitor.track_usage("google/gemini-3.0-flash", 1_000_000, 500_000);

        let today = monitor.today();
        assert_eq!(today.call_count, 1);
        assert_eq!(today.input_tokens, 1_000_000);
        // 1M in @ $0.1 + 0.5M out @ $0.4.
        assert!((today.estimated_cost - 0.3).abs() < 1e-9);
    }

    #[test]
    fn status_tracks_budget_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = ResourceMonitor::open(dir.path(), 1.0);
        assert_eq!(monitor.status(), ResourceStatus::Abundant);

        // claude-opus input: $15 per 1M → 20k tokens = $0.30.
        monitor.track_usage("anthropic/claude-opus", 20_000, 0);
        assert_eq!(monitor.status(), ResourceStatus::Sufficient);

        monitor.track_usage("anthropic/claude-opus", 20_000, 0);
        assert_eq!(monitor.status(), ResourceStatus::Scarce);
        assert!(monitor.status().biases_fast_path());

        monitor.track_usage("anthropic/claude-opus", 20_000, 0);
        assert_eq!(monitor.status(), ResourceStatus::Critical);
    }

    #[test]
    fn persists_todays_tally_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut monitor = ResourceMonitor::open(dir.path(), 5.0);
            monitor.track_usage("gpt-4o-mini", 1000, 1000);
        }
        let monitor = ResourceMonitor::open(dir.path(), 5.0);
        assert_eq!(monitor.today().call_count, 1);
    }

    #[test]
    fn unknown_models_use_default_pricing() {
        assert_eq!(cost_for("mystery-model-9000"), DEFAULT_COST);
        assert_eq!(cost_for("anthropic/claude-haiku-4"), (0.25, 1.25));
    }

    #[test]
    fn stale_day_moves_to_ledger_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let stale = PersistedStats {
            current: DayTally {
                day: "2001-01-01".to_string(),
                call_count: 9,
                ..DayTally::default()
            },
            ledger: vec![],
        };
        std::fs::write(
            dir.path().join(RESOURCE_FILE),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let monitor = ResourceMonitor::open(dir.path(), 5.0);
        assert_eq!(monitor.today().call_count, 0);
        assert_eq!(monitor.ledger().len(), 1);
        assert_eq!(monitor.ledger()[0].call_count, 9);
    }
}
