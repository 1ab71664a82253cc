//! The tuner: translate a strategy mode into the concrete runtime
//! parameters the scheduler consumes.  Publication replaces the whole
//! record; the single-threaded loop always reads the newest copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::adapter::StrategyMode;

/// The tuning vector applied to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeParameters {
    pub evolution_interval: u64,
    pub burst_mode: bool,
    /// Evolution attempts allowed inside one burst; the scheduler ends a
    /// burst early once these are spent.
    pub burst_limit: u32,
    /// LLM sampling temperature, clamped to [0, 1].
    pub temperature: f32,
    /// 1 = light, 2 = standard, 3 = strict.
    pub validation_level: u8,
    pub monologue_interval: u64,
    pub active_mode: String,
    pub last_updated: DateTime<Utc>,
}

impl RuntimeParameters {
    fn for_mode(mode: StrategyMode, base_interval: u64) -> Self {
        // (interval multiplier, temperature, burst limit, validation, monologue)
        let (multiplier, temperature, burst_limit, validation_level, monologue_interval) =
            match mode {
                StrategyMode::Normal => (1.0, 0.7, 5, 2, 3600),
                StrategyMode::Accelerated => (0.5, 0.8, 10, 1, 3600),
                StrategyMode::Cautious => (2.0, 0.5, 2, 3, 2400),
                StrategyMode::DeepReflection => (3.0, 0.3, 1, 3, 1200),
            };
        Self {
            evolution_interval: (base_interval as f64 * multiplier) as u64,
            burst_mode: false,
            burst_limit,
            temperature: (temperature as f32).clamp(0.0, 1.0),
            validation_level,
            monologue_interval,
            active_mode: mode.as_str().to_string(),
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct RuntimeTuner {
    base_interval: u64,
    current: RuntimeParameters,
    mode_history: Vec<(String, DateTime<Utc>)>,
}

impl RuntimeTuner {
    pub fn new(base_interval: u64) -> Self {
        Self {
            base_interval,
            current: RuntimeParameters::for_mode(StrategyMode::Normal, base_interval),
            mode_history: Vec::new(),
        }
    }

    /// The most recently published parameters.
    pub fn current(&self) -> &RuntimeParameters {
        &self.current
    }

    /// Publish the parameter set for a mode.  The whole record is replaced
    /// at once; readers never observe a half-applied change.
    pub fn apply_strategy(&mut self, mode: StrategyMode) -> &RuntimeParameters {
        let params = RuntimeParameters::for_mode(mode, self.base_interval);
        info!(
            mode = mode.as_str(),
            interval = params.evolution_interval,
            temperature = params.temperature,
            burst_limit = params.burst_limit,
            validation = params.validation_level,
            "runtime parameters published"
        );
        self.current = params;
        self.mode_history.push((mode.as_str().to_string(), Utc::now()));
        if self.mode_history.len() > 100 {
            let overflow = self.mode_history.len() - 50;
            self.mode_history.drain(..overflow);
        }
        &self.current
    }

    pub fn mode_history(&self, limit: usize) -> Vec<&(String, DateTime<Utc>)> {
        self.mode_history.iter().rev().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_tables_scale_the_base_interval() {
        let mut tuner = RuntimeTuner::new(3600);
        assert_eq!(tuner.current().evolution_interval, 3600);
        assert_eq!(tuner.current().burst_limit, 5);

        tuner.apply_strategy(StrategyMode::Accelerated);
        assert_eq!(tuner.current().evolution_interval, 1800);
        assert_eq!(tuner.current().validation_level, 1);
        assert_eq!(tuner.current().burst_limit, 10);

        tuner.apply_strategy(StrategyMode::Cautious);
        assert_eq!(tuner.current().evolution_interval, 7200);
        assert_eq!(tuner.current().validation_level, 3);
        assert_eq!(tuner.current().burst_limit, 2);

        tuner.apply_strategy(StrategyMode::DeepReflection);
        assert_eq!(tuner.current().evolution_interval, 10800);
        assert_eq!(tuner.current().monologue_interval, 1200);
        assert_eq!(tuner.current().burst_limit, 1);
        assert!((tuner.current().temperature - 0.3).abs() < 1e-6);
    }

    #[test]
    fn publication_replaces_whole_record() {
        let mut tuner = RuntimeTuner::new(3600);
        let before = tuner.current().last_updated;
        tuner.apply_strategy(StrategyMode::Accelerated);
        let after = tuner.current();
        assert_eq!(after.active_mode, "accelerated");
        assert!(after.last_updated >= before);
    }

    #[test]
    fn history_is_bounded() {
        let mut tuner = RuntimeTuner::new(60);
        for _ in 0..150 {
            tuner.apply_strategy(StrategyMode::Normal);
        }
        assert!(tuner.mode_history(200).len() <= 100);
    }
}
