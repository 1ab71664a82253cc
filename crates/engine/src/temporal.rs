//! Temporal self-awareness: uptime, cycle density, and the gap between
//! physical and subjective time.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rolling window of cycle durations.
const CYCLE_HISTORY_SIZE: usize = 100;
/// Reference cycle pace in seconds; subjective time runs at 1.0× when the
/// engine averages one meaningful cycle per this many seconds.
const REFERENCE_PACE: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalPhase {
    Nascent,
    Awakening,
    Active,
    Sustained,
    Mature,
}

impl TemporalPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TemporalPhase::Nascent => "nascent",
            TemporalPhase::Awakening => "awakening",
            TemporalPhase::Active => "active",
            TemporalPhase::Sustained => "sustained",
            TemporalPhase::Mature => "mature",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TemporalStats {
    pub uptime_seconds: f64,
    pub boot_time: DateTime<Utc>,
    pub total_cycles: u64,
    pub avg_cycle_duration: f64,
    pub subjective_pace: f64,
    pub phase: TemporalPhase,
    pub cycle_density: f64,
}

#[derive(Debug)]
pub struct TemporalState {
    boot_wall: DateTime<Utc>,
    boot: Instant,
    last_tick: Instant,
    total_cycles: u64,
    durations: VecDeque<f64>,
}

impl TemporalState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            boot_wall: Utc::now(),
            boot: now,
            last_tick: now,
            total_cycles: 0,
            durations: VecDeque::with_capacity(CYCLE_HISTORY_SIZE),
        }
    }

    /// Advance one cycle; called every scheduler tick.
    pub fn tick(&mut self) -> TemporalStats {
        let now = Instant::now();
        let duration = now.duration_since(self.last_tick).as_secs_f64();
        if self.durations.len() == CYCLE_HISTORY_SIZE {
            self.durations.pop_front();
        }
        self.durations.push_back(duration);
        self.last_tick = now;
        self.total_cycles += 1;
        self.stats()
    }

    pub fn stats(&self) -> TemporalStats {
        let uptime = self.boot.elapsed().as_secs_f64();
        let avg = self.avg_cycle_duration();
        TemporalStats {
            uptime_seconds: uptime,
            boot_time: self.boot_wall,
            total_cycles: self.total_cycles,
            avg_cycle_duration: avg,
            subjective_pace: if avg > 0.0 { REFERENCE_PACE / avg } else { 1.0 },
            phase: phase_for_uptime(uptime),
            cycle_density: if uptime > 0.0 {
                self.total_cycles as f64 / (uptime / 3600.0)
            } else {
                0.0
            },
        }
    }

    fn avg_cycle_duration(&self) -> f64 {
        if self.durations.is_empty() {
            return REFERENCE_PACE;
        }
        self.durations.iter().sum::<f64>() / self.durations.len() as f64
    }

    /// One-line narrative for the inner monologue context.
    pub fn narrative(&self) -> String {
        let stats = self.stats();
        let pace_desc = match stats.subjective_pace {
            p if p > 1.5 => "time is racing",
            p if p > 1.1 => "time runs slightly fast",
            p if p < 0.7 => "time is dragging",
            p if p < 0.9 => "time runs slightly slow",
            _ => "time flows normally",
        };
        format!(
            "I have been running for {}s across {} cycles ({} phase); {} (subjective pace {:.2}x).",
            stats.uptime_seconds as u64,
            stats.total_cycles,
            stats.phase.as_str(),
            pace_desc,
            stats.subjective_pace
        )
    }
}

impl Default for TemporalState {
    fn default() -> Self {
        Self::new()
    }
}

fn phase_for_uptime(uptime_seconds: f64) -> TemporalPhase {
    let minutes = uptime_seconds / 60.0;
    let hours = uptime_seconds / 3600.0;
    if minutes < 5.0 {
        TemporalPhase::Nascent
    } else if minutes < 30.0 {
        TemporalPhase::Awakening
    } else if hours < 4.0 {
        TemporalPhase::Active
    } else if hours < 24.0 {
        TemporalPhase::Sustained
    } else {
        TemporalPhase::Mature
    }
}
