//! Somatic state: a compact affect record nudged by outcomes and read by
//! attention and the decision gate.  Valence is signed; everything else
//! lives in [0, 1].

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SomaticState {
    /// Feeling tone, [-1, 1].
    pub valence: f32,
    /// Activation level, [0, 1].
    pub arousal: f32,
    /// Accumulated strain, [0, 1].
    pub tension: f32,
}

impl Default for SomaticState {
    fn default() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.3,
            tension: 0.1,
        }
    }
}

impl SomaticState {
    /// Successful evolutions lift valence and relax tension.
    pub fn on_success(&mut self) {
        self.valence = (self.valence + 0.2).clamp(-1.0, 1.0);
        self.tension = (self.tension - 0.1).clamp(0.0, 1.0);
        self.arousal = (self.arousal + 0.05).clamp(0.0, 1.0);
    }

    /// Failures depress valence and build tension.
    pub fn on_failure(&mut self) {
        self.valence = (self.valence - 0.25).clamp(-1.0, 1.0);
        self.tension = (self.tension + 0.2).clamp(0.0, 1.0);
        self.arousal = (self.arousal + 0.1).clamp(0.0, 1.0);
    }

    /// Quiet ticks decay everything back toward baseline.
    pub fn relax(&mut self) {
        self.valence *= 0.98;
        self.arousal = (self.arousal * 0.99).clamp(0.0, 1.0);
        self.tension = (self.tension * 0.97).clamp(0.0, 1.0);
    }

    /// Urgency bid for the attention manager: high tension demands focus.
    pub fn attention_urgency(&self) -> f32 {
        self.tension.clamp(0.0, 1.0)
    }

    pub fn describe(&self) -> String {
        let mood = match self.valence {
            v if v > 0.4 => "confident",
            v if v > 0.0 => "steady",
            v if v > -0.4 => "uneasy",
            _ => "strained",
        };
        format!(
            "{mood} (valence {:.2}, arousal {:.2}, tension {:.2})",
            self.valence, self.arousal, self.tension
        )
    }
}
