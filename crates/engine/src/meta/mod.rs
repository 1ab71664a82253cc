//! Meta-cognition: evaluate recent efficacy, pick an operating strategy,
//! translate it into runtime parameters.

mod adapter;
mod cycle;
mod evaluator;
mod tuner;

pub use adapter::{StrategyAdapter, StrategyMode};
pub use cycle::{CycleReport, MetaCycle};
pub use evaluator::{EfficacyEvaluation, MetaEvaluator};
pub use tuner::{RuntimeParameters, RuntimeTuner};
