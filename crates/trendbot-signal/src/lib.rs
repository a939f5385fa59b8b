//! Signal engine for the moving-average trend strategy.
//!
//! [`evaluate_crossover`] is a pure function of a frozen series and a window
//! length. [`SignalEngine`] wraps it with per-instrument logging.

pub mod crossover;
pub mod engine;

pub use crossover::{evaluate_crossover, Insufficiency, SignalEvaluation};
pub use engine::SignalEngine;
