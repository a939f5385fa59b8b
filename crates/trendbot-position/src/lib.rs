//! Position bookkeeping for the trend bot.
//!
//! - [`OwnershipBook`]: per-instrument held/not-held state, mutated
//!   optimistically at submission and corrected by execution callbacks
//! - [`PositionReconciler`]: maps (signal, ownership) to order decisions

pub mod ownership;
pub mod reconciler;

pub use ownership::OwnershipBook;
pub use reconciler::{OrderDecision, PositionReconciler, ReconcileOutcome, SkipReason, SkippedDecision};
