//! Strategy evaluation.
//!
//! The engine ticks on a schedule, builds an immutable [`Snapshot`], and
//! runs every enabled evaluator over it. Evaluators are pure: snapshot in,
//! candidates out, no side effects.

mod engine;
mod evaluators;
mod snapshot;

pub use engine::{StrategyEngine, StrategyEngineConfig};
pub use evaluators::{default_evaluators, helpers};
pub use snapshot::Snapshot;

use crate::core::domain::Candidate;

/// A single-responsibility strategy evaluator.
pub trait Evaluator: Send + Sync {
    /// Strategy name; matches the `strategies` registry row.
    fn name(&self) -> &'static str;

    /// Produce candidates from the snapshot. Pure.
    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate>;
}
