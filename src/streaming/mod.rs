//! Stream processing helpers used by the orchestrator.

pub mod accumulator;

pub use accumulator::{DeltaAccumulator, FinalizedCall, RoundOutcome, ToolCallBuilder};
