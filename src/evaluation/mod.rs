pub mod metrics;
pub mod summary;
pub mod vote;

pub use metrics::PassMetrics;
pub use summary::{CrossValidationSummary, FoldOutcome};
pub use vote::{argmax, average_probabilities, EnsembleDecision};
