// Report reading and synchronization
pub mod parser;
pub mod synchronizer;

// Candidate generation and the optimization loop
pub mod evaluator;
pub mod optimizer;
pub mod scheduler;
pub mod strategies;
pub mod timeframe;

pub mod reporting;

pub use optimizer::{OptimizationRequest, Optimizer, ProgressUpdate};
pub use reporting::OptimizeReporter;
