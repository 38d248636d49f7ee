pub mod parameter;
pub mod range;
pub mod report;
pub mod state;
pub mod test_run;

pub use parameter::{ParamValue, ParameterAssignment, ParameterSpace};
pub use range::{ParameterRange, ParameterRanges};
pub use report::{IterationTiming, MetricValue, PerformanceReport};
pub use state::OptimizationState;
pub use test_run::{
    IterationRecord, MetricFilter, OptimizationMethod, RecordOutcome, StartParams, StopReason,
    TestRun,
};
