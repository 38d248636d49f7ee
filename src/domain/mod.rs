// Parameters, reports and test runs
pub mod optimization;

// Port interfaces
pub mod ports;

// Host session context shared with adapters
pub mod session;

// Domain-specific error types
pub mod errors;
