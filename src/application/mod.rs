// Strategy parameter optimization
pub mod optimization;
