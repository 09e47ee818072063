//! Orchestration layer: configuration, external tool invocation, status records and reports.

pub mod tools;
pub mod metrics;
pub mod config;
pub mod status;
pub mod runner;
pub mod sample;
pub mod report;
pub mod batch;

pub use batch::Pipeline;
