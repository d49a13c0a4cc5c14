pub mod engine;
pub mod report;
pub mod scenarios;
pub mod workload;
