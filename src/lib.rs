pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliArgs;
pub use crate::config::BenchConfig;

pub use crate::app::engine::BenchEngine;
pub use crate::app::report::{LocalStorage, ReportWriter};
pub use crate::core::{Protect, Rcu, RcuBuilder, ReadGuard};
pub use crate::utils::error::{BenchError, Result};
