use crate::app::scenarios::ScenarioRunner;
use crate::config::BenchConfig;
use crate::core::hardware_concurrency;
use crate::domain::model::{BenchReport, ProtectKind, ScenarioKind};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use crate::utils::validation::Validate;
use chrono::Utc;
use std::time::Duration;

/// One scenario/implementation pair the engine will measure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRun {
    pub scenario: ScenarioKind,
    pub implementation: ProtectKind,
    pub runs: usize,
}

pub struct BenchEngine {
    config: BenchConfig,
    monitor: SystemMonitor,
}

impl BenchEngine {
    pub fn new(config: BenchConfig) -> Self {
        Self::new_with_monitoring(config, false)
    }

    pub fn new_with_monitoring(config: BenchConfig, monitor_enabled: bool) -> Self {
        Self {
            config,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn plan(&self) -> Vec<PlannedRun> {
        let runner = ScenarioRunner::new(&self.config);
        let mut plan = Vec::new();
        for &scenario in &self.config.bench.scenarios {
            for &implementation in &self.config.bench.implementations {
                plan.push(PlannedRun {
                    scenario,
                    implementation,
                    runs: runner.run_count(scenario),
                });
            }
        }
        plan
    }

    /// Lower bound on wall time: measured time only, no setup or teardown.
    pub fn estimated_duration(&self) -> Duration {
        let runs: usize = self.plan().iter().map(|p| p.runs).sum();
        self.config.duration() * runs as u32
    }

    pub fn run(&self) -> Result<BenchReport> {
        self.config.validate()?;

        let started_at = Utc::now();
        let runner = ScenarioRunner::new(&self.config);
        let mut results = Vec::new();

        tracing::info!(
            "🚀 Starting benchmark '{}' ({} threads max, {:?} per run)",
            self.config.bench.name,
            self.config.max_threads(),
            self.config.duration()
        );
        self.monitor.log_stats("Start");

        for &scenario in &self.config.bench.scenarios {
            for &implementation in &self.config.bench.implementations {
                tracing::info!("⏱️  {} / {}", scenario, implementation);
                let scenario_results = runner.run(scenario, implementation)?;

                if let Some(best) = scenario_results
                    .iter()
                    .max_by(|a, b| a.ops_per_sec.total_cmp(&b.ops_per_sec))
                {
                    tracing::info!(
                        "   best: {:.0} ops/s with {} threads",
                        best.ops_per_sec,
                        best.threads
                    );
                }
                results.extend(scenario_results);
            }
            self.monitor.log_stats(scenario.as_str());
        }

        self.monitor.log_final_stats();
        tracing::info!("✅ Collected {} results", results.len());

        Ok(BenchReport {
            name: self.config.bench.name.clone(),
            started_at,
            finished_at: Utc::now(),
            hardware_concurrency: hardware_concurrency(),
            peak_memory_mb: self.monitor.peak_memory_mb(),
            results,
        })
    }
}
