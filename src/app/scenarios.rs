use crate::app::workload::{measure, simulate_work, ThreadPlan};
use crate::config::BenchConfig;
use crate::core::{ArcProtected, MutexProtected, Protect, RcuBuilder, RwLockProtected};
use crate::domain::model::{BenchResult, Measurement, ProtectKind, ScenarioKind};
use crate::utils::error::{BenchError, Result};
use rand::Rng;
use std::hint::black_box;
use std::time::Duration;

/// Builds a fresh cell of the requested kind around `$init` and evaluates `$body` with it.
macro_rules! with_cell {
    ($kind:expr, $rcu:expr, $init:expr, |$cell:ident| $body:expr) => {
        match $kind {
            ProtectKind::Wbrcu => {
                let $cell = $rcu.clone().build($init);
                $body
            }
            ProtectKind::Arc => {
                let $cell = ArcProtected::new($init);
                $body
            }
            ProtectKind::Rwlock => {
                let $cell = RwLockProtected::new($init);
                $body
            }
            ProtectKind::Mutex => {
                let $cell = MutexProtected::new($init);
                $body
            }
        }
    };
}

/// Runs every configured variation of one scenario for one cell kind.
pub struct ScenarioRunner<'a> {
    config: &'a BenchConfig,
    rcu: RcuBuilder,
    duration: Duration,
    max_threads: usize,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(config: &'a BenchConfig) -> Self {
        Self {
            config,
            rcu: config.rcu.builder(),
            duration: config.duration(),
            max_threads: config.max_threads(),
        }
    }

    /// Number of measured runs `scenario` performs per implementation.
    pub fn run_count(&self, scenario: ScenarioKind) -> usize {
        let workload = &self.config.workload;
        match scenario {
            ScenarioKind::ReadScaling
            | ScenarioKind::WriteScaling
            | ScenarioKind::MixedRead
            | ScenarioKind::MixedWrite => self.config.thread_counts(1).len(),
            ScenarioKind::RwRatio => workload.read_ratios.len() * self.config.thread_counts(2).len(),
            ScenarioKind::DataSize => workload.data_sizes.len(),
            ScenarioKind::SimulatedWork => workload.simulated_work_ns.len(),
        }
    }

    pub fn run(&self, scenario: ScenarioKind, kind: ProtectKind) -> Result<Vec<BenchResult>> {
        match scenario {
            ScenarioKind::ReadScaling => self.read_scaling(kind),
            ScenarioKind::WriteScaling => self.write_scaling(kind),
            ScenarioKind::RwRatio => self.rw_ratio(kind),
            ScenarioKind::MixedRead => self.mixed(kind, ScenarioKind::MixedRead),
            ScenarioKind::MixedWrite => self.mixed(kind, ScenarioKind::MixedWrite),
            ScenarioKind::DataSize => self.data_size(kind),
            ScenarioKind::SimulatedWork => self.simulated_work(kind),
        }
    }

    fn read_scaling(&self, kind: ProtectKind) -> Result<Vec<BenchResult>> {
        let scenario = ScenarioKind::ReadScaling;
        let mut results = Vec::new();

        for threads in self.config.thread_counts(1) {
            let plan = ThreadPlan::readers(threads);
            let m = with_cell!(kind, self.rcu, 0u64, |cell| {
                counter_run(&cell, plan, self.duration, 0)
            })
            .map_err(|message| worker_failed(scenario, message))?;

            tracing::debug!("{} {} threads={} ops/s={:.0}", scenario, kind, threads, m.ops_per_sec());
            results.push(BenchResult::new(scenario, kind, threads, 0, None, m));
        }

        Ok(results)
    }

    fn write_scaling(&self, kind: ProtectKind) -> Result<Vec<BenchResult>> {
        let scenario = ScenarioKind::WriteScaling;
        let mut results = Vec::new();

        for threads in self.config.thread_counts(1) {
            let plan = ThreadPlan::writers(threads);
            let (m, observed) = with_cell!(kind, self.rcu, 0u64, |cell| {
                counter_run(&cell, plan, self.duration, 0).map(|m| (m, *cell.read()))
            })
            .map_err(|message| worker_failed(scenario, message))?;

            check_no_lost_updates(scenario, kind, m.writes, observed)?;
            tracing::debug!("{} {} threads={} ops/s={:.0}", scenario, kind, threads, m.ops_per_sec());
            results.push(BenchResult::new(scenario, kind, 0, threads, None, m));
        }

        Ok(results)
    }

    fn rw_ratio(&self, kind: ProtectKind) -> Result<Vec<BenchResult>> {
        let scenario = ScenarioKind::RwRatio;
        let work_ns = self.config.workload.work_ns;
        let mut results = Vec::new();

        for &ratio in &self.config.workload.read_ratios {
            for threads in self.config.thread_counts(2) {
                let readers = threads * usize::from(ratio) / 100;
                let writers = threads - readers;
                let plan = ThreadPlan {
                    readers,
                    writers,
                    ..ThreadPlan::default()
                };

                let m = with_cell!(kind, self.rcu, 0u64, |cell| {
                    counter_run(&cell, plan, self.duration, work_ns)
                })
                .map_err(|message| worker_failed(scenario, message))?;

                results.push(BenchResult::new(
                    scenario,
                    kind,
                    readers,
                    writers,
                    Some(u64::from(ratio)),
                    m,
                ));
            }
        }

        Ok(results)
    }

    fn mixed(&self, kind: ProtectKind, scenario: ScenarioKind) -> Result<Vec<BenchResult>> {
        let work_ns = self.config.workload.work_ns;
        let mut results = Vec::new();

        for threads in self.config.thread_counts(1) {
            let background = self.max_threads.saturating_sub(threads);
            let (plan, readers, writers) = if scenario == ScenarioKind::MixedRead {
                (
                    ThreadPlan::readers(threads).with_background_writers(background),
                    threads,
                    0,
                )
            } else {
                (
                    ThreadPlan::writers(threads).with_background_readers(background),
                    0,
                    threads,
                )
            };

            let m = with_cell!(kind, self.rcu, 0u64, |cell| {
                counter_run(&cell, plan, self.duration, work_ns)
            })
            .map_err(|message| worker_failed(scenario, message))?;

            results.push(BenchResult::new(
                scenario,
                kind,
                readers,
                writers,
                Some(background as u64),
                m,
            ));
        }

        Ok(results)
    }

    fn data_size(&self, kind: ProtectKind) -> Result<Vec<BenchResult>> {
        let scenario = ScenarioKind::DataSize;
        let threads = self.max_threads;
        let mut results = Vec::new();

        for &size in &self.config.workload.data_sizes {
            let plan = ThreadPlan::writers(threads);
            let (m, observed) = with_cell!(kind, self.rcu, vec![0u64; size], |cell| {
                payload_run(&cell, plan, self.duration, size).map(|m| (m, cell.read().iter().sum::<u64>()))
            })
            .map_err(|message| worker_failed(scenario, message))?;

            check_no_lost_updates(scenario, kind, m.writes, observed)?;
            results.push(BenchResult::new(scenario, kind, 0, threads, Some(size as u64), m));
        }

        Ok(results)
    }

    fn simulated_work(&self, kind: ProtectKind) -> Result<Vec<BenchResult>> {
        let scenario = ScenarioKind::SimulatedWork;
        let threads = self.max_threads;
        let mut results = Vec::new();

        for &work_ns in &self.config.workload.simulated_work_ns {
            let plan = ThreadPlan::readers(threads);
            let m = with_cell!(kind, self.rcu, 0u64, |cell| {
                counter_run(&cell, plan, self.duration, work_ns)
            })
            .map_err(|message| worker_failed(scenario, message))?;

            results.push(BenchResult::new(scenario, kind, threads, 0, Some(work_ns), m));
        }

        Ok(results)
    }
}

/// Readers hold a guard across `work_ns` of busy work, writers increment inside the update.
fn counter_run<P: Protect<u64>>(
    cell: &P,
    plan: ThreadPlan,
    duration: Duration,
    work_ns: u64,
) -> std::result::Result<Measurement, String> {
    measure(
        cell,
        plan,
        duration,
        |cell| {
            let guard = cell.read();
            black_box(*guard);
            simulate_work(work_ns);
        },
        |cell, _| {
            cell.update(move |v| {
                *v += 1;
                simulate_work(work_ns);
            })
        },
    )
}

/// Writers bump one random slot of a `size`-element payload.
fn payload_run<P: Protect<Vec<u64>>>(
    cell: &P,
    plan: ThreadPlan,
    duration: Duration,
    size: usize,
) -> std::result::Result<Measurement, String> {
    let mask = size - 1;
    measure(
        cell,
        plan,
        duration,
        |cell| {
            black_box(cell.read().len());
        },
        |cell, rng| {
            let index = rng.gen::<usize>() & mask;
            cell.update(move |data| data[index] += 1)
        },
    )
}

fn check_no_lost_updates(
    scenario: ScenarioKind,
    kind: ProtectKind,
    expected: u64,
    observed: u64,
) -> Result<()> {
    if expected != observed {
        tracing::error!(
            "❌ {} on {}: {} writes issued, {} visible",
            kind,
            scenario,
            expected,
            observed
        );
        return Err(BenchError::LostUpdates {
            scenario: scenario.to_string(),
            implementation: kind.to_string(),
            expected,
            observed,
        });
    }
    Ok(())
}

fn worker_failed(scenario: ScenarioKind, message: String) -> BenchError {
    BenchError::WorkerPanicked {
        scenario: scenario.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> BenchConfig {
        let mut config = BenchConfig::default();
        config.bench.duration_ms = 10;
        config.bench.max_threads = Some(2);
        config.workload.work_ns = 0;
        config.workload.read_ratios = vec![50];
        config.workload.data_sizes = vec![4];
        config.workload.simulated_work_ns = vec![10];
        config.rcu.cleanup_threshold = Some(2);
        config
    }

    #[test]
    fn test_run_counts() {
        let config = quick_config();
        let runner = ScenarioRunner::new(&config);
        assert_eq!(runner.run_count(ScenarioKind::ReadScaling), 2);
        assert_eq!(runner.run_count(ScenarioKind::RwRatio), 1);
        assert_eq!(runner.run_count(ScenarioKind::DataSize), 1);
    }

    #[test]
    fn test_write_scaling_counts_every_update() {
        let config = quick_config();
        let runner = ScenarioRunner::new(&config);

        for kind in ProtectKind::ALL {
            let results = runner.run(ScenarioKind::WriteScaling, kind).unwrap();
            assert_eq!(results.len(), 2);
            assert!(results.iter().all(|r| r.writes > 0 && r.reads == 0));
        }
    }

    #[test]
    fn test_rw_ratio_splits_threads() {
        let config = quick_config();
        let runner = ScenarioRunner::new(&config);

        let results = runner.run(ScenarioKind::RwRatio, ProtectKind::Wbrcu).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!((results[0].readers, results[0].writers), (1, 1));
        assert_eq!(results[0].parameter, Some(50));
    }

    #[test]
    fn test_mixed_read_uses_background_writers() {
        let config = quick_config();
        let runner = ScenarioRunner::new(&config);

        let results = runner.run(ScenarioKind::MixedRead, ProtectKind::Wbrcu).unwrap();
        assert_eq!(results[0].parameter, Some(1));
        assert_eq!(results[0].writes, 0);
        assert!(results[0].reads > 0);
    }

    #[test]
    fn test_data_size_payload_sums_match() {
        let config = quick_config();
        let runner = ScenarioRunner::new(&config);

        let results = runner.run(ScenarioKind::DataSize, ProtectKind::Wbrcu).unwrap();
        assert_eq!(results[0].parameter, Some(4));
        assert_eq!(results[0].writers, 2);
    }

    #[test]
    fn test_lost_update_check() {
        assert!(check_no_lost_updates(ScenarioKind::WriteScaling, ProtectKind::Mutex, 3, 3).is_ok());
        assert!(matches!(
            check_no_lost_updates(ScenarioKind::WriteScaling, ProtectKind::Mutex, 3, 2),
            Err(BenchError::LostUpdates { .. })
        ));
    }
}
