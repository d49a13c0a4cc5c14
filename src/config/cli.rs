use crate::config::toml_config::{BenchConfig, MonitoringConfig};
use crate::domain::model::{ProtectKind, ScenarioKind};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "wbrcu-bench")]
#[command(about = "Benchmark the writer-biased RCU cell against lock-based cells")]
pub struct CliArgs {
    /// Path to a TOML benchmark configuration. Built-in defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Measured time per run, in milliseconds
    #[arg(long)]
    pub duration_ms: Option<u64>,

    /// Upper bound of the thread sweep
    #[arg(long)]
    pub max_threads: Option<usize>,

    /// Cells to benchmark
    #[arg(long, value_enum, value_delimiter = ',')]
    pub implementations: Vec<ProtectKind>,

    /// Scenarios to run
    #[arg(long, value_enum, value_delimiter = ',')]
    pub scenarios: Vec<ScenarioKind>,

    /// Directory the report is written to
    #[arg(short, long)]
    pub output: Option<String>,

    /// Report formats (csv, json)
    #[arg(long, value_delimiter = ',')]
    pub formats: Vec<String>,

    /// Override monitoring setting from config
    #[arg(long)]
    pub monitor: Option<bool>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Print the run plan without measuring anything
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn load_config(&self) -> crate::Result<BenchConfig> {
        let mut config = match &self.config {
            Some(path) => BenchConfig::from_file(path)?,
            None => BenchConfig::default(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    /// Command line flags win over the file.
    pub fn apply_overrides(&self, config: &mut BenchConfig) {
        if let Some(duration_ms) = self.duration_ms {
            config.bench.duration_ms = duration_ms;
            tracing::info!("🔧 Duration overridden to: {}ms", duration_ms);
        }
        if let Some(max_threads) = self.max_threads {
            config.bench.max_threads = Some(max_threads);
            tracing::info!("🔧 Max threads overridden to: {}", max_threads);
        }
        if !self.implementations.is_empty() {
            config.bench.implementations = self.implementations.clone();
        }
        if !self.scenarios.is_empty() {
            config.bench.scenarios = self.scenarios.clone();
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if !self.formats.is_empty() {
            config.output.formats = self.formats.clone();
        }
        if let Some(enabled) = self.monitor {
            match config.monitoring.as_mut() {
                Some(monitoring) => monitoring.enabled = enabled,
                None => {
                    config.monitoring = Some(MonitoringConfig {
                        enabled,
                        log_level: None,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = CliArgs::parse_from([
            "wbrcu-bench",
            "--duration-ms",
            "25",
            "--max-threads",
            "2",
            "--implementations",
            "wbrcu,rwlock",
            "--scenarios",
            "read-scaling,rw-ratio",
            "--formats",
            "json",
            "--monitor",
            "true",
        ]);

        let config = args.load_config().unwrap();
        assert_eq!(config.bench.duration_ms, 25);
        assert_eq!(config.max_threads(), 2);
        assert_eq!(
            config.bench.implementations,
            vec![ProtectKind::Wbrcu, ProtectKind::Rwlock]
        );
        assert_eq!(
            config.bench.scenarios,
            vec![ScenarioKind::ReadScaling, ScenarioKind::RwRatio]
        );
        assert_eq!(config.output.formats, vec!["json".to_string()]);
        assert!(config.monitoring_enabled());
    }

    #[test]
    fn test_no_flags_keeps_defaults() {
        let args = CliArgs::parse_from(["wbrcu-bench"]);
        let config = args.load_config().unwrap();
        assert_eq!(config.bench.implementations, ProtectKind::ALL.to_vec());
        assert!(config.monitoring.is_none());
        assert!(!args.dry_run);
    }
}
