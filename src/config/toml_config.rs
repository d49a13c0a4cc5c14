use crate::core::{hardware_concurrency, RcuBuilder};
use crate::domain::model::{ProtectKind, ScenarioKind};
use crate::utils::error::{BenchError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const OUTPUT_FORMATS: [&str; 2] = ["csv", "json"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    pub bench: BenchSection,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub rcu: RcuConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchSection {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Defaults to the hardware concurrency.
    pub max_threads: Option<usize>,
    /// Explicit thread counts. Defaults to powers of two up to `max_threads`.
    pub thread_counts: Option<Vec<usize>>,
    #[serde(default = "default_implementations")]
    pub implementations: Vec<ProtectKind>,
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<ScenarioKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Busy-wait inside each read and write of the ratio and mixed scenarios.
    #[serde(default = "default_work_ns")]
    pub work_ns: u64,
    #[serde(default = "default_read_ratios")]
    pub read_ratios: Vec<u8>,
    #[serde(default = "default_data_sizes")]
    pub data_sizes: Vec<usize>,
    #[serde(default = "default_simulated_work_ns")]
    pub simulated_work_ns: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RcuConfig {
    pub cleanup_threshold: Option<usize>,
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
}

fn default_duration_ms() -> u64 {
    1000
}

fn default_implementations() -> Vec<ProtectKind> {
    ProtectKind::ALL.to_vec()
}

fn default_scenarios() -> Vec<ScenarioKind> {
    ScenarioKind::ALL.to_vec()
}

fn default_work_ns() -> u64 {
    100
}

fn default_read_ratios() -> Vec<u8> {
    vec![80, 90, 60, 40, 20, 10]
}

fn default_data_sizes() -> Vec<usize> {
    vec![2, 8, 16, 64, 256, 1024, 4096, 16384, 65536]
}

fn default_simulated_work_ns() -> Vec<u64> {
    vec![10, 100, 1000, 10000]
}

fn default_output_path() -> String {
    "./bench-output".to_string()
}

fn default_formats() -> Vec<String> {
    OUTPUT_FORMATS.iter().map(|f| f.to_string()).collect()
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            work_ns: default_work_ns(),
            read_ratios: default_read_ratios(),
            data_sizes: default_data_sizes(),
            simulated_work_ns: default_simulated_work_ns(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            formats: default_formats(),
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            bench: BenchSection {
                name: "wbrcu".to_string(),
                description: "Writer-biased RCU against lock-based cells".to_string(),
                duration_ms: default_duration_ms(),
                max_threads: None,
                thread_counts: None,
                implementations: default_implementations(),
                scenarios: default_scenarios(),
            },
            workload: WorkloadConfig::default(),
            rcu: RcuConfig::default(),
            output: OutputConfig::default(),
            monitoring: None,
        }
    }
}

impl RcuConfig {
    pub fn builder(&self) -> RcuBuilder {
        let mut builder = RcuBuilder::default();
        if let Some(threshold) = self.cleanup_threshold {
            builder = builder.cleanup_threshold(threshold);
        }
        if let Some(capacity) = self.queue_capacity {
            builder = builder.queue_capacity(capacity);
        }
        builder
    }
}

impl BenchConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(BenchError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| BenchError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. Unset variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| BenchError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("bench.name", &self.bench.name)?;
        validation::validate_range("bench.duration_ms", self.bench.duration_ms, 1, 3_600_000)?;

        if let Some(max_threads) = self.bench.max_threads {
            validation::validate_positive_number("bench.max_threads", max_threads, 1)?;
        }
        if let Some(counts) = &self.bench.thread_counts {
            validation::validate_non_empty("bench.thread_counts", counts)?;
            for &count in counts {
                validation::validate_positive_number("bench.thread_counts", count, 1)?;
            }
        }

        validation::validate_non_empty("bench.implementations", &self.bench.implementations)?;
        validation::validate_non_empty("bench.scenarios", &self.bench.scenarios)?;

        for &ratio in &self.workload.read_ratios {
            validation::validate_range("workload.read_ratios", ratio, 0, 100)?;
        }
        for &size in &self.workload.data_sizes {
            validation::validate_power_of_two("workload.data_sizes", size)?;
        }

        if let Some(threshold) = self.rcu.cleanup_threshold {
            validation::validate_positive_number("rcu.cleanup_threshold", threshold, 1)?;
        }
        if let Some(capacity) = self.rcu.queue_capacity {
            validation::validate_positive_number("rcu.queue_capacity", capacity, 1)?;
        }

        validation::validate_path("output.path", &self.output.path)?;
        validation::validate_non_empty("output.formats", &self.output.formats)?;
        for format in &self.output.formats {
            validation::validate_one_of("output.formats", format, &OUTPUT_FORMATS)?;
        }

        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.bench.duration_ms)
    }

    pub fn max_threads(&self) -> usize {
        self.bench.max_threads.unwrap_or_else(hardware_concurrency)
    }

    /// Thread counts to sweep, starting at `min`.
    ///
    /// Without explicit counts this is every power of two from `min` up to
    /// `max_threads`, plus `max_threads` itself.
    pub fn thread_counts(&self, min: usize) -> Vec<usize> {
        let max = self.max_threads().max(min);

        if let Some(counts) = &self.bench.thread_counts {
            let mut counts: Vec<usize> = counts.iter().copied().filter(|&c| c >= min).collect();
            counts.sort_unstable();
            counts.dedup();
            return counts;
        }

        let mut counts = Vec::new();
        let mut n = min.max(1);
        while n < max {
            counts.push(n);
            n *= 2;
        }
        counts.push(max);
        counts
    }

    pub fn output_path(&self) -> &str {
        &self.output.path
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn wants_format(&self, format: &str) -> bool {
        self.output.formats.iter().any(|f| f == format)
    }
}

impl Validate for BenchConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config = BenchConfig::from_toml_str(
            r#"
[bench]
name = "minimal"
"#,
        )
        .unwrap();

        assert_eq!(config.bench.name, "minimal");
        assert_eq!(config.duration(), Duration::from_millis(1000));
        assert_eq!(config.bench.implementations.len(), 4);
        assert_eq!(config.bench.scenarios.len(), 7);
        assert_eq!(config.workload.read_ratios, vec![80, 90, 60, 40, 20, 10]);
        assert!(config.wants_format("csv"));
        assert!(!config.monitoring_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = BenchConfig::from_toml_str(
            r#"
[bench]
name = "full"
description = "every knob"
duration_ms = 50
max_threads = 6
implementations = ["wbrcu", "mutex"]
scenarios = ["read-scaling", "data-size"]

[workload]
work_ns = 10
read_ratios = [50]
data_sizes = [4, 8]
simulated_work_ns = [10]

[rcu]
cleanup_threshold = 2
queue_capacity = 4

[output]
path = "./out"
formats = ["json"]

[monitoring]
enabled = true
"#,
        )
        .unwrap();

        assert_eq!(
            config.bench.implementations,
            vec![ProtectKind::Wbrcu, ProtectKind::Mutex]
        );
        assert_eq!(
            config.bench.scenarios,
            vec![ScenarioKind::ReadScaling, ScenarioKind::DataSize]
        );
        assert_eq!(config.max_threads(), 6);
        assert_eq!(config.thread_counts(1), vec![1, 2, 4, 6]);
        assert_eq!(config.thread_counts(2), vec![2, 4, 6]);
        assert_eq!(config.rcu.cleanup_threshold, Some(2));
        assert!(config.monitoring_enabled());
        assert!(!config.wants_format("csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_thread_counts_filtered_and_sorted() {
        let mut config = BenchConfig::default();
        config.bench.thread_counts = Some(vec![8, 1, 2, 2]);
        assert_eq!(config.thread_counts(1), vec![1, 2, 8]);
        assert_eq!(config.thread_counts(2), vec![2, 8]);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("WBRCU_TEST_OUTPUT_DIR", "/tmp/wbrcu-env");

        let config = BenchConfig::from_toml_str(
            r#"
[bench]
name = "env"

[output]
path = "${WBRCU_TEST_OUTPUT_DIR}"
"#,
        )
        .unwrap();
        assert_eq!(config.output_path(), "/tmp/wbrcu-env");

        std::env::remove_var("WBRCU_TEST_OUTPUT_DIR");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = BenchConfig::default();
        config.workload.data_sizes = vec![3];
        assert!(config.validate().is_err());

        let mut config = BenchConfig::default();
        config.output.formats = vec!["xml".to_string()];
        assert!(config.validate().is_err());

        let mut config = BenchConfig::default();
        config.bench.implementations.clear();
        assert!(matches!(
            config.validate(),
            Err(BenchError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_unknown_implementation_fails_to_parse() {
        let result = BenchConfig::from_toml_str(
            r#"
[bench]
name = "bad"
implementations = ["spinlock"]
"#,
        );
        assert!(matches!(
            result,
            Err(BenchError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[bench]\nname = \"file-test\"\nduration_ms = 20\n")
            .unwrap();

        let config = BenchConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.bench.name, "file-test");
        assert_eq!(config.bench.duration_ms, 20);
    }
}
