use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum ProtectKind {
    Wbrcu,
    Arc,
    Rwlock,
    Mutex,
}

impl ProtectKind {
    pub const ALL: [ProtectKind; 4] = [
        ProtectKind::Wbrcu,
        ProtectKind::Arc,
        ProtectKind::Rwlock,
        ProtectKind::Mutex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectKind::Wbrcu => "wbrcu",
            ProtectKind::Arc => "arc",
            ProtectKind::Rwlock => "rwlock",
            ProtectKind::Mutex => "mutex",
        }
    }
}

impl fmt::Display for ProtectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Every thread reads.
    ReadScaling,
    /// Every thread increments a shared counter.
    WriteScaling,
    /// Threads split between readers and writers by a fixed percentage.
    RwRatio,
    /// Measured readers against background writers.
    MixedRead,
    /// Measured writers against background readers.
    MixedWrite,
    /// Writers touching one slot of a growing payload.
    DataSize,
    /// Readers holding the guard across a busy wait.
    SimulatedWork,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 7] = [
        ScenarioKind::ReadScaling,
        ScenarioKind::WriteScaling,
        ScenarioKind::RwRatio,
        ScenarioKind::MixedRead,
        ScenarioKind::MixedWrite,
        ScenarioKind::DataSize,
        ScenarioKind::SimulatedWork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::ReadScaling => "read-scaling",
            ScenarioKind::WriteScaling => "write-scaling",
            ScenarioKind::RwRatio => "rw-ratio",
            ScenarioKind::MixedRead => "mixed-read",
            ScenarioKind::MixedWrite => "mixed-write",
            ScenarioKind::DataSize => "data-size",
            ScenarioKind::SimulatedWork => "simulated-work",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw counts from one measured run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurement {
    pub reads: u64,
    pub writes: u64,
    pub elapsed: Duration,
}

impl Measurement {
    pub fn total_ops(&self) -> u64 {
        self.reads + self.writes
    }

    pub fn ops_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_ops() as f64 / secs
        } else {
            0.0
        }
    }
}

/// One row of the report. Flat so it serializes to CSV as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchResult {
    pub scenario: ScenarioKind,
    pub implementation: ProtectKind,
    pub threads: usize,
    pub readers: usize,
    pub writers: usize,
    /// Scenario-specific knob: read percentage, payload size or work in ns.
    pub parameter: Option<u64>,
    pub total_ops: u64,
    pub reads: u64,
    pub writes: u64,
    pub elapsed_secs: f64,
    pub ops_per_sec: f64,
}

impl BenchResult {
    pub fn new(
        scenario: ScenarioKind,
        implementation: ProtectKind,
        readers: usize,
        writers: usize,
        parameter: Option<u64>,
        measurement: Measurement,
    ) -> Self {
        Self {
            scenario,
            implementation,
            threads: readers + writers,
            readers,
            writers,
            parameter,
            total_ops: measurement.total_ops(),
            reads: measurement.reads,
            writes: measurement.writes,
            elapsed_secs: measurement.elapsed.as_secs_f64(),
            ops_per_sec: measurement.ops_per_sec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub hardware_concurrency: usize,
    pub peak_memory_mb: Option<u64>,
    pub results: Vec<BenchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops_per_sec() {
        let m = Measurement {
            reads: 900,
            writes: 100,
            elapsed: Duration::from_millis(500),
        };
        assert_eq!(m.total_ops(), 1000);
        assert!((m.ops_per_sec() - 2000.0).abs() < f64::EPSILON);
        assert_eq!(Measurement::default().ops_per_sec(), 0.0);
    }

    #[test]
    fn test_kinds_serialize_kebab_case() {
        let json = serde_json::to_string(&ScenarioKind::SimulatedWork).unwrap();
        assert_eq!(json, "\"simulated-work\"");
        let kind: ProtectKind = serde_json::from_str("\"rwlock\"").unwrap();
        assert_eq!(kind, ProtectKind::Rwlock);
        for kind in ScenarioKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }
}
