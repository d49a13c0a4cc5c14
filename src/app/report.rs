use crate::domain::model::{BenchReport, BenchResult};
use crate::utils::error::{BenchError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const CSV_FILENAME: &str = "results.csv";
pub const JSON_FILENAME: &str = "results.json";

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        Ok(fs::read(full_path)?)
    }

    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<PathBuf> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&full_path, data)?;
        Ok(full_path)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// Writes a finished report in each requested format.
pub struct ReportWriter {
    storage: LocalStorage,
}

impl ReportWriter {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    pub fn write(&self, report: &BenchReport, formats: &[String]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(formats.len());

        for format in formats {
            let path = match format.as_str() {
                "csv" => self
                    .storage
                    .write_file(CSV_FILENAME, &to_csv(&report.results)?)?,
                "json" => self.storage.write_file(JSON_FILENAME, &to_json(report)?)?,
                other => {
                    return Err(BenchError::InvalidConfigValueError {
                        field: "output.formats".to_string(),
                        value: other.to_string(),
                        reason: "Unsupported report format".to_string(),
                    })
                }
            };
            tracing::info!("📁 Wrote {} report to {}", format, path.display());
            written.push(path);
        }

        Ok(written)
    }
}

pub fn to_csv(results: &[BenchResult]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for result in results {
        writer.serialize(result)?;
    }
    writer
        .into_inner()
        .map_err(|e| BenchError::IoError(std::io::Error::other(e.to_string())))
}

pub fn to_json(report: &BenchReport) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(report)?)
}
