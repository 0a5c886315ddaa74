//! # Diagnostic Export
//!
//! Writes a finished (or aborted) run to disk: every retained sample as CSV,
//! and a JSON summary with the rate above threshold and the dominant
//! vibration frequency of each tested height.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zprobe_core::recorder::TestRecord;
use zprobe_core::run::RunOutcome;
use zprobe_core::spectrum;

/// Per-height line of the JSON summary.
#[derive(Debug, Serialize)]
pub struct HeightSummary {
    pub height: f64,
    pub rate_above_threshold: f64,
    pub samples: usize,
    pub duration: f64,
    pub dominant_frequency: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// `None` when the run aborted on a fault.
    pub outcome: Option<RunOutcome>,
    pub fault: Option<String>,
    pub offset: Option<f64>,
    pub heights: Vec<HeightSummary>,
}

impl RunSummary {
    pub fn new(outcome: Option<RunOutcome>, fault: Option<String>, records: &[TestRecord]) -> Self {
        let offset = match outcome {
            Some(RunOutcome::Converged { offset }) => Some(offset),
            _ => None,
        };
        let heights = records
            .iter()
            .map(|r| HeightSummary {
                height: r.height(),
                rate_above_threshold: r.rate_above_threshold(),
                samples: r.sample_count(),
                duration: r.duration(),
                dominant_frequency: spectrum::dominant_frequency(r.series()),
            })
            .collect();
        Self {
            outcome,
            fault,
            offset,
            heights,
        }
    }
}

/// Output paths for one export, stamped with the current time.
pub struct ExportPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
}

impl ExportPaths {
    pub fn stamped(out_dir: &Path) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self {
            csv: out_dir.join(format!("tap_summary_{ts:.6}.csv")),
            json: out_dir.join(format!("tap_summary_{ts:.6}.json")),
        }
    }
}

/// Writes `#time,accel_x,accel_y,accel_z,z_height`, one row per retained sample.
pub fn write_samples_csv(path: &Path, records: &[TestRecord]) -> Result<usize> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["#time", "accel_x", "accel_y", "accel_z", "z_height"])?;

    let mut rows = 0;
    for record in records {
        let s = record.series();
        let height = format!("{:.6}", record.height());
        for i in 0..s.len() {
            writer.write_record([
                format!("{:.6}", s.time[i]),
                format!("{:.6}", s.x[i]),
                format!("{:.6}", s.y[i]),
                format!("{:.6}", s.z[i]),
                height.clone(),
            ])?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
