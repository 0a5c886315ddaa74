//! # Diagnostic Recorder
//!
//! Ordered log of every tested height. The recorder makes no decisions; it
//! only keeps what the run hands it so the result can be exported and
//! plotted afterwards.
//!
//! Recording is always present. With `keep_samples` off the per-height
//! summary is still logged but the raw time series are dropped.

use serde::{Deserialize, Serialize};

use crate::acquisition::{AxisSeries, Measurement};

/// Everything measured at one height. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    height: f64,
    rate_above_threshold: f64,
    sample_count: usize,
    duration: f64,
    series: AxisSeries,
}

impl TestRecord {
    pub fn new(height: f64, measurement: Measurement) -> Self {
        Self {
            height,
            rate_above_threshold: measurement.rate_above_threshold,
            sample_count: measurement.series.len(),
            duration: measurement.series.duration(),
            series: measurement.series,
        }
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn rate_above_threshold(&self) -> f64 {
        self.rate_above_threshold
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Seconds between the first and last sample of the session.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Median-subtracted samples; empty when raw samples were not kept.
    pub fn series(&self) -> &AxisSeries {
        &self.series
    }

    fn without_samples(mut self) -> Self {
        self.series = AxisSeries::default();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticRecorder {
    keep_samples: bool,
    records: Vec<TestRecord>,
}

impl DiagnosticRecorder {
    pub fn new(keep_samples: bool) -> Self {
        Self {
            keep_samples,
            records: Vec::new(),
        }
    }

    pub fn keeps_samples(&self) -> bool {
        self.keep_samples
    }

    pub fn record(&mut self, height: f64, measurement: Measurement) {
        let record = TestRecord::new(height, measurement);
        self.records.push(if self.keep_samples {
            record
        } else {
            record.without_samples()
        });
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<TestRecord> {
        self.records
    }
}
