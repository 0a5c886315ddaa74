//! # Spectrum Module
//!
//! Frequency-domain summary of a recorded time series, used by the
//! diagnostic export to check that the bed actually vibrated at the
//! requested frequency.
//!
//! ## Steps
//! - Median removal (the recording may contain tap spikes)
//! - Hann windowing for reduced spectral leakage
//! - Forward FFT using RustFFT
//! - Peak bin of the magnitude spectrum, skipping DC

use rustfft::{FftPlanner, num_complex::Complex};

use crate::acquisition::{AxisSeries, median};

/// Applies a Hann window to the input buffer to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [f64]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f64;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Mean sample rate in Hz inferred from the timestamps.
pub fn sample_rate(time: &[f64]) -> Option<f64> {
    if time.len() < 2 {
        return None;
    }
    let span = time[time.len() - 1] - time[0];
    if span > 0.0 {
        Some((time.len() - 1) as f64 / span)
    } else {
        None
    }
}

/// Magnitude spectrum (up to Nyquist) of a signal.
pub fn magnitudes(signal: &[f64]) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let mut processed = signal.to_vec();
    if let Some(m) = median(&processed) {
        processed.iter_mut().for_each(|v| *v -= m);
    }
    apply_hann_window(&mut processed);

    let len = processed.len();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(len);
    let mut buffer: Vec<Complex<f64>> = processed
        .into_iter()
        .map(|sample| Complex { re: sample, im: 0.0 })
        .collect();
    fft.process(&mut buffer);

    buffer.iter().take(len / 2).map(|c| c.norm()).collect()
}

/// Dominant frequency in Hz of the Z axis of a recording.
///
/// # Returns
/// * `None` - fewer than 4 samples, or timestamps that do not advance
pub fn dominant_frequency(series: &AxisSeries) -> Option<f64> {
    if series.len() < 4 {
        return None;
    }
    let rate = sample_rate(&series.time)?;
    let spectrum = magnitudes(&series.z);
    let (peak_bin, _) = spectrum
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    Some(peak_bin as f64 * rate / series.z.len() as f64)
}
