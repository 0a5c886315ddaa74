//! # zprobe - Resonance Z Probe Calibration
//!
//! Runs one Z offset calibration against the simulated bed and reports the
//! result, exporting the diagnostic record when sample recording is enabled.
//!
//! ## Flow
//! - **Config**: JSON file validated by `zprobe-core`
//! - **Collaborators**: motion and accelerometer halves of a `SimulatedBed`
//! - **Reports**: per-height console lines through the `log` facade
//! - **Export**: CSV of raw samples plus a JSON summary

mod export;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use zprobe_core::config::ProbeConfig;
use zprobe_core::run::{CalibrationRun, RunSettings};
use zprobe_core::sim::{DEFAULT_NOISE, DEFAULT_SAMPLE_RATE, DEFAULT_TAP_AMPLITUDE, SimulatedBed};
use zprobe_core::sink::LogSink;

use export::{ExportPaths, RunSummary};

#[derive(Debug, Parser)]
#[command(name = "zprobe", about = "Find the Z offset by resonance tap detection")]
struct Args {
    /// Probe configuration (JSON)
    config: PathBuf,

    /// Directory for the diagnostic CSV and JSON summary
    #[arg(long, default_value = "/tmp")]
    out: PathBuf,

    /// Height of the simulated bed surface
    #[arg(long, default_value_t = 0.995)]
    surface_z: f64,

    /// Seed for the simulated accelerometer noise
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Simulated accelerometer sample rate in Hz
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: f64,

    /// Standard deviation of the simulated noise, mm/s²
    #[arg(long, default_value_t = DEFAULT_NOISE)]
    noise: f64,

    /// Peak acceleration of a simulated tap, mm/s²
    #[arg(long, default_value_t = DEFAULT_TAP_AMPLITUDE)]
    tap_amplitude: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ProbeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!("[MAIN] loaded {}", args.config.display());

    let bed = SimulatedBed::new(args.surface_z, args.seed)
        .with_sample_rate(args.sample_rate)
        .with_noise(args.noise)
        .with_tap_amplitude(args.tap_amplitude);
    info!("[MAIN] simulated bed surface at z={:.4}", bed.surface_z());

    let mut run = CalibrationRun::new(
        RunSettings::from_config(&config),
        bed.motion(),
        bed.accelerometer(),
        LogSink,
    );

    let (summary, records, failure) = match run.run() {
        Ok(result) => {
            match result.offset() {
                Some(offset) => println!("{offset:.6}"),
                None => info!("[MAIN] no offset: {:?}", result.outcome),
            }
            let summary = RunSummary::new(Some(result.outcome), None, &result.records);
            (summary, result.records, None)
        }
        Err(err) => {
            error!("[MAIN] {}", err);
            let summary = RunSummary::new(None, Some(err.fault.to_string()), &err.records);
            (summary, err.records, Some(err.fault))
        }
    };

    if config.record_samples {
        std::fs::create_dir_all(&args.out)
            .with_context(|| format!("creating {}", args.out.display()))?;
        let paths = ExportPaths::stamped(&args.out);
        let rows = export::write_samples_csv(&paths.csv, &records)?;
        info!("[MAIN] writing data to {} ({} rows)", paths.csv.display(), rows);
        export::write_summary_json(&paths.json, &summary)?;
        info!("[MAIN] writing summary to {}", paths.json.display());
    }

    if let Some(fault) = failure {
        bail!("calibration aborted: {fault}");
    }
    Ok(())
}
