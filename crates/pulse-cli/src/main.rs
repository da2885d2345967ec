use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use csv::WriterBuilder;
use env_logger::Env;
use log::{info, warn};
use plotters::prelude::*;
use pulse_cloud::{AnalysisSession, ConnectivityManager, KubiosClient, TcpProbeLink};
use pulse_lib::{
    buffer::sample_buffer,
    detectors::ppg::{moving_average, process_batch, PpgBatchResult, PpgPipelineConfig},
    io::text as text_io,
    metrics::stress::Classification,
    RawSample, SampleBatch,
};
use pulse_run::{
    control_channel, read_config, spawn_line_controls, ConsoleDisplay, Monitor, MonitorConfig,
    MonitorSettings, Pacing, ReplaySource, SampleSource, Sampler, SyntheticPulse,
};
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(name = "pulse", version, about = "Pulse monitor and PPG batch tools")]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live monitor loop against a synthetic or recorded source
    Monitor {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Replay newline-delimited samples instead of the synthetic pulse
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 72.0)]
        simulate_bpm: f64,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Skip networking and start in offline mode
        #[arg(long)]
        offline: bool,
        #[arg(long)]
        max_cycles: Option<usize>,
        /// Produce samples as fast as they are consumed, without drops
        #[arg(long)]
        unpaced: bool,
        #[arg(long)]
        start_stopped: bool,
        /// Read control commands from stdin ("p" power, "a" analysis)
        #[arg(long)]
        controls: bool,
    },
    /// Estimate BPM for each full batch of newline-delimited samples (stdin or --input)
    Bpm {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 250.0)]
        fs: f64,
        #[arg(long, default_value_t = 750)]
        batch_size: usize,
        #[arg(long, default_value_t = 20)]
        window: usize,
        #[arg(long, default_value_t = 300)]
        noise_ceiling: u32,
        /// Also write a per-batch TSV report
        #[arg(long)]
        tsv: Option<PathBuf>,
    },
    /// Classify stress and recovery from SNS/PNS indices
    Classify {
        #[arg(long, allow_negative_numbers = true)]
        sns: f64,
        #[arg(long, allow_negative_numbers = true)]
        pns: f64,
    },
    /// Render one batch's filtered waveform, threshold and peaks to a PNG
    PlotBatch {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        batch_index: usize,
        #[arg(long, default_value_t = 250.0)]
        fs: f64,
        #[arg(long, default_value_t = 750)]
        batch_size: usize,
        #[arg(long, default_value_t = 20)]
        window: usize,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Monitor {
            config,
            input,
            simulate_bpm,
            seed,
            offline,
            max_cycles,
            unpaced,
            start_stopped,
            controls,
        } => {
            let opts = MonitorOptions {
                input,
                simulate_bpm,
                seed,
                offline,
                max_cycles,
                unpaced,
                start_stopped,
                controls,
            };
            cmd_monitor(config.as_deref(), opts)?
        }
        Commands::Bpm {
            input,
            fs,
            batch_size,
            window,
            noise_ceiling,
            tsv,
        } => {
            let cfg = PpgPipelineConfig {
                fs,
                window,
                noise_ceiling_bpm: noise_ceiling,
            };
            cmd_bpm(input.as_deref(), batch_size, &cfg, tsv.as_deref())?
        }
        Commands::Classify { sns, pns } => cmd_classify(sns, pns)?,
        Commands::PlotBatch {
            input,
            batch_index,
            fs,
            batch_size,
            window,
            out,
        } => {
            let cfg = PpgPipelineConfig {
                fs,
                window,
                ..PpgPipelineConfig::default()
            };
            cmd_plot_batch(input.as_deref(), batch_index, batch_size, &cfg, &out)?
        }
    }
    Ok(())
}

struct MonitorOptions {
    input: Option<PathBuf>,
    simulate_bpm: f64,
    seed: u64,
    offline: bool,
    max_cycles: Option<usize>,
    unpaced: bool,
    start_stopped: bool,
    controls: bool,
}

fn cmd_monitor(config_path: Option<&Path>, opts: MonitorOptions) -> Result<()> {
    let mut config = match config_path {
        Some(path) => read_config(path)?,
        None => MonitorConfig::default(),
    };
    config.apply_env();
    if opts.offline {
        config.network.enabled = false;
    }
    if opts.start_stopped {
        config.controls.start_enabled = false;
    }

    let source: Box<dyn SampleSource> = match &opts.input {
        Some(path) => {
            let replay = ReplaySource::from_file(path)?;
            info!("replaying {} samples from {}", replay.len(), path.display());
            Box::new(replay)
        }
        None => Box::new(SyntheticPulse::new(
            config.acquisition.rate_hz,
            opts.simulate_bpm,
            opts.seed,
        )),
    };
    let pacing = if opts.unpaced {
        Pacing::Unpaced
    } else {
        Pacing::Fixed {
            rate_hz: config.acquisition.rate_hz,
        }
    };

    let (producer, buffer) = sample_buffer(config.acquisition.batch_size);
    let sampler = Sampler::spawn(source, producer, pacing);

    let (panel, controls) = control_channel(config.debounce());
    if opts.controls {
        spawn_line_controls(BufReader::new(io::stdin()), panel);
    } else {
        drop(panel);
    }

    let link = TcpProbeLink::new(config.network.probe_addr.clone(), config.probe_timeout());
    let connectivity = if config.network.enabled {
        if let Some(ssid) = &config.network.ssid {
            info!("network '{}' via probe {}", ssid, config.network.probe_addr);
        }
        ConnectivityManager::new(link, config.retry_policy())
    } else {
        info!("networking disabled; running offline");
        ConnectivityManager::disabled(link)
    };
    let session = AnalysisSession::new(KubiosClient::new(config.cloud_settings()));

    let mut monitor = Monitor::new(
        buffer,
        controls,
        connectivity,
        session,
        ConsoleDisplay::stdout(),
        MonitorSettings::from_config(&config),
    );
    let stats = monitor.run(opts.max_cycles);
    drop(monitor);
    let produced = sampler.stop();
    info!("monitor finished: {} samples produced", produced);
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<RawSample>> {
    match input {
        Some(path) => text_io::read_sample_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_sample_series(&buf)
        }
    }
}

/// Full batches only; a trailing partial batch is reported and skipped.
fn split_batches(samples: &[RawSample], batch_size: usize) -> Result<Vec<SampleBatch>> {
    if batch_size <= 1 {
        bail!("batch size must be greater than 1");
    }
    let chunks = samples.chunks_exact(batch_size);
    let rest = chunks.remainder().len();
    if rest > 0 {
        warn!("ignoring {} trailing samples (partial batch)", rest);
    }
    Ok(chunks.map(|chunk| SampleBatch::new(chunk.to_vec())).collect())
}

#[derive(Serialize)]
struct BatchReport {
    batch: usize,
    valid: bool,
    #[serde(flatten)]
    result: PpgBatchResult,
}

fn cmd_bpm(
    input: Option<&Path>,
    batch_size: usize,
    cfg: &PpgPipelineConfig,
    tsv: Option<&Path>,
) -> Result<()> {
    let samples = read_samples(input)?;
    let batches = split_batches(&samples, batch_size)?;
    if batches.is_empty() {
        bail!(
            "need at least {} samples for one batch, got {}",
            batch_size,
            samples.len()
        );
    }
    let reports: Vec<BatchReport> = batches
        .iter()
        .enumerate()
        .map(|(batch, samples)| {
            let result = process_batch(samples, cfg);
            BatchReport {
                batch,
                valid: result.is_valid(),
                result,
            }
        })
        .collect();
    for report in &reports {
        println!("{}", serde_json::to_string(report)?);
    }
    if let Some(path) = tsv {
        write_bpm_tsv(path, &reports)?;
    }
    Ok(())
}

fn write_bpm_tsv(path: &Path, reports: &[BatchReport]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(file);
    writer.write_record(["batch", "bpm", "valid", "peaks", "threshold"])?;
    for report in reports {
        writer.write_record([
            report.batch.to_string(),
            report
                .result
                .bpm
                .map(|bpm| bpm.to_string())
                .unwrap_or_else(|| "n/a".into()),
            report.valid.to_string(),
            report.result.peaks.indices.len().to_string(),
            report
                .result
                .threshold
                .map(|t| format!("{:.2}", t))
                .unwrap_or_else(|| "n/a".into()),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn cmd_classify(sns: f64, pns: f64) -> Result<()> {
    let classification = Classification::from_indices(sns, pns);
    println!("{}", serde_json::to_string(&classification)?);
    Ok(())
}

fn cmd_plot_batch(
    input: Option<&Path>,
    batch_index: usize,
    batch_size: usize,
    cfg: &PpgPipelineConfig,
    out: &Path,
) -> Result<()> {
    let samples = read_samples(input)?;
    let batches = split_batches(&samples, batch_size)?;
    let Some(batch) = batches.get(batch_index) else {
        bail!(
            "batch {} requested but input holds {} full batches",
            batch_index,
            batches.len()
        );
    };
    let result = process_batch(batch, cfg);
    let filtered = moving_average(batch.samples(), cfg.window);
    let title = match result.bpm {
        Some(bpm) => format!("Batch {} ({} BPM)", batch_index, bpm),
        None => format!("Batch {} (no beats)", batch_index),
    };
    draw_batch_plot(out, &filtered, &result, &title)
}

fn draw_batch_plot(
    path: &Path,
    filtered: &[f64],
    result: &PpgBatchResult,
    title: &str,
) -> Result<()> {
    let (y_min, y_max) = filtered
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !y_min.is_finite() {
        bail!("batch is shorter than the filter window");
    }
    let pad = ((y_max - y_min) * 0.05).max(1.0);
    let x_max = filtered.len() as f64;

    let backend = BitMapBackend::new(path, (800, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(title, ("sans-serif", 24))
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..x_max, (y_min - pad)..(y_max + pad))?;
    chart.configure_mesh().draw()?;
    chart.draw_series(LineSeries::new(
        filtered.iter().enumerate().map(|(i, &v)| (i as f64, v)),
        &BLUE,
    ))?;
    if let Some(threshold) = result.threshold {
        chart.draw_series(LineSeries::new(
            [(0.0, threshold), (x_max, threshold)],
            &RED,
        ))?;
    }
    chart.draw_series(result.peaks.indices.iter().filter_map(|&i| {
        filtered
            .get(i)
            .map(|&v| Circle::new((i as f64, v), 4, BLACK.filled()))
    }))?;
    root.present()?;
    Ok(())
}
