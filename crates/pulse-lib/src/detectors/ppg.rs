use crate::{
    error::{MonitorError, NoiseReason},
    signal::{
        Events, RawSample, SampleBatch, DEFAULT_NOISE_CEILING_BPM, DEFAULT_RATE_HZ,
        DEFAULT_WINDOW,
    },
};
use serde::{Deserialize, Serialize};

/// Configurable parameters for the pulse (PPG) beat detection pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PpgPipelineConfig {
    /// Sampling frequency of the raw batch (Hz).
    pub fs: f64,
    /// Moving average window length (samples).
    pub window: usize,
    /// Estimates at or above this value are reported as noise.
    pub noise_ceiling_bpm: u32,
}

impl Default for PpgPipelineConfig {
    fn default() -> Self {
        Self {
            fs: DEFAULT_RATE_HZ,
            window: DEFAULT_WINDOW,
            noise_ceiling_bpm: DEFAULT_NOISE_CEILING_BPM,
        }
    }
}

/// Outcome of one processing cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpgBatchResult {
    pub fs: f64,
    pub sample_count: usize,
    pub filtered_len: usize,
    pub threshold: Option<f64>,
    pub peaks: Events,
    pub intervals: Vec<usize>,
    /// Median-derived heart rate; `None` when fewer than two peaks were accepted.
    pub bpm: Option<u32>,
    pub noise_ceiling_bpm: u32,
}

impl PpgBatchResult {
    /// Validate the estimate for display and accumulation.
    pub fn reading(&self) -> Result<u32, MonitorError> {
        match self.bpm {
            None => Err(MonitorError::SensorNoise(NoiseReason::NoBeats)),
            Some(bpm) if bpm >= self.noise_ceiling_bpm => {
                Err(MonitorError::SensorNoise(NoiseReason::Implausible {
                    bpm,
                    ceiling: self.noise_ceiling_bpm,
                }))
            }
            Some(bpm) => Ok(bpm),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.reading().is_ok()
    }
}

/// Run filter, threshold, peak detection and median BPM over one batch.
///
/// Nothing carries over between calls.
pub fn process_batch(batch: &SampleBatch, cfg: &PpgPipelineConfig) -> PpgBatchResult {
    let filtered = moving_average(batch.samples(), cfg.window);
    let threshold = adaptive_threshold(&filtered);
    let peaks = match threshold {
        Some(threshold) => detect_peaks(&filtered, threshold),
        None => Events::default(),
    };
    let intervals = peaks.intervals();
    let bpm = bpm_from_intervals(&intervals, cfg.fs);
    PpgBatchResult {
        fs: cfg.fs,
        sample_count: batch.len(),
        filtered_len: filtered.len(),
        threshold,
        peaks,
        intervals,
        bpm,
        noise_ceiling_bpm: cfg.noise_ceiling_bpm,
    }
}

/// Trailing-window mean without padding: `len - (win - 1)` outputs.
pub fn moving_average(data: &[RawSample], win: usize) -> Vec<f64> {
    let win = win.max(1);
    if data.len() < win {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(data.len() - (win - 1));
    let mut acc: u64 = data[..win].iter().map(|&s| s as u64).sum();
    out.push(acc as f64 / win as f64);
    for i in win..data.len() {
        acc += data[i] as u64;
        acc -= data[i - win] as u64;
        out.push(acc as f64 / win as f64);
    }
    out
}

/// Three quarters of the way from the minimum to the maximum.
pub fn adaptive_threshold(filtered: &[f64]) -> Option<f64> {
    let (lo, hi) = filtered
        .iter()
        .fold(None, |acc: Option<(f64, f64)>, &x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        })?;
    let mid = (lo + hi) / 2.0;
    Some((mid + hi) / 2.0)
}

/// Single left-to-right pass accepting one peak per excursion above `threshold`.
///
/// While above the threshold and not yet falling, the current index is the
/// candidate. The candidate is accepted once the signal drops below the
/// threshold again.
pub fn detect_peaks(filtered: &[f64], threshold: f64) -> Events {
    let mut candidate: Option<usize> = None;
    let mut accepted = Vec::new();
    for i in 0..filtered.len().saturating_sub(1) {
        let value = filtered[i];
        if value > threshold && value <= filtered[i + 1] {
            candidate = Some(i);
        } else if value < threshold {
            if let Some(idx) = candidate.take() {
                accepted.push(idx);
            }
        }
    }
    Events::from_indices(accepted)
}

/// `floor(60 / (median * sample_period))`, or `None` for an empty list.
pub fn bpm_from_intervals(intervals: &[usize], fs: f64) -> Option<u32> {
    let median = median(intervals)?;
    if median <= 0.0 {
        return None;
    }
    Some((60.0 * fs / median).floor() as u32)
}

fn median(values: &[usize]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}
