use serde::{Deserialize, Serialize};

/// One ADC reading from the pulse sensor.
pub type RawSample = u16;

/// Acquisition rate of the periodic producer (Hz).
pub const DEFAULT_RATE_HZ: f64 = 250.0;
/// Samples per processing cycle (3 s at 250 Hz).
pub const DEFAULT_BATCH_SIZE: usize = 750;
/// Moving average window width.
pub const DEFAULT_WINDOW: usize = 20;
/// Estimates at or above this are treated as sensor noise.
pub const DEFAULT_NOISE_CEILING_BPM: u32 = 300;

/// Ordered window of raw samples handed to the processor in one piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleBatch {
    samples: Vec<RawSample>,
}

impl SampleBatch {
    pub fn new(samples: Vec<RawSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[RawSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Accepted peak positions, as indices into the filtered sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    /// Sample-count distances between consecutive events.
    pub fn intervals(&self) -> Vec<usize> {
        self.indices.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// RR interval in milliseconds implied by a heart rate, rounded to the
/// nearest millisecond.
///
/// The device firmware truncated `bpm / 60 * 1000` instead; this uses the
/// physical interval `60000 / bpm`. Returns `None` for a zero rate, which has
/// no finite interval.
pub fn rr_interval_ms(bpm: u32) -> Option<u32> {
    if bpm == 0 {
        return None;
    }
    Some((60_000.0 / bpm as f64).round() as u32)
}
