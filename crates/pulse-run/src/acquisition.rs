//! Periodic sample producer and the sources it can read from.

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::{debug, info};
use pulse_lib::{buffer::SampleProducer, io::text as text_io, RawSample};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::Path;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const REPLAY_WAIT: Duration = Duration::from_millis(50);

/// Something that yields one ADC reading per tick.
pub trait SampleSource: Send {
    /// `None` once the source is exhausted.
    fn next_sample(&mut self) -> Option<RawSample>;
}

/// Pulse-shaped test signal: one Gaussian bump per beat plus uniform noise.
pub struct SyntheticPulse {
    fs: f64,
    bpm: f64,
    baseline: f64,
    amplitude: f64,
    noise: f64,
    rng: StdRng,
    tick: u64,
}

impl SyntheticPulse {
    pub fn new(fs: f64, bpm: f64, seed: u64) -> Self {
        Self {
            fs,
            bpm,
            baseline: 30_000.0,
            amplitude: 12_000.0,
            noise: 150.0,
            rng: StdRng::seed_from_u64(seed),
            tick: 0,
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.max(0.0);
        self
    }
}

impl SampleSource for SyntheticPulse {
    fn next_sample(&mut self) -> Option<RawSample> {
        let t = self.tick as f64 / self.fs;
        self.tick += 1;
        let phase = (t * self.bpm / 60.0).fract();
        let bump = (-0.5 * ((phase - 0.3) / 0.08).powi(2)).exp();
        let jitter = if self.noise > 0.0 {
            self.rng.gen_range(-self.noise..=self.noise)
        } else {
            0.0
        };
        let value = self.baseline + self.amplitude * bump + jitter;
        Some(value.clamp(0.0, RawSample::MAX as f64) as RawSample)
    }
}

/// Plays back a recorded sample series once.
pub struct ReplaySource {
    samples: Vec<RawSample>,
    pos: usize,
}

impl ReplaySource {
    pub fn new(samples: Vec<RawSample>) -> Self {
        Self { samples, pos: 0 }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(text_io::read_sample_series(path)?))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SampleSource for ReplaySource {
    fn next_sample(&mut self) -> Option<RawSample> {
        let sample = self.samples.get(self.pos).copied();
        self.pos += 1;
        sample
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Timer-driven: one sample per period, dropped if the buffer is full.
    Fixed { rate_hz: f64 },
    /// As fast as the consumer drains; nothing is dropped.
    Unpaced,
}

/// Handle to the running producer thread.
pub struct Sampler {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<u64>>,
}

impl Sampler {
    /// Start producing into `producer`. The thread ends when the source is
    /// exhausted, the consumer is gone, or [`stop`](Self::stop) is called.
    pub fn spawn(
        mut source: Box<dyn SampleSource>,
        producer: SampleProducer,
        pacing: Pacing,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        let handle = std::thread::spawn(move || match pacing {
            Pacing::Fixed { rate_hz } => run_fixed(source.as_mut(), &producer, rate_hz, &stop_rx),
            Pacing::Unpaced => run_unpaced(source.as_mut(), &producer, &stop_rx),
        });
        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the thread and return how many samples it produced.
    pub fn stop(mut self) -> u64 {
        let _ = self.stop_tx.send(());
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(0)
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

fn run_fixed(
    source: &mut dyn SampleSource,
    producer: &SampleProducer,
    rate_hz: f64,
    stop_rx: &Receiver<()>,
) -> u64 {
    let period = Duration::from_secs_f64(1.0 / rate_hz.max(1.0));
    let mut produced = 0u64;
    let mut next = Instant::now();
    info!("sampling at {} Hz", rate_hz);
    while !stop_requested(stop_rx) {
        let Some(sample) = source.next_sample() else {
            break;
        };
        producer.enqueue(sample);
        produced += 1;
        next += period;
        let now = Instant::now();
        if next > now {
            std::thread::sleep(next - now);
        } else if now - next > Duration::from_secs(1) {
            debug!("sampler fell behind by {:?}, resynchronising", now - next);
            next = now;
        }
    }
    produced
}

fn run_unpaced(
    source: &mut dyn SampleSource,
    producer: &SampleProducer,
    stop_rx: &Receiver<()>,
) -> u64 {
    let mut produced = 0u64;
    while let Some(sample) = source.next_sample() {
        loop {
            if stop_requested(stop_rx) {
                return produced;
            }
            match producer.enqueue_wait(sample, REPLAY_WAIT) {
                Ok(true) => break,
                Ok(false) => continue,
                Err(_) => return produced,
            }
        }
        produced += 1;
    }
    debug!("source exhausted after {} samples", produced);
    produced
}
