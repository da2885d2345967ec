//! The cooperative processing loop.
//!
//! Each cycle checks connectivity, makes sure a token is held, waits for one
//! full batch, runs the signal pipeline and feeds the result to the display
//! and the analysis session. Failures are logged and counted; none of them
//! end the loop. Only the sample source going away does.

use crate::config::MonitorConfig;
use crate::controls::ControlEvent;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info};
use pulse_cloud::{AnalysisSession, Analyzer, ConnectivityManager, Link};
use pulse_lib::{
    buffer::{BufferClosed, SampleBuffer},
    detectors::ppg::{process_batch, PpgPipelineConfig},
    Display, MonitorError, NoiseReason,
};
use serde::Serialize;
use std::time::Duration;

const STOPPED_TEXT: &str = "Stopped\nPress rot push\nbutton to start";

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub pipeline: PpgPipelineConfig,
    pub submit_threshold: usize,
    pub start_enabled: bool,
    /// How long a stopped monitor waits for a control event per poll.
    pub idle_poll: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            pipeline: PpgPipelineConfig::default(),
            submit_threshold: pulse_cloud::session::DEFAULT_SUBMIT_THRESHOLD,
            start_enabled: true,
            idle_poll: Duration::from_millis(200),
        }
    }
}

impl MonitorSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            pipeline: config.pipeline(),
            submit_threshold: config.cloud.submit_threshold,
            start_enabled: config.controls.start_enabled,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    /// Batches drained and processed.
    pub cycles: usize,
    pub valid_readings: usize,
    /// Batches whose estimate was at or above the noise ceiling.
    pub noisy_readings: usize,
    /// Batches with fewer than two accepted peaks.
    pub empty_batches: usize,
    pub submissions: usize,
    pub failures: usize,
}

pub struct Monitor<L, A, D> {
    buffer: SampleBuffer,
    controls: Receiver<ControlEvent>,
    connectivity: ConnectivityManager<L>,
    session: AnalysisSession<A>,
    display: D,
    settings: MonitorSettings,
    running: bool,
    stopped_shown: bool,
    stats: MonitorStats,
}

impl<L, A, D> Monitor<L, A, D>
where
    L: Link,
    A: Analyzer,
    D: Display,
{
    pub fn new(
        buffer: SampleBuffer,
        controls: Receiver<ControlEvent>,
        connectivity: ConnectivityManager<L>,
        session: AnalysisSession<A>,
        display: D,
        settings: MonitorSettings,
    ) -> Self {
        let running = settings.start_enabled;
        Self {
            buffer,
            controls,
            connectivity,
            session,
            display,
            settings,
            running,
            stopped_shown: false,
            stats: MonitorStats::default(),
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn session(&self) -> &AnalysisSession<A> {
        &self.session
    }

    pub fn connectivity(&self) -> &ConnectivityManager<L> {
        &self.connectivity
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run until the sample source closes, or until `max_cycles` batches have
    /// been processed. A stopped monitor with no remaining control source
    /// also returns, since nothing could start it again.
    pub fn run(&mut self, max_cycles: Option<usize>) -> MonitorStats {
        loop {
            if max_cycles.map_or(false, |max| self.stats.cycles >= max) {
                debug!("cycle limit reached");
                break;
            }
            self.handle_controls();
            if !self.running {
                if !self.stopped_shown {
                    self.display.show_status(STOPPED_TEXT);
                    self.stopped_shown = true;
                }
                match self.controls.recv_timeout(self.settings.idle_poll) {
                    Ok(event) => self.apply(event),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        info!("controls closed while stopped");
                        break;
                    }
                }
                continue;
            }
            if let Err(BufferClosed) = self.run_cycle() {
                info!("sample source finished after {} cycles", self.stats.cycles);
                break;
            }
        }
        self.stats.clone()
    }

    fn handle_controls(&mut self) {
        while let Ok(event) = self.controls.try_recv() {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::TogglePower => {
                self.running = !self.running;
                if self.running {
                    let stale = self.buffer.discard_pending();
                    info!("processing started ({} stale samples discarded)", stale);
                    self.stopped_shown = false;
                } else {
                    info!("processing stopped");
                }
            }
            ControlEvent::ShowAnalysis => {
                if self.connectivity.is_connected() {
                    self.session.show_analysis(&mut self.display);
                } else {
                    debug!("analysis screen needs a connection");
                }
            }
        }
    }

    /// One pass of the loop. Only a closed sample source is an error here.
    pub fn run_cycle(&mut self) -> Result<(), BufferClosed> {
        if self.connectivity.check(&mut self.display).is_err() {
            self.stats.failures += 1;
        }
        let connected = self.connectivity.is_connected();
        if self.session.acquire_token(connected, &mut self.display).is_err() {
            self.stats.failures += 1;
        }

        let batch = self.buffer.drain_batch()?;
        self.stats.cycles += 1;
        let result = process_batch(&batch, &self.settings.pipeline);
        match result.reading() {
            Ok(bpm) => {
                self.stats.valid_readings += 1;
                debug!("cycle {}: {} bpm", self.stats.cycles, bpm);
                self.display.show_bpm(bpm);
                self.session.record_beat(bpm, connected);
            }
            Err(MonitorError::SensorNoise(NoiseReason::NoBeats)) => {
                self.stats.empty_batches += 1;
                debug!("cycle {}: no beats", self.stats.cycles);
            }
            Err(err) => {
                self.stats.noisy_readings += 1;
                debug!("cycle {}: {}", self.stats.cycles, err);
                self.display.show_bpm(0);
            }
        }

        match self.session.maybe_submit(
            self.settings.submit_threshold,
            connected,
            &mut self.display,
        ) {
            Ok(Some(_)) => self.stats.submissions += 1,
            Ok(None) => {}
            Err(_) => {
                self.stats.submissions += 1;
                self.stats.failures += 1;
            }
        }
        Ok(())
    }
}
