//! User controls delivered to the processing loop as messages.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;
use std::io::BufRead;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const CONTROL_QUEUE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Start or stop processing.
    TogglePower,
    /// Show the stress/recovery screen.
    ShowAnalysis,
}

/// Suppresses repeats closer together than `min_interval`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) <= self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Event source side: the equivalent of the button/knob interrupt handlers.
pub struct ControlPanel {
    tx: Sender<ControlEvent>,
    power_debounce: Debouncer,
}

pub fn control_channel(debounce: Duration) -> (ControlPanel, Receiver<ControlEvent>) {
    let (tx, rx) = bounded(CONTROL_QUEUE);
    let panel = ControlPanel {
        tx,
        power_debounce: Debouncer::new(debounce),
    };
    (panel, rx)
}

impl ControlPanel {
    pub fn press_power(&mut self) -> bool {
        self.press_power_at(Instant::now())
    }

    /// Returns whether the press was delivered (not bounced, queue not full).
    pub fn press_power_at(&mut self, now: Instant) -> bool {
        if !self.power_debounce.accept(now) {
            debug!("power press ignored (bounce)");
            return false;
        }
        self.tx.try_send(ControlEvent::TogglePower).is_ok()
    }

    pub fn turn_knob(&self) -> bool {
        self.tx.try_send(ControlEvent::ShowAnalysis).is_ok()
    }
}

/// Map a typed command to a control action.
pub fn parse_command(line: &str) -> Option<ControlEvent> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "power" => Some(ControlEvent::TogglePower),
        "a" | "analysis" => Some(ControlEvent::ShowAnalysis),
        _ => None,
    }
}

/// Feed line-oriented commands (e.g. stdin) into the panel until EOF.
pub fn spawn_line_controls<R>(reader: R, mut panel: ControlPanel) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(ControlEvent::TogglePower) => {
                    panel.press_power();
                }
                Some(ControlEvent::ShowAnalysis) => {
                    panel.turn_knob();
                }
                None => debug!("unknown control command '{}'", line.trim()),
            }
        }
    })
}
