use crate::metrics::stress::Classification;

/// Output surface of the monitor (screen, console, log).
///
/// Rendering is owned by the implementation; callers only hand over values
/// and short status messages.
pub trait Display {
    fn show_bpm(&mut self, bpm: u32);
    fn show_status(&mut self, text: &str);
    fn show_classification(&mut self, classification: &Classification);
}
