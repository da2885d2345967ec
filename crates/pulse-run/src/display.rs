use log::debug;
use pulse_lib::{metrics::stress::Classification, Display};
use std::io::Write;

/// Line-oriented stand-in for the OLED screen.
pub struct ConsoleDisplay<W: Write> {
    out: W,
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(err) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            debug!("display write failed: {}", err);
        }
    }
}

impl ConsoleDisplay<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> Display for ConsoleDisplay<W> {
    fn show_bpm(&mut self, bpm: u32) {
        self.line(&format!("{} BPM", bpm));
    }

    fn show_status(&mut self, text: &str) {
        // Screen line breaks collapse to one console line.
        let joined = text.split('\n').collect::<Vec<_>>().join(" ");
        self.line(&joined);
    }

    fn show_classification(&mut self, classification: &Classification) {
        self.line(&format!(
            "Stress level: {} | Recovery level: {}",
            classification.stress, classification.recovery
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(f: impl FnOnce(&mut ConsoleDisplay<Vec<u8>>)) -> String {
        let mut display = ConsoleDisplay::new(Vec::new());
        f(&mut display);
        String::from_utf8(display.into_inner()).unwrap()
    }

    #[test]
    fn renders_each_screen_on_one_line() {
        let text = rendered(|d| {
            d.show_bpm(72);
            d.show_status("No connection\nContinuing in\noffline mode");
            d.show_classification(&Classification::from_indices(1.2, -1.0));
        });
        assert_eq!(
            text,
            "72 BPM\nNo connection Continuing in offline mode\n\
             Stress level: Average | Recovery level: Good\n"
        );
    }
}
