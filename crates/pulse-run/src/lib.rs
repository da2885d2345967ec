pub mod acquisition;
pub mod config;
pub mod controls;
pub mod display;
pub mod monitor;

pub use acquisition::{Pacing, ReplaySource, SampleSource, Sampler, SyntheticPulse};
pub use config::{parse_config, read_config, MonitorConfig};
pub use controls::{control_channel, spawn_line_controls, ControlEvent, ControlPanel};
pub use display::ConsoleDisplay;
pub use monitor::{Monitor, MonitorSettings, MonitorStats};
