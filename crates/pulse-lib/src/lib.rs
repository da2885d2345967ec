pub mod buffer;
pub mod detectors;
pub mod display;
pub mod error;
pub mod io;
pub mod metrics;
pub mod signal;

pub use detectors::*;
pub use display::Display;
pub use error::*;
pub use metrics::*;
pub use signal::*;
