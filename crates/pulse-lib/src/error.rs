use thiserror::Error;

/// Why a processing cycle produced no usable heart rate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoiseReason {
    #[error("fewer than two beats detected in batch")]
    NoBeats,
    #[error("{bpm} bpm is above the plausible ceiling of {ceiling}")]
    Implausible { bpm: u32, ceiling: u32 },
}

/// Failures the monitor handles at the boundary where they occur.
///
/// None of these end the main loop; each one updates local state and is
/// surfaced as a status message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("sensor noise: {0}")]
    SensorNoise(NoiseReason),
    #[error("no connection after {attempts} attempts")]
    ConnectivityFailure { attempts: u32 },
    #[error("access token request failed: {0}")]
    AuthFailure(String),
    #[error("analysis request failed: {0}")]
    AnalysisFailure(String),
}

impl MonitorError {
    /// Short text for the display collaborator.
    pub fn status_text(&self) -> &'static str {
        match self {
            MonitorError::SensorNoise(_) => "Signal too noisy",
            MonitorError::ConnectivityFailure { .. } => {
                "No connection. Continuing in offline mode"
            }
            MonitorError::AuthFailure(_) => "Error retrieving access token...",
            MonitorError::AnalysisFailure(_) => "Error retrieving analysis...",
        }
    }
}
