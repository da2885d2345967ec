use serde::{Deserialize, Serialize};
use std::fmt;

/// Sympathetic (stress) band derived from the analyzer's SNS index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StressLevel {
    Low,
    Average,
    High,
    /// Residual band: anything the other bands leave uncovered.
    AboveAverage,
}

/// Parasympathetic (recovery) band derived from the analyzer's PNS index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryLevel {
    Excellent,
    Good,
    Average,
    Poor,
    /// Residual band: anything the other bands leave uncovered.
    AboveAverage,
}

impl StressLevel {
    pub fn label(&self) -> &'static str {
        match self {
            StressLevel::Low => "Low",
            StressLevel::Average => "Average",
            StressLevel::High => "High",
            StressLevel::AboveAverage => "Above average",
        }
    }
}

impl RecoveryLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryLevel::Excellent => "Excellent",
            RecoveryLevel::Good => "Good",
            RecoveryLevel::Average => "Average",
            RecoveryLevel::Poor => "Poor",
            RecoveryLevel::AboveAverage => "Above average",
        }
    }
}

impl fmt::Display for StressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for RecoveryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stress and recovery labels from one successful analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub sns_index: f64,
    pub pns_index: f64,
    pub stress: StressLevel,
    pub recovery: RecoveryLevel,
}

impl Classification {
    /// Round both indices to one decimal and classify them.
    pub fn from_indices(sns_index: f64, pns_index: f64) -> Self {
        let sns_index = round_tenth(sns_index);
        let pns_index = round_tenth(pns_index);
        Self {
            sns_index,
            pns_index,
            stress: classify_sns(sns_index),
            recovery: classify_pns(pns_index),
        }
    }
}

/// Bands are checked in order; the first match wins.
pub fn classify_sns(sns: f64) -> StressLevel {
    if -0.5 < sns && sns < 0.5 {
        StressLevel::Low
    } else if (0.5..5.0).contains(&sns) || (-2.0..=-0.5).contains(&sns) {
        StressLevel::Average
    } else if sns >= 5.0 {
        StressLevel::High
    } else {
        StressLevel::AboveAverage
    }
}

/// Bands are checked in order; the first match wins, so -1.0 is `Good`.
pub fn classify_pns(pns: f64) -> RecoveryLevel {
    if -0.5 < pns && pns < 0.5 {
        RecoveryLevel::Excellent
    } else if (0.5..1.0).contains(&pns) || (-1.0..=-0.5).contains(&pns) {
        RecoveryLevel::Good
    } else if (1.0..2.0).contains(&pns) || (-2.0 < pns && pns <= -1.0) {
        RecoveryLevel::Average
    } else if pns < -2.0 {
        RecoveryLevel::Poor
    } else {
        RecoveryLevel::AboveAverage
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
