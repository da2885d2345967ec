use crate::signal::RawSample;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse newline-delimited ADC readings, ignoring blank/comment lines.
///
/// Fractional values are accepted and rounded; values outside the 16-bit
/// range are rejected.
pub fn parse_sample_series(text: &str) -> Result<Vec<RawSample>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not numeric: {}", idx + 1, trimmed))?;
        if !(0.0..=RawSample::MAX as f64).contains(&val) {
            anyhow::bail!("line {} is outside the 16-bit ADC range: {}", idx + 1, trimmed);
        }
        out.push(val.round() as RawSample);
    }
    if out.is_empty() {
        anyhow::bail!("no samples found");
    }
    Ok(out)
}

/// Read a newline-delimited sample series from disk.
pub fn read_sample_series(path: &Path) -> Result<Vec<RawSample>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_sample_series(&text)
}
