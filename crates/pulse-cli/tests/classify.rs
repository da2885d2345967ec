use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use std::error::Error;

#[derive(Deserialize)]
struct ClassifyOutput {
    sns_index: f64,
    pns_index: f64,
    stress: String,
    recovery: String,
}

fn classify(sns: &str, pns: &str) -> Result<ClassifyOutput, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["classify", "--sns", sns, "--pns", pns]);
    let out = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&out)?)
}

#[test]
fn classify_prints_both_levels() -> Result<(), Box<dyn Error>> {
    let value = classify("0.2", "-2.5")?;
    assert_eq!(value.stress, "Low");
    assert_eq!(value.recovery, "Poor");
    Ok(())
}

#[test]
fn classify_rounds_indices_first() -> Result<(), Box<dyn Error>> {
    let value = classify("0.46", "-0.96")?;
    assert!((value.sns_index - 0.5).abs() < 1e-9);
    assert!((value.pns_index + 1.0).abs() < 1e-9);
    assert_eq!(value.stress, "Average");
    assert_eq!(value.recovery, "Good");
    Ok(())
}
