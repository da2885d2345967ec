use assert_cmd::cargo::cargo_bin_cmd;
use pulse_run::{SampleSource, SyntheticPulse};
use serde::Deserialize;
use std::error::Error;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
struct StatsOutput {
    cycles: usize,
    valid_readings: usize,
    submissions: usize,
}

fn write_pulse(dir: &Path, bpm: f64, samples: usize) -> PathBuf {
    let mut source = SyntheticPulse::new(250.0, bpm, 21);
    let body: String = (0..samples)
        .filter_map(|_| source.next_sample())
        .map(|s| format!("{}\n", s))
        .collect();
    let path = dir.join("replay.txt");
    std::fs::write(&path, body).unwrap();
    path
}

fn run_monitor(args: &[&str], stdin: Option<&str>) -> Result<(String, StatsOutput), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.arg("monitor").args(args).args(["--log-level", "warn"]);
    if let Some(input) = stdin {
        cmd.write_stdin(input.to_string());
    }
    let out = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(out)?;
    let last = text.lines().last().ok_or("no output")?;
    let stats: StatsOutput = serde_json::from_str(last)?;
    Ok((text, stats))
}

#[test]
fn offline_replay_shows_bpm_for_each_batch() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let input = write_pulse(dir.path(), 60.0, 2250);
    let (text, stats) = run_monitor(
        &["--input", input.to_str().unwrap(), "--unpaced", "--offline"],
        None,
    )?;
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.valid_readings, 3);
    assert_eq!(stats.submissions, 0);
    let shown: Vec<u32> = text
        .lines()
        .filter_map(|line| line.strip_suffix(" BPM"))
        .map(|bpm| bpm.parse().unwrap())
        .collect();
    assert_eq!(shown.len(), 3);
    assert!(shown.iter().all(|bpm| (58..=62).contains(bpm)));
    Ok(())
}

#[test]
fn max_cycles_bounds_a_synthetic_run() -> Result<(), Box<dyn Error>> {
    let (_, stats) = run_monitor(
        &["--offline", "--unpaced", "--simulate-bpm", "66", "--max-cycles", "2"],
        None,
    )?;
    assert_eq!(stats.cycles, 2);
    Ok(())
}

#[test]
fn stopped_monitor_without_controls_exits() -> Result<(), Box<dyn Error>> {
    let (text, stats) = run_monitor(&["--offline", "--start-stopped"], None)?;
    assert!(text.contains("Stopped Press rot push button to start"));
    assert_eq!(stats.cycles, 0);
    Ok(())
}

#[test]
fn power_command_starts_a_stopped_monitor() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let input = write_pulse(dir.path(), 60.0, 2250);
    let (_, stats) = run_monitor(
        &[
            "--input",
            input.to_str().unwrap(),
            "--unpaced",
            "--offline",
            "--start-stopped",
            "--controls",
        ],
        Some("p\n"),
    )?;
    // Samples queued before the press are discarded, so at least one batch remains.
    assert!((1..=3).contains(&stats.cycles), "cycles {}", stats.cycles);
    Ok(())
}

#[test]
fn missing_config_file_is_an_error() {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["monitor", "--config", "/nonexistent/monitor.toml", "--offline"]);
    cmd.assert().failure();
}
