use anyhow::{Context, Result};
use pulse_cloud::{
    client::{CloudSettings, DEFAULT_ANALYSIS_URL, DEFAULT_TOKEN_URL},
    connectivity::{RetryPolicy, DEFAULT_ATTEMPTS},
    session::DEFAULT_SUBMIT_THRESHOLD,
};
use pulse_lib::{
    detectors::ppg::PpgPipelineConfig,
    signal::{DEFAULT_BATCH_SIZE, DEFAULT_NOISE_CEILING_BPM, DEFAULT_RATE_HZ, DEFAULT_WINDOW},
};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const ENV_CLIENT_ID: &str = "PULSE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "PULSE_CLIENT_SECRET";
pub const ENV_API_KEY: &str = "PULSE_API_KEY";

/// Monitor configuration. Every table and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub acquisition: AcquisitionConfig,
    pub network: NetworkConfig,
    pub cloud: CloudConfig,
    pub controls: ControlsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub rate_hz: f64,
    pub batch_size: usize,
    pub window: usize,
    pub noise_ceiling_bpm: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_RATE_HZ,
            batch_size: DEFAULT_BATCH_SIZE,
            window: DEFAULT_WINDOW,
            noise_ceiling_bpm: DEFAULT_NOISE_CEILING_BPM,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub enabled: bool,
    /// Informational; association itself is handled by the host.
    pub ssid: Option<String>,
    pub probe_addr: String,
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ssid: None,
            probe_addr: "analysis.kubioscloud.com:443".into(),
            attempts: DEFAULT_ATTEMPTS,
            retry_delay_ms: 4000,
            probe_timeout_ms: 2000,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub token_url: String,
    pub analysis_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_key: Option<String>,
    pub submit_threshold: usize,
    pub timeout_ms: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.into(),
            analysis_url: DEFAULT_ANALYSIS_URL.into(),
            client_id: None,
            client_secret: None,
            api_key: None,
            submit_threshold: DEFAULT_SUBMIT_THRESHOLD,
            timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "***");
        f.debug_struct("CloudConfig")
            .field("token_url", &self.token_url)
            .field("analysis_url", &self.analysis_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("api_key", &redact(&self.api_key))
            .field("submit_threshold", &self.submit_threshold)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub debounce_ms: u64,
    pub start_enabled: bool,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            start_enabled: true,
        }
    }
}

impl MonitorConfig {
    pub fn pipeline(&self) -> PpgPipelineConfig {
        PpgPipelineConfig {
            fs: self.acquisition.rate_hz,
            window: self.acquisition.window,
            noise_ceiling_bpm: self.acquisition.noise_ceiling_bpm,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.network.attempts,
            delay: Duration::from_millis(self.network.retry_delay_ms),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.network.probe_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.controls.debounce_ms)
    }

    pub fn cloud_settings(&self) -> CloudSettings {
        CloudSettings {
            token_url: self.cloud.token_url.clone(),
            analysis_url: self.cloud.analysis_url.clone(),
            client_id: self.cloud.client_id.clone().unwrap_or_default(),
            client_secret: self.cloud.client_secret.clone().unwrap_or_default(),
            api_key: self.cloud.api_key.clone().unwrap_or_default(),
            timeout: Duration::from_millis(self.cloud.timeout_ms),
        }
    }

    /// Take credentials from the environment where set.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_CLIENT_ID) {
            self.cloud.client_id = Some(v);
        }
        if let Some(v) = lookup(ENV_CLIENT_SECRET) {
            self.cloud.client_secret = Some(v);
        }
        if let Some(v) = lookup(ENV_API_KEY) {
            self.cloud.api_key = Some(v);
        }
    }

    fn validate(&self) -> Result<()> {
        let acq = &self.acquisition;
        if acq.rate_hz <= 0.0 {
            anyhow::bail!("acquisition.rate_hz must be positive");
        }
        if acq.window == 0 || acq.batch_size <= acq.window {
            anyhow::bail!("acquisition.batch_size must exceed acquisition.window");
        }
        if self.network.attempts == 0 {
            anyhow::bail!("network.attempts must be at least 1");
        }
        Ok(())
    }
}

pub fn parse_config(contents: &str) -> Result<MonitorConfig> {
    let config: MonitorConfig = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

pub fn read_config(path: &Path) -> Result<MonitorConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn empty_config_uses_device_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.acquisition.batch_size, 750);
        assert_eq!(config.acquisition.window, 20);
        assert_eq!(config.pipeline().fs, 250.0);
        assert_eq!(config.retry_policy().attempts, 5);
        assert_eq!(config.retry_policy().delay, Duration::from_secs(4));
        assert_eq!(config.cloud.submit_threshold, 10);
        assert_eq!(config.debounce(), Duration::from_secs(1));
        assert!(config.network.enabled);
        assert!(config.controls.start_enabled);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = parse_config(
            r#"
            [network]
            enabled = false
            retry_delay_ms = 10

            [cloud]
            submit_threshold = 60
            client_id = "abc"
            "#,
        )
        .unwrap();
        assert!(!config.network.enabled);
        assert_eq!(config.network.attempts, 5);
        assert_eq!(config.retry_policy().delay, Duration::from_millis(10));
        assert_eq!(config.cloud.submit_threshold, 60);
        let settings = config.cloud_settings();
        assert_eq!(settings.client_id, "abc");
        assert!(settings.client_secret.is_empty());
        assert_eq!(settings.token_url, DEFAULT_TOKEN_URL);
    }

    #[test]
    fn rejects_window_larger_than_batch() {
        let err = parse_config("[acquisition]\nbatch_size = 10\nwindow = 20\n").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn environment_overrides_credentials() {
        let mut config = parse_config("[cloud]\nclient_id = \"file\"\n").unwrap();
        let env: HashMap<&str, &str> = [(ENV_CLIENT_ID, "env-id"), (ENV_API_KEY, "env-key")]
            .into_iter()
            .collect();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        let settings = config.cloud_settings();
        assert_eq!(settings.client_id, "env-id");
        assert_eq!(settings.api_key, "env-key");
        assert!(settings.client_secret.is_empty());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = parse_config(
            "[cloud]\nclient_id = \"id-1\"\nclient_secret = \"s3cret\"\napi_key = \"k3y\"\n",
        )
        .unwrap();
        let shown = format!("{:?}", config);
        assert!(shown.contains("id-1"));
        assert!(!shown.contains("s3cret"));
        assert!(!shown.contains("k3y"));
        assert!(shown.contains("client_secret: Some(\"***\")"));
    }

    #[test]
    fn read_config_names_the_file_on_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(&path, "[acquisition\n").unwrap();
        let err = read_config(&path).unwrap_err();
        assert!(format!("{}", err).contains("monitor.toml"));
    }
}
