use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

const CONFIG_ENV: &str = "WELDCOUNT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "weldcount.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlSettings {
    pub detector_name: String,
    /// Question posed to the detector for every region
    pub query: String,
    /// Answers below this confidence are treated as unclear
    pub confidence_threshold: f32,
    /// Minimum delay between sampling cycles; 0 runs back-to-back
    #[serde(default)]
    pub trigger_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    pub ml_api_timeout_seconds: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            ml_api_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointSettings {
    Cloud { url: String, api_token: String },
    Edge { url: String },
}

impl EndpointSettings {
    pub fn url(&self) -> &str {
        match self {
            EndpointSettings::Cloud { url, .. } | EndpointSettings::Edge { url } => url,
        }
    }

    pub fn api_token(&self) -> Option<&str> {
        match self {
            EndpointSettings::Cloud { api_token, .. } => Some(api_token),
            EndpointSettings::Edge { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraConfig {
    /// Replays still images from a directory in name order
    ImageDirectory { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JigStation {
    pub number: u32,
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 250,
            max_backoff_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub ml: MlSettings,
    #[serde(default)]
    pub timeout: TimeoutSettings,
    pub endpoint: EndpointSettings,
    pub jig_stations: Vec<JigStation>,
    #[serde(default)]
    pub recovery: RecoverySettings,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from the path in `WELDCOUNT_CONFIG`, falling back to `./weldcount.json`.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jig_stations.is_empty() {
            bail!("at least one jig station must be configured");
        }

        let mut seen = HashSet::new();
        for station in &self.jig_stations {
            if !seen.insert(station.number) {
                bail!("jig station {} is configured twice", station.number);
            }
        }

        if !(0.0..=1.0).contains(&self.ml.confidence_threshold) {
            bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.ml.confidence_threshold
            );
        }

        if self.timeout.ml_api_timeout_seconds == 0 {
            bail!("ml_api_timeout_seconds must be greater than zero");
        }

        if self.recovery.initial_backoff_ms > self.recovery.max_backoff_ms {
            bail!("initial_backoff_ms must not exceed max_backoff_ms");
        }

        Ok(())
    }

    pub fn jig(&self, number: u32) -> Option<&JigStation> {
        self.jig_stations.iter().find(|station| station.number == number)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.ml_api_timeout_seconds)
    }

    pub fn trigger_interval(&self) -> Duration {
        Duration::from_millis(self.ml.trigger_interval_ms)
    }
}
