use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::models::SensorType;
use crate::overlap::OverlapConfig;

pub const DEFAULT_CHUNK_LIMIT_BYTES: usize = 32 * 1024;
pub const DEFAULT_POST_TIMEOUT_MS: u64 = 90_000;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;
pub const MIN_WORKER_INTERVAL_MINUTES: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox-api.healthsync.dev",
            Environment::Production => "https://api.healthsync.dev",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Divide the ceiling by one sampled entry's serialized size.
    #[default]
    Approximate,
    /// Track the running serialized size of every chunk.
    Exact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkSettings {
    pub app_id: String,
    pub app_secret: String,
    pub environment: Environment,
    pub sensors: Vec<SensorType>,
    pub chunk_limit_bytes: usize,
    pub chunk_strategy: ChunkStrategy,
    pub post_timeout_ms: u64,
    pub default_lookback_days: i64,
    pub worker_interval_minutes: u64,
    pub overlap: OverlapConfig,
}

impl Default for SdkSettings {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            environment: Environment::default(),
            sensors: SensorType::ALL.to_vec(),
            chunk_limit_bytes: DEFAULT_CHUNK_LIMIT_BYTES,
            chunk_strategy: ChunkStrategy::default(),
            post_timeout_ms: DEFAULT_POST_TIMEOUT_MS,
            default_lookback_days: DEFAULT_LOOKBACK_DAYS,
            worker_interval_minutes: MIN_WORKER_INTERVAL_MINUTES,
            overlap: OverlapConfig::default(),
        }
    }
}

impl SdkSettings {
    pub fn validate(&self) -> Result<()> {
        if self.sensors.is_empty() {
            bail!("at least one sensor must be selected");
        }
        if self.chunk_limit_bytes == 0 {
            bail!("chunk_limit_bytes must be greater than zero");
        }
        if self.post_timeout_ms == 0 {
            bail!("post_timeout_ms must be greater than zero");
        }
        if self.default_lookback_days <= 0 {
            bail!("default_lookback_days must be positive");
        }
        Ok(())
    }

    pub fn post_timeout(&self) -> Duration {
        Duration::from_millis(self.post_timeout_ms)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.default_lookback_days)
    }

    /// Worker period, never shorter than the platform minimum.
    pub fn worker_interval(&self) -> Duration {
        let minutes = self.worker_interval_minutes.max(MIN_WORKER_INTERVAL_MINUTES);
        Duration::from_secs(minutes * 60)
    }
}

/// Settings persisted as JSON next to the database.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SdkSettings>,
}

impl SettingsStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("malformed settings in {}", path.display()))?
        } else {
            SdkSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> SdkSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: SdkSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read settings from {}", self.path.display()))?;
        let data: SdkSettings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &SdkSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, SdkSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, SdkSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
