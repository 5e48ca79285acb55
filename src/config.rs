use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::error::TrackerError;
use crate::models::DEFAULT_CHUNK_SIZE;
use crate::sensing::HeadingMode;

const HEADING_MODE_ENV: &str = "RUNLOG_HEADING_MODE";
const CHUNK_SIZE_ENV: &str = "RUNLOG_CHUNK_SIZE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub heading_mode: HeadingMode,
    /// Characters per photo chunk. Writer and reader must agree.
    pub chunk_size: usize,
    pub tick_interval_ms: u64,
    /// Longest wait for an orientation reading in on-demand mode.
    pub heading_timeout_ms: u64,
    /// Page ceiling for the recovery database, standing in for a storage quota.
    pub storage_max_pages: Option<u32>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heading_mode: HeadingMode::OnDemand,
            chunk_size: DEFAULT_CHUNK_SIZE.get(),
            tick_interval_ms: 1000,
            heading_timeout_ms: 500,
            storage_max_pages: None,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.chunk_size == 0 {
            return Err(TrackerError::Config("chunk_size must be positive".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(TrackerError::Config(
                "tick_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.chunk_size).unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn heading_timeout(&self) -> Duration {
        Duration::from_millis(self.heading_timeout_ms)
    }

    /// Applies `RUNLOG_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(HEADING_MODE_ENV) {
            match value.parse::<HeadingMode>() {
                Ok(mode) => self.heading_mode = mode,
                Err(err) => log::warn!("ignoring {HEADING_MODE_ENV}: {err}"),
            }
        }
        if let Ok(value) = std::env::var(CHUNK_SIZE_ENV) {
            match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => self.chunk_size = size,
                _ => log::warn!("ignoring {CHUNK_SIZE_ENV}={value}: expected a positive integer"),
            }
        }
    }
}

/// JSON-backed configuration file.
pub struct ConfigStore {
    path: Option<PathBuf>,
    data: RwLock<TrackerConfig>,
}

impl ConfigStore {
    /// Loads `path`, falling back to defaults when the file is missing or unreadable.
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("config {} is invalid ({err}); using defaults", path.display());
                TrackerConfig::default()
            })
        } else {
            TrackerConfig::default()
        };
        data.apply_env_overrides();
        data.validate()?;

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Store with no backing file; updates stay in memory.
    pub fn in_memory(config: TrackerConfig) -> Self {
        Self {
            path: None,
            data: RwLock::new(config),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> TrackerConfig {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_heading_mode(&self, mode: HeadingMode) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.heading_mode = mode;
        self.persist(&guard)
    }

    fn persist(&self, data: &TrackerConfig) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
