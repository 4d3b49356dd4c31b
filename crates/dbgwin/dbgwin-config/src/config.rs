use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where slot snapshots come from, shared by both tools.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SourceConfig {
    /// Debugfs node; the tool default applies when unset.
    pub file: Option<PathBuf>,
    /// Memory-mappable debug window, e.g. a PCI resource file.
    pub window: Option<PathBuf>,
    #[serde(default)]
    pub window_offset: u64,
    /// Debug window slot index. Without it the slot is looked up by type.
    pub slot: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    File(PathBuf),
    Window {
        path: PathBuf,
        offset: u64,
        slot: Option<u32>,
    },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DebugStreamConfig {
    #[serde(flatten)]
    pub source: SourceConfig,
    #[serde(default = "defaults::debug_stream_interval")]
    pub update_interval_secs: f64,
    #[serde(default = "defaults::error_threshold")]
    pub error_threshold: u32,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ThreadInfoConfig {
    #[serde(flatten)]
    pub source: SourceConfig,
    #[serde(default = "defaults::thread_info_interval")]
    pub update_interval_secs: f64,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("update interval {0} is not a non-negative number of seconds")]
    Interval(f64),

    #[error("slot {0} selected but no debug window configured")]
    SlotWithoutWindow(u32),

    #[error("window offset {0:#x} is not word aligned")]
    WindowOffset(u64),
}

mod defaults {
    pub const DEBUG_STREAM_FILE: &str = "/sys/kernel/debug/sof/debug_stream";
    pub const THREAD_INFO_FILE: &str = "/sys/kernel/debug/sof/telemetry2";

    pub fn debug_stream_interval() -> f64 {
        0.01
    }

    pub fn thread_info_interval() -> f64 {
        1.0
    }

    pub fn error_threshold() -> u32 {
        3
    }

    pub fn log_level() -> String {
        "warn".into()
    }
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let toml_to_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&toml_to_str)?)
}

fn interval(secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::Interval(secs))
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(slot), None) = (self.slot, &self.window) {
            return Err(ConfigError::SlotWithoutWindow(slot));
        }
        if self.window_offset % 4 != 0 {
            return Err(ConfigError::WindowOffset(self.window_offset));
        }
        Ok(())
    }

    /// Picks the debug window when one is configured and either a slot is
    /// forced or the debugfs node does not exist; the file otherwise.
    pub fn resolve(&self, default_file: &str) -> SourceSpec {
        let file = self
            .file
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_file));
        match &self.window {
            Some(window) if self.slot.is_some() || !file.is_file() => SourceSpec::Window {
                path: window.clone(),
                offset: self.window_offset,
                slot: self.slot,
            },
            _ => SourceSpec::File(file),
        }
    }
}

impl Default for DebugStreamConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            update_interval_secs: defaults::debug_stream_interval(),
            error_threshold: defaults::error_threshold(),
            log_level: defaults::log_level(),
        }
    }
}

impl DebugStreamConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: DebugStreamConfig = load_toml(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source.validate()?;
        interval(self.update_interval_secs).map(|_| ())
    }

    pub fn update_interval(&self) -> Result<Duration, ConfigError> {
        interval(self.update_interval_secs)
    }

    pub fn source_spec(&self) -> SourceSpec {
        self.source.resolve(defaults::DEBUG_STREAM_FILE)
    }
}

impl Default for ThreadInfoConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            update_interval_secs: defaults::thread_info_interval(),
            log_level: defaults::log_level(),
        }
    }
}

impl ThreadInfoConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: ThreadInfoConfig = load_toml(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source.validate()?;
        interval(self.update_interval_secs).map(|_| ())
    }

    pub fn update_interval(&self) -> Result<Duration, ConfigError> {
        interval(self.update_interval_secs)
    }

    pub fn source_spec(&self) -> SourceSpec {
        self.source.resolve(defaults::THREAD_INFO_FILE)
    }
}
