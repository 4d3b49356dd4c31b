mod config;

pub use config::{
    ConfigError, DebugStreamConfig, SourceConfig, SourceSpec, ThreadInfoConfig,
};
