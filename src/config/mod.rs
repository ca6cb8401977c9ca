//! Configuration Management Module
//!
//! Runner settings stored as JSON under the platform config directory
//! (`<config_dir>/droidkw/config.json`).

pub mod storage;
pub mod types;

pub use storage::{config_dir, config_file, ConfigError, ConfigStorage};
pub use types::{LoggingConfig, RpcConfig, RunnerConfig, ServerConfig, CONFIG_VERSION};
