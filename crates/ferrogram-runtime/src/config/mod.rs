//! Configuration module for the Ferrogram runtime.
//!
//! Layered loading with figment plus fail-fast validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX, PROFILE_VAR};
pub use schema::{
    FerrogramConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, Mode,
    RuntimeConfig, SpanEventConfig,
};
pub use validation::{validate_config, validate_webhook_config};
