//! Layered configuration loading with figment.
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. values passed to [`ConfigLoader::merge`]
//! 3. the profile file, `ferrogram.{profile}.toml`
//! 4. the main file, `ferrogram.toml` (or `config.toml`)
//! 5. `FERROGRAM_*` environment variables, `__` separating sections
//!
//! `FERROGRAM_BOT__TOKEN=123:abc` sets `bot.token`, and
//! `FERROGRAM_WEBHOOK__PORT=8443` sets `webhook.port`. TOML files need the
//! `toml-config` feature, YAML files (`ferrogram.yaml`, `ferrogram.yml`)
//! need `yaml-config`.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::FerrogramConfig;

/// Prefix of environment variables read by the loader.
pub const ENV_PREFIX: &str = "FERROGRAM_";

/// Variable naming the profile when none is set in code.
pub const PROFILE_VAR: &str = "FERROGRAM_PROFILE";

/// A configuration file format compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    /// Formats compiled into this build, in search order.
    const ENABLED: &'static [FileFormat] = &[
        #[cfg(feature = "toml-config")]
        FileFormat::Toml,
        #[cfg(feature = "yaml-config")]
        FileFormat::Yaml,
    ];

    /// Main file names searched for, in order.
    fn file_names(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["ferrogram.toml", "config.toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["ferrogram.yaml", "ferrogram.yml"],
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str())? {
            #[cfg(feature = "toml-config")]
            "toml" => Some(Self::Toml),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    fn merge(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(figment::providers::Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(figment::providers::Yaml::file(path)),
        }
    }
}

/// Layered configuration loader.
pub struct ConfigLoader {
    figment: Figment,
    profile: Option<String>,
    search_paths: Vec<PathBuf>,
    config_file: Option<PathBuf>,
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader with no search paths, reading the profile from
    /// `FERROGRAM_PROFILE` and overrides from the environment.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: std::env::var(PROFILE_VAR).ok().filter(|p| !p.is_empty()),
            search_paths: Vec::new(),
            config_file: None,
            load_env: true,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Adds a directory to search for configuration files, after those
    /// already added.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/ferrogram` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("ferrogram")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching. A missing file is an
    /// error.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a configuration value over the defaults. Files and the
    /// environment still override it.
    pub fn merge(mut self, config: FerrogramConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads the configuration. Validation is left to
    /// [`validate_config`](super::validate_config).
    pub fn load(mut self) -> ConfigResult<FerrogramConfig> {
        let mut figment = Figment::from(Serialized::defaults(FerrogramConfig::default()))
            .merge(std::mem::take(&mut self.figment));

        figment = match &self.config_file {
            Some(path) => self.merge_explicit_file(figment, path)?,
            None => self.merge_found_files(figment),
        };
        if self.load_env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        let config: FerrogramConfig = figment.extract()?;
        debug!(
            profile = self.profile.as_deref().unwrap_or("-"),
            mode = %config.mode,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn merge_explicit_file(&self, figment: Figment, path: &Path) -> ConfigResult<Figment> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let format = FileFormat::from_path(path).ok_or_else(|| {
            ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: {}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), "Loading configuration file");
        Ok(format.merge(figment, path))
    }

    /// Merges the first main file found, preceded by its profile variant.
    fn merge_found_files(&self, figment: Figment) -> Figment {
        for dir in &self.search_paths {
            for &format in FileFormat::ENABLED {
                for name in format.file_names() {
                    let main = dir.join(name);
                    if !main.exists() {
                        continue;
                    }
                    let mut figment = figment;
                    if let Some(variant) = self.profile_variant(&main)
                        && variant.exists()
                    {
                        debug!(path = %variant.display(), "Loading profile configuration");
                        figment = format.merge(figment, &variant);
                    }
                    info!(path = %main.display(), "Loading configuration file");
                    return format.merge(figment, &main);
                }
            }
        }
        warn!("No configuration file found, using defaults");
        figment
    }

    /// `ferrogram.toml` becomes `ferrogram.{profile}.toml`.
    fn profile_variant(&self, main: &Path) -> Option<PathBuf> {
        let profile = self.profile.as_deref()?;
        let stem = main.file_stem()?.to_str()?;
        let ext = main.extension()?.to_str()?;
        Some(main.with_file_name(format!("{stem}.{profile}.{ext}")))
    }
}
