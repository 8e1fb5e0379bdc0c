//! Store configuration via `psrstore.toml`
//!
//! Every setting has a default, so an empty file (or no file at all) is a
//! valid configuration. The container template can additionally be
//! overridden per process with the `PSRSTORE_TEMPLATE` environment variable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use psrstore_core::{Error, Result};
use psrstore_durability::{Template, DEFAULT_FILE_MODE};
use psrstore_storage::{AmpStorage, SwapArena};
use tracing::debug;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "psrstore.toml";

/// Environment variable naming a template file; overrides `template`
pub const TEMPLATE_ENV: &str = "PSRSTORE_TEMPLATE";

const BUILTIN_TEMPLATE: &str = include_str!("../templates/psrc.toml");

/// Store configuration loaded from `psrstore.toml`.
///
/// # Example
///
/// ```toml
/// amp_storage = "swap"
/// swap_dir = "/scratch"
/// quantize_amps = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Container template file; the built-in template if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    /// Where profile samples live: `"heap"` or `"swap"`
    #[serde(default = "default_amp_storage")]
    pub amp_storage: String,
    /// Directory for the swap backing file; the system temp dir if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_dir: Option<PathBuf>,
    /// Write profile samples as 16-bit integers with per-profile scaling
    #[serde(default)]
    pub quantize_amps: bool,
    /// Decode profile samples on first access instead of at load
    #[serde(default = "default_true")]
    pub defer_amps: bool,
    /// Permission mode of written files before the umask
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,
}

fn default_amp_storage() -> String {
    "heap".to_string()
}

fn default_true() -> bool {
    true
}

fn default_file_mode() -> u32 {
    DEFAULT_FILE_MODE
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            template: None,
            amp_storage: default_amp_storage(),
            swap_dir: None,
            quantize_amps: false,
            defer_amps: true,
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

impl StoreConfig {
    /// Check setting values
    pub fn validate(&self) -> Result<()> {
        match self.amp_storage.as_str() {
            "heap" | "swap" => {}
            other => {
                return Err(Error::Config(format!(
                    "invalid amp_storage '{}'. Expected \"heap\" or \"swap\".",
                    other
                )))
            }
        }
        if self.file_mode > 0o7777 {
            return Err(Error::Config(format!(
                "invalid file_mode {:o}",
                self.file_mode
            )));
        }
        Ok(())
    }

    /// Storage for the profile samples of one loaded archive
    ///
    /// `"swap"` creates a fresh arena in `swap_dir`.
    pub fn amp_storage(&self) -> Result<AmpStorage> {
        self.validate()?;
        if self.amp_storage != "swap" {
            return Ok(AmpStorage::Heap);
        }
        let arena = match &self.swap_dir {
            Some(dir) => SwapArena::in_dir(dir)?,
            None => SwapArena::new()?,
        };
        Ok(AmpStorage::Swap(Arc::new(arena)))
    }

    /// Container template: `PSRSTORE_TEMPLATE`, then `template`, then built-in
    pub fn resolve_template(&self) -> Result<Template> {
        if let Some(path) = std::env::var_os(TEMPLATE_ENV) {
            let path = PathBuf::from(path);
            debug!(target: "psrstore::codec", path = %path.display(), "Template from environment");
            return Template::from_file(&path);
        }
        if let Some(path) = &self.template {
            debug!(target: "psrstore::codec", path = %path.display(), "Template from configuration");
            return Template::from_file(path);
        }
        builtin_template()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# psrstore configuration
#
# Where profile samples live: "heap" (default) or "swap".
#   "swap" = blocks of an unlinked, memory-mapped scratch file
amp_storage = "heap"

# Directory of the swap scratch file (default: system temp dir)
# swap_dir = "/scratch"

# Store profile samples as 16-bit integers with per-profile offset
# and scale (default: false, samples are written as 32-bit floats)
quantize_amps = false

# Decode profile samples on first access (default: true)
defer_amps = true

# Permission mode of written files, before the umask (default: 0o666)
file_mode = 0o666

# Container template (default: built in). The PSRSTORE_TEMPLATE
# environment variable takes precedence.
# template = "/etc/psrstore/psrc.toml"
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

/// The template compiled into the library
pub fn builtin_template() -> Result<Template> {
    Template::parse(BUILTIN_TEMPLATE)
}
