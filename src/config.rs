//! Target-image configuration (ambient; see DESIGN.md).
//!
//! The teacher crate carries no configuration layer at all — it's a library
//! with no persisted settings. This follows the pack's `atlas-config` idiom
//! instead: a `serde`-derived settings struct, a `Default` impl, and a
//! `load_from_str`/`load_file` pair reading TOML.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HostResult, MicroviumError};

/// Settings describing the snapshot image a module is compiled against
/// (spec §4.3 header fields: `requiredEngineVersion`, `requiredFeatureFlags`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Minimum engine version a decoder must support to load this image.
    #[serde(default = "default_engine_version")]
    pub required_engine_version: u16,

    /// Feature-flag bits this image depends on (spec §4.3, §7
    /// `FeatureMismatch`).
    #[serde(default)]
    pub required_feature_flags: u32,

    /// Largest encoded image this target can hold, in bytes. `None` means
    /// unbounded (spec doesn't mandate a limit; a microcontroller target
    /// config will usually set this).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_image_size: Option<u32>,
}

fn default_engine_version() -> u16 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            required_engine_version: default_engine_version(),
            required_feature_flags: 0,
            max_image_size: None,
        }
    }
}

impl Config {
    /// Parses a config from TOML text.
    pub fn load_from_str(s: &str) -> HostResult<Self> {
        toml::from_str(s).map_err(|e| MicroviumError::InvalidOperation(format!("invalid config: {e}")))
    }

    /// Reads and parses a config file from disk.
    pub fn load_file(path: impl AsRef<Path>) -> HostResult<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| MicroviumError::InvalidOperation(format!("reading {}: {e}", path.as_ref().display())))?;
        Self::load_from_str(&text)
    }

    /// Checks an encoded image's size against [`Config::max_image_size`].
    pub fn fits_image(&self, encoded_len: usize) -> bool {
        match self.max_image_size {
            Some(max) => encoded_len <= max as usize,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_size_limit() {
        let config = Config::default();
        assert_eq!(config.required_engine_version, 1);
        assert!(config.fits_image(usize::MAX));
    }

    #[test]
    fn parses_a_target_config() {
        let toml = r#"
required_engine_version = 3
required_feature_flags = 5
max_image_size = 1024
"#;
        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.required_engine_version, 3);
        assert_eq!(config.required_feature_flags, 5);
        assert!(config.fits_image(1024));
        assert!(!config.fits_image(1025));
    }

    #[test]
    fn rejects_unknown_fields() {
        let toml = "bogus_field = true";
        assert!(Config::load_from_str(toml).is_err());
    }
}
