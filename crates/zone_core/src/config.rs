//! # Zone Configuration
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! target_bytes = 655360
//! backoff_bytes = 16
//! owner_slots = 1024
//! check_heap_on_purge = false
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::block::USER_OWNER_BASE;
use crate::error::{ConfigError, ConfigResult};
use crate::handle::PARAGRAPH_SIZE;

/// Largest number of owner slots a block header can name.
pub const MAX_OWNER_SLOTS: usize = (u16::MAX - USER_OWNER_BASE) as usize + 1;

/// Largest arena whose addresses fit the 32-bit payload pointer.
pub const MAX_ARENA_BYTES: usize = (u32::MAX as usize & !(PARAGRAPH_SIZE - 1)) - PARAGRAPH_SIZE;

/// Allocator settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZoneConfig {
    /// Arena size to try first, in bytes.
    pub target_bytes: usize,
    /// Amount to shrink the request by after each refusal, in bytes.
    pub backoff_bytes: usize,
    /// Capacity of the owner slot table.
    pub owner_slots: usize,
    /// Run the heap check after every tag purge.
    pub check_heap_on_purge: bool,
}

impl ZoneConfig {
    /// 640 KiB, the conventional memory a real-mode machine can hand out.
    pub const DEFAULT_TARGET_BYTES: usize = 640 * 1024;

    /// Creates a config for an arena of `target_bytes` with default settings.
    #[must_use]
    pub fn with_target_bytes(target_bytes: usize) -> Self {
        Self {
            target_bytes,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed input, [`ConfigError::Invalid`] on
    /// out-of-range values.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_bytes < 2 * PARAGRAPH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "target_bytes {} is below the minimum of {} bytes",
                self.target_bytes,
                2 * PARAGRAPH_SIZE
            )));
        }
        if self.target_bytes > MAX_ARENA_BYTES {
            return Err(ConfigError::Invalid(format!(
                "target_bytes {} exceeds the addressable {MAX_ARENA_BYTES} bytes",
                self.target_bytes
            )));
        }
        if self.backoff_bytes == 0 {
            return Err(ConfigError::Invalid("backoff_bytes must be positive".into()));
        }
        if self.owner_slots > MAX_OWNER_SLOTS {
            return Err(ConfigError::Invalid(format!(
                "owner_slots {} exceeds {MAX_OWNER_SLOTS}",
                self.owner_slots
            )));
        }
        Ok(())
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            target_bytes: Self::DEFAULT_TARGET_BYTES,
            backoff_bytes: PARAGRAPH_SIZE,
            owner_slots: 1024,
            check_heap_on_purge: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ZoneConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_bytes, 655_360);
    }

    #[test]
    fn test_parse_partial_document() {
        let config = ZoneConfig::from_toml_str("target_bytes = 4096\ncheck_heap_on_purge = true").unwrap();
        assert_eq!(config.target_bytes, 4096);
        assert!(config.check_heap_on_purge);
        assert_eq!(config.owner_slots, 1024);
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = ZoneConfig::from_toml_str("heap = 12").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(matches!(
            ZoneConfig::from_toml_str("target_bytes = 16"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ZoneConfig::from_toml_str("backoff_bytes = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ZoneConfig::from_toml_str("owner_slots = 70000"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
