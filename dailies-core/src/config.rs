//! Application settings loaded from an optional TOML file.
//!
//! ```toml
//! [database]
//! path = "/srv/dailies/dailies.sqlite"
//! pool_size = 4
//!
//! [import]
//! header_scan_rows = 10
//! default_email_domain = "gmail.com"
//! default_char_type = "alchemist"
//! ```

use crate::error::{Result, TrackerError};
use crate::models::CharType;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./dailies.sqlite"),
            pool_size: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ImportConfig {
    pub header_scan_rows: usize,
    pub default_email_domain: String,
    pub default_char_type: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            header_scan_rows: 10,
            default_email_domain: "gmail.com".to_string(),
            default_char_type: "alchemist".to_string(),
        }
    }
}

impl ImportConfig {
    pub fn char_type(&self) -> Result<CharType> {
        self.default_char_type
            .parse()
            .map_err(|e| TrackerError::Config(format!("import.default_char_type: {}", e)))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub import: ImportConfig,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrackerError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config from {:?}: {}", path, e),
            ))
        })?;

        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| TrackerError::Config(format!("Failed to parse config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(TrackerError::Config("database.pool_size must be at least 1".to_string()));
        }
        if self.import.header_scan_rows == 0 {
            return Err(TrackerError::Config("import.header_scan_rows must be at least 1".to_string()));
        }
        if self.import.default_email_domain.trim().is_empty() || self.import.default_email_domain.contains('@') {
            return Err(TrackerError::Config(format!(
                "import.default_email_domain is not a domain: '{}'",
                self.import.default_email_domain
            )));
        }
        self.import.char_type()?;
        Ok(())
    }
}
