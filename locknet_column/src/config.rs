//! Column controller configuration.

use locknet::config::{ConfigError, SharedConfig};
use locknet::consts::MAX_COMPARTMENTS;
use serde::{Deserialize, Serialize};

/// Top-level column configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "info"
/// service_name = "locknet-col-01"
///
/// [column]
/// id = "col-01"
/// coordinator_addr = "10.0.0.1:7700"
/// listen_addr = "0.0.0.0:7710"
/// compartments = 8
///
/// [safety]
/// interlock_bypass = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub shared: SharedConfig,
    pub column: ColumnSection,
    #[serde(default)]
    pub safety: SafetySection,
}

/// Identity and network addressing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSection {
    /// Column identity reported on announce.
    pub id: String,
    /// Coordinator inbound endpoint.
    pub coordinator_addr: String,
    /// Local bind address for the command endpoint.
    pub listen_addr: String,
    /// Number of compartments this column drives.
    pub compartments: u8,
}

/// Safety-interlock configuration.
///
/// The bypass is deliberately a config value: it shows up in the file,
/// in the logs, and in review diffs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetySection {
    /// Skip the interlock check before motion commands.
    #[serde(default)]
    pub interlock_bypass: bool,
}

impl ColumnConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.column.id.is_empty() {
            return Err(ConfigError::ValidationError(
                "column id cannot be empty".to_string(),
            ));
        }
        if self.column.compartments == 0 {
            return Err(ConfigError::ValidationError(
                "a column drives at least one compartment".to_string(),
            ));
        }
        if self.column.compartments as usize > MAX_COMPARTMENTS {
            return Err(ConfigError::ValidationError(format!(
                "at most {MAX_COMPARTMENTS} compartments per column, got {}",
                self.column.compartments
            )));
        }
        Ok(())
    }
}
