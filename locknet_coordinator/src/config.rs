//! Coordinator configuration.

use locknet::config::{ConfigError, SharedConfig};
use locknet::hw::{ColumnId, SizeClass};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level coordinator configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "info"
/// service_name = "locknet-coordinator"
///
/// [coordinator]
/// listen_addr = "0.0.0.0:7700"
///
/// [[columns]]
/// id = "col-01"
/// sizes = ["small", "small", "medium", "large"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub shared: SharedConfig,
    pub coordinator: CoordinatorSection,
    /// Optional per-column size layouts; compartments beyond a layout
    /// (or of unlisted columns) default to medium.
    #[serde(default)]
    pub columns: Vec<ColumnLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSection {
    /// Bind address for the inbound column endpoint.
    pub listen_addr: String,
    /// Override the staleness threshold [seconds].
    #[serde(default)]
    pub staleness_s: Option<u64>,
}

/// Declared size classes for one column's compartments, in index order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub id: String,
    #[serde(default)]
    pub sizes: Vec<SizeClass>,
}

impl CoordinatorConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.coordinator.listen_addr.is_empty() {
            return Err(ConfigError::ValidationError(
                "listen_addr cannot be empty".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for layout in &self.columns {
            if layout.id.is_empty() {
                return Err(ConfigError::ValidationError(
                    "column layout id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(layout.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate column layout: {}",
                    layout.id
                )));
            }
        }
        Ok(())
    }

    /// Size layouts keyed by column id, as the coordinator consumes them.
    pub fn size_layouts(&self) -> HashMap<ColumnId, Vec<SizeClass>> {
        self.columns
            .iter()
            .map(|layout| (ColumnId::new(layout.id.clone()), layout.sizes.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_toml() -> &'static str {
        r#"
[shared]
service_name = "locknet-coordinator"

[coordinator]
listen_addr = "0.0.0.0:7700"

[[columns]]
id = "col-01"
sizes = ["small", "medium", "large"]
"#
    }

    #[test]
    fn loads_layouts() {
        let config: CoordinatorConfig = toml::from_str(valid_toml()).unwrap();
        config.validate().unwrap();

        let layouts = config.size_layouts();
        assert_eq!(
            layouts[&ColumnId::new("col-01")],
            vec![SizeClass::Small, SizeClass::Medium, SizeClass::Large]
        );
    }

    #[test]
    fn rejects_duplicate_layouts() {
        let toml = format!("{}\n[[columns]]\nid = \"col-01\"\n", valid_toml());
        let config: CoordinatorConfig = toml::from_str(&toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn columns_section_optional() {
        let toml = r#"
[shared]
service_name = "c"

[coordinator]
listen_addr = "0.0.0.0:7700"
"#;
        let config: CoordinatorConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert!(config.size_layouts().is_empty());
        assert!(config.coordinator.staleness_s.is_none());
    }
}
