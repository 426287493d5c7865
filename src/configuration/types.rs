use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error_handling::types::ConfigError;
use crate::network_control::labels::{MemoryLabels, DEFAULT_IGNORED};

/// Contents of the optional `--labels-file` TOML document.
///
/// ```toml
/// ignored_interfaces = ["docker0", "virbr0"]
///
/// [aliases]
/// eth0 = "uplink"
/// eth1 = "lab"
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelsFile {
    /// `None` keeps the built-in ignore list.
    #[serde(default)]
    pub ignored_interfaces: Option<Vec<String>>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl LabelsFile {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn into_labels(self) -> MemoryLabels {
        let ignored = self
            .ignored_interfaces
            .unwrap_or_else(|| DEFAULT_IGNORED.iter().map(|s| s.to_string()).collect());
        MemoryLabels::new(self.aliases, ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_control::labels::InterfaceLabels;

    #[test]
    fn parses_aliases_and_ignore_list() {
        let file = LabelsFile::from_toml_str(
            r#"
            ignored_interfaces = ["virbr0"]

            [aliases]
            eth0 = "uplink"
            "#,
        )
        .unwrap();
        let labels = file.into_labels();
        assert_eq!(labels.ignored(), vec!["virbr0"]);
        assert_eq!(labels.alias("eth0").as_deref(), Some("uplink"));
    }

    #[test]
    fn missing_ignore_list_keeps_defaults() {
        let labels = LabelsFile::from_toml_str("").unwrap().into_labels();
        assert_eq!(labels.ignored(), vec!["docker0"]);
        assert_eq!(labels.alias("eth0"), None);
    }

    #[test]
    fn explicit_empty_ignore_list_is_respected() {
        let labels = LabelsFile::from_toml_str("ignored_interfaces = []")
            .unwrap()
            .into_labels();
        assert!(labels.ignored().is_empty());
    }

    #[test]
    fn invalid_toml_is_reported() {
        assert!(matches!(
            LabelsFile::from_toml_str("aliases = 3"),
            Err(ConfigError::TomlError(_))
        ));
    }
}
