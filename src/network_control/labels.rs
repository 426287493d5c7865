//! Interface aliases and the ignore list.
//!
//! Aliases and ignored interfaces are owned by an external key-value store;
//! the rest of the crate only sees the [`InterfaceLabels`] trait. The bundled
//! [`MemoryLabels`] keeps them in memory, seeded from configuration.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::debug;

/// Interfaces hidden when no ignore list is configured.
pub const DEFAULT_IGNORED: &[&str] = &["docker0"];

pub trait InterfaceLabels: Send + Sync {
    /// Alias for `interface`, if one is set.
    fn alias(&self, interface: &str) -> Option<String>;

    /// Sets (`Some`) or clears (`None`) an alias. Returns the previous alias.
    fn set_alias(&self, interface: &str, alias: Option<String>) -> Option<String>;

    /// Interfaces that must not be listed.
    fn ignored(&self) -> Vec<String>;
}

/// `eth0` or `eth0 (uplink)` when an alias differing from the name is set.
pub fn display_name(labels: &dyn InterfaceLabels, interface: &str) -> String {
    match labels.alias(interface) {
        Some(alias) if !alias.is_empty() && alias != interface => {
            format!("{} ({})", interface, alias)
        }
        _ => interface.to_string(),
    }
}

#[derive(Debug, Default)]
struct LabelState {
    aliases: HashMap<String, String>,
    ignored: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryLabels {
    state: Mutex<LabelState>,
}

impl MemoryLabels {
    pub fn new(aliases: HashMap<String, String>, ignored: Vec<String>) -> Self {
        Self {
            state: Mutex::new(LabelState { aliases, ignored }),
        }
    }

    /// No aliases and the default ignore list.
    pub fn with_defaults() -> Self {
        Self::new(
            HashMap::new(),
            DEFAULT_IGNORED.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn state(&self) -> MutexGuard<'_, LabelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl InterfaceLabels for MemoryLabels {
    fn alias(&self, interface: &str) -> Option<String> {
        self.state().aliases.get(interface).cloned()
    }

    fn set_alias(&self, interface: &str, alias: Option<String>) -> Option<String> {
        let mut state = self.state();
        let previous = match alias {
            Some(a) => state.aliases.insert(interface.to_string(), a),
            None => state.aliases.remove(interface),
        };
        debug!("Alias for {} updated (previous: {:?})", interface, previous);
        previous
    }

    fn ignored(&self) -> Vec<String> {
        self.state().ignored.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_includes_differing_alias() {
        let labels = MemoryLabels::with_defaults();
        assert_eq!(display_name(&labels, "eth0"), "eth0");

        labels.set_alias("eth0", Some("uplink".into()));
        assert_eq!(display_name(&labels, "eth0"), "eth0 (uplink)");

        labels.set_alias("eth1", Some("eth1".into()));
        assert_eq!(display_name(&labels, "eth1"), "eth1");
    }

    #[test]
    fn set_alias_returns_previous_value() {
        let labels = MemoryLabels::with_defaults();
        assert_eq!(labels.set_alias("eth0", Some("a".into())), None);
        assert_eq!(labels.set_alias("eth0", Some("b".into())), Some("a".into()));
        assert_eq!(labels.set_alias("eth0", None), Some("b".into()));
        assert_eq!(labels.alias("eth0"), None);
    }

    #[test]
    fn defaults_ignore_docker_bridge() {
        assert_eq!(MemoryLabels::with_defaults().ignored(), vec!["docker0"]);
    }
}
