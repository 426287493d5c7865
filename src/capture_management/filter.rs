//! BPF filter expression construction for capture requests.
//!
//! Three clause families are supported (host, net, port). Each family is a
//! comma separated list joined by its own boolean operator; the families are
//! then combined with `and`.

use std::fmt;
use std::str::FromStr;

use crate::error_handling::types::CaptureError;

/// Boolean operator used to join the values of one clause family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterLogic {
    #[default]
    Or,
    And,
}

impl FilterLogic {
    /// Parses optional form input; a missing or blank value means `or`.
    pub fn from_form(value: Option<&str>) -> Result<Self, CaptureError> {
        match value.map(str::trim) {
            None | Some("") => Ok(FilterLogic::Or),
            Some(v) => v.parse(),
        }
    }
}

impl FromStr for FilterLogic {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "or" => Ok(FilterLogic::Or),
            "and" => Ok(FilterLogic::And),
            other => Err(CaptureError::Validation(format!(
                "Invalid filter logic '{}': expected 'or' or 'and'",
                other
            ))),
        }
    }
}

impl fmt::Display for FilterLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterLogic::Or => write!(f, "or"),
            FilterLogic::And => write!(f, "and"),
        }
    }
}

/// One clause family: the primitive keyword, its values and their operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterClause {
    pub values: Vec<String>,
    pub logic: FilterLogic,
}

impl FilterClause {
    pub fn new(values: Vec<String>, logic: FilterLogic) -> Self {
        Self { values, logic }
    }

    /// Splits a comma separated form field, dropping blank entries.
    pub fn from_csv(raw: &str, logic: FilterLogic) -> Self {
        let values = raw
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        Self { values, logic }
    }

    fn render(&self, keyword: &str) -> Option<String> {
        match self.values.as_slice() {
            [] => None,
            [single] => Some(format!("{} {}", keyword, single)),
            many => {
                let joined = many
                    .iter()
                    .map(|v| format!("{} {}", keyword, v))
                    .collect::<Vec<_>>()
                    .join(&format!(" {} ", self.logic));
                Some(format!("({})", joined))
            }
        }
    }
}

/// Capture filter built from the host, network and port families.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureFilter {
    pub hosts: FilterClause,
    pub networks: FilterClause,
    pub ports: FilterClause,
}

impl CaptureFilter {
    /// Renders the tcpdump expression, or an empty string when no family has values.
    pub fn expression(&self) -> String {
        [
            self.hosts.render("host"),
            self.networks.render("net"),
            self.ports.render("port"),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" and ")
    }
}
