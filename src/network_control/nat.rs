//! Source NAT (MASQUERADE) rule commands.

use std::fmt;
use std::str::FromStr;

use super::environment::HostEnvironment;

/// `iptables` operation on the POSTROUTING rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOp {
    Check,
    Append,
    Delete,
}

impl RuleOp {
    fn flag(self) -> &'static str {
        match self {
            RuleOp::Check => "-C",
            RuleOp::Append => "-A",
            RuleOp::Delete => "-D",
        }
    }
}

/// Requested NAT transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatAction {
    Enable,
    Disable,
}

impl FromStr for NatAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable" => Ok(NatAction::Enable),
            "disable" => Ok(NatAction::Disable),
            _ => Err("Invalid action specified for NAT operation.".to_string()),
        }
    }
}

impl fmt::Display for NatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NatAction::Enable => write!(f, "enabled"),
            NatAction::Disable => write!(f, "disabled"),
        }
    }
}

/// Where rules are applied and how commands must be prefixed to get there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatContext {
    /// Running on the host; `sudo` unless disabled.
    Host { use_sudo: bool },
    /// Running in a container; rules are managed in PID 1's network namespace.
    Container,
}

impl NatContext {
    pub fn for_host(host: &HostEnvironment, use_sudo: bool) -> Self {
        if host.in_container {
            NatContext::Container
        } else {
            NatContext::Host { use_sudo }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            NatContext::Host { .. } => "host (direct sudo)",
            NatContext::Container => "host (via nsenter from container)",
        }
    }

    fn prefix(&self) -> &'static [&'static str] {
        match self {
            NatContext::Host { use_sudo: true } => &["sudo"],
            NatContext::Host { use_sudo: false } => &[],
            NatContext::Container => &["nsenter", "--target", "1", "--net"],
        }
    }

    /// `[prefix] iptables -t nat <op> POSTROUTING -o <if> -j MASQUERADE`.
    pub fn rule_command(&self, op: RuleOp, interface: &str) -> Vec<String> {
        self.prefix()
            .iter()
            .copied()
            .chain([
                "iptables",
                "-t",
                "nat",
                op.flag(),
                "POSTROUTING",
                "-o",
                interface,
                "-j",
                "MASQUERADE",
            ])
            .map(str::to_string)
            .collect()
    }
}
