use std::sync::Arc;

use log::{error, info, warn};

use super::command::{log_command, tool_available, CommandRunner};
use super::environment::HostEnvironment;
use super::interfaces::parse_ip_addr;
use super::labels::{display_name, InterfaceLabels};
use super::nat::{NatAction, NatContext, RuleOp};
use super::qdisc::{self, QdiscParser};
use super::types::{CommandOutput, InterfaceStatus, NetemSettings, Notice, ToolAvailability};
use crate::error_handling::types::ControlError;

/// Reset notices list interface names up to this many, a count beyond it.
const RESET_LIST_LIMIT: usize = 3;

/// Front for every `ip`/`tc`/`iptables` operation of the panel.
///
/// Operations never fail outright; they return [`Notice`]s describing what
/// happened, the way the dashboard reports them. Every method blocks on
/// external commands, so async callers should use `spawn_blocking`.
pub struct NetworkController {
    runner: Arc<dyn CommandRunner>,
    labels: Arc<dyn InterfaceLabels>,
    host: HostEnvironment,
    use_sudo: bool,
    parser: QdiscParser,
}

impl NetworkController {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        labels: Arc<dyn InterfaceLabels>,
        host: HostEnvironment,
        use_sudo: bool,
    ) -> Result<Self, ControlError> {
        Ok(Self {
            runner,
            labels,
            host,
            use_sudo,
            parser: QdiscParser::new()?,
        })
    }

    pub fn labels(&self) -> &Arc<dyn InterfaceLabels> {
        &self.labels
    }

    pub fn tools(&self) -> ToolAvailability {
        ToolAvailability {
            tcpdump: tool_available(self.runner.as_ref(), "tcpdump"),
            tc: tool_available(self.runner.as_ref(), "tc"),
            ip: tool_available(self.runner.as_ref(), "ip"),
            iptables: self.iptables_available(),
        }
    }

    /// `iptables` on `PATH`, plus `nsenter` when running in a container.
    pub fn iptables_available(&self) -> bool {
        if !tool_available(self.runner.as_ref(), "iptables") {
            warn!("iptables command not found.");
            return false;
        }
        if self.host.in_container && !tool_available(self.runner.as_ref(), "nsenter") {
            warn!("Running in container, but nsenter command not found. Cannot manage host NAT rules.");
            return false;
        }
        true
    }

    fn nat_context(&self) -> NatContext {
        NatContext::for_host(&self.host, self.use_sudo)
    }

    fn run_logged(&self, argv: &[String]) -> Result<CommandOutput, ControlError> {
        let output = self.runner.run(argv)?;
        log_command(argv, &output.stdout);
        Ok(output)
    }

    fn qdisc_show(&self, interface: &str) -> Result<String, ControlError> {
        self.run_logged(&qdisc::show_command(self.use_sudo, interface))
            .map(|o| o.stdout)
    }

    /// Current netem values; defaults when `tc` cannot be run.
    pub fn qdisc_settings(&self, interface: &str) -> NetemSettings {
        match self.qdisc_show(interface) {
            Ok(output) => self.parser.parse(&output),
            Err(e) => {
                error!("Error getting qdisc settings for interface {}: {}", interface, e);
                NetemSettings::default()
            }
        }
    }

    fn nat_rule_present(&self, interface: &str) -> bool {
        let ctx = self.nat_context();
        let argv = ctx.rule_command(RuleOp::Check, interface);
        match self.runner.run(&argv) {
            Ok(output) => {
                log_command(
                    &argv,
                    &format!(
                        "Return code: {:?}, Stdout: {}, Stderr: {} (Context: {})",
                        output.status,
                        output.stdout.trim(),
                        output.stderr.trim(),
                        ctx.describe()
                    ),
                );
                output.success()
            }
            Err(e) => {
                error!(
                    "Error checking NAT status for interface {} (Context: {}): {}",
                    interface,
                    ctx.describe(),
                    e
                );
                false
            }
        }
    }

    pub fn nat_enabled(&self, interface: &str) -> bool {
        self.iptables_available() && self.nat_rule_present(interface)
    }

    /// Dashboard rows, plus an error notice when `ip` output is unusable.
    pub fn list_interfaces(&self) -> (Vec<InterfaceStatus>, Vec<Notice>) {
        let argv = vec!["ip".to_string(), "-j".to_string(), "addr".to_string()];
        let parsed = self
            .run_logged(&argv)
            .and_then(|output| parse_ip_addr(&output.stdout, &self.labels.ignored()));

        let links = match parsed {
            Ok(links) => links,
            Err(e) => {
                error!("Error listing interfaces: {}", e);
                return (
                    Vec::new(),
                    vec![Notice::error("Error retrieving network interfaces")],
                );
            }
        };

        let iptables = self.iptables_available();
        let rows = links
            .into_iter()
            .map(|link| {
                let settings = self.qdisc_settings(&link.name);
                let nat_enabled = iptables && self.nat_rule_present(&link.name);
                InterfaceStatus {
                    alias: self.labels.alias(&link.name).unwrap_or_default(),
                    ip: link.ipv4,
                    latency: settings.latency,
                    loss: settings.loss,
                    jitter: settings.jitter,
                    nat_enabled,
                    name: link.name,
                }
            })
            .collect();
        (rows, Vec::new())
    }

    /// Validates the form values and replaces the root qdisc with netem.
    pub fn apply(
        &self,
        interface: &str,
        latency: Option<&str>,
        loss: Option<&str>,
        jitter: Option<&str>,
    ) -> Vec<Notice> {
        let request = match qdisc::validate_request(latency, loss, jitter) {
            Ok(request) => request,
            Err(ControlError::Validation(errors)) => {
                return errors.into_iter().map(Notice::error).collect()
            }
            Err(e) => return vec![Notice::error(e.to_string())],
        };

        let display = display_name(self.labels.as_ref(), interface);
        let current = self.qdisc_settings(interface);
        let settings = qdisc::merge(&current, &request);
        let argv = qdisc::replace_command(self.use_sudo, interface, &settings);

        match self.run_logged(&argv) {
            Ok(output) if output.success() => vec![Notice::success(format!(
                "Network conditions applied successfully to interface {}",
                display
            ))],
            Ok(output) => {
                error!(
                    "Error applying qdisc to interface {} (return code {:?}): {}",
                    interface, output.status, output.stderr
                );
                vec![Notice::error(format!(
                    "Error applying qdisc to interface {}: {}",
                    display, output.stderr
                ))]
            }
            Err(e) => {
                error!("Subprocess error when applying qdisc to interface {}: {}", interface, e);
                vec![Notice::error(format!(
                    "Failed to execute tc command for interface {}: {}",
                    display, e
                ))]
            }
        }
    }

    /// Deletes the netem qdisc if one is installed. Silent when there is none.
    pub fn remove(&self, interface: &str) -> Vec<Notice> {
        let display = display_name(self.labels.as_ref(), interface);
        match self.qdisc_show(interface) {
            Ok(output) if qdisc::has_netem(&output) => self.delete_netem(interface, &display),
            Ok(_) => {
                info!("No netem qdisc to remove on interface {}", interface);
                Vec::new()
            }
            Err(e) => {
                error!("Subprocess error when removing qdisc from interface {}: {}", interface, e);
                vec![Notice::error(format!(
                    "Failed to execute tc command for interface {}: {}",
                    display, e
                ))]
            }
        }
    }

    fn delete_netem(&self, interface: &str, display: &str) -> Vec<Notice> {
        let argv = qdisc::delete_command(self.use_sudo, interface);
        match self.run_logged(&argv) {
            Ok(output) if output.success() => vec![Notice::success(format!(
                "Network conditions removed successfully from interface {}",
                display
            ))],
            Ok(output) => {
                error!(
                    "Error removing qdisc from interface {} (return code {:?}): {}",
                    interface, output.status, output.stderr
                );
                vec![Notice::error(format!(
                    "Error removing qdisc from interface {}: {}",
                    display, output.stderr
                ))]
            }
            Err(e) => vec![Notice::error(format!(
                "Failed to execute tc command for interface {}: {}",
                display, e
            ))],
        }
    }

    /// Removes netem from every listed interface that has it.
    pub fn reset_all(&self) -> Vec<Notice> {
        let (interfaces, mut notices) = self.list_interfaces();
        let mut reset = Vec::new();

        for iface in &interfaces {
            match self.qdisc_show(&iface.name) {
                Ok(output) if qdisc::has_netem(&output) => {
                    let display = display_name(self.labels.as_ref(), &iface.name);
                    notices.extend(
                        self.delete_netem(&iface.name, &display)
                            .into_iter()
                            .filter(Notice::is_error),
                    );
                    reset.push(display);
                }
                Ok(_) => info!("No netem qdisc to remove on interface {}", iface.name),
                Err(e) => error!("Failed to reset interface {}: {}", iface.name, e),
            }
        }

        notices.push(match reset.len() {
            0 => Notice::info("No active network conditions found to reset"),
            n if n <= RESET_LIST_LIMIT => Notice::success(format!(
                "Successfully reset network conditions on {} interfaces: {}",
                n,
                reset.join(", ")
            )),
            n => Notice::success(format!(
                "Successfully reset network conditions on {} interfaces",
                n
            )),
        });
        notices
    }

    /// Sets or clears an alias. An empty (after trimming) alias clears it.
    pub fn update_alias(&self, interface: &str, alias: &str) -> Vec<Notice> {
        let alias = alias.trim();
        if alias.is_empty() {
            return match self.labels.set_alias(interface, None) {
                Some(old) => vec![Notice::success(format!(
                    "Alias for {} ('{}') removed",
                    interface, old
                ))],
                None => vec![Notice::info(format!("No alias was set for {}", interface))],
            };
        }

        match self.labels.set_alias(interface, Some(alias.to_string())) {
            Some(old) if !old.is_empty() => vec![Notice::success(format!(
                "Alias for {} changed from '{}' to '{}'",
                interface, old, alias
            ))],
            _ => vec![Notice::success(format!(
                "Alias for {} set to '{}'",
                interface, alias
            ))],
        }
    }

    /// Adds or deletes the MASQUERADE rule for `interface`.
    pub fn toggle_nat(&self, interface: &str, action: Option<&str>) -> Vec<Notice> {
        if !self.iptables_available() {
            return vec![Notice::error(
                "iptables (and nsenter if in container) command not found.",
            )];
        }

        let action = match action.unwrap_or_default().parse::<NatAction>() {
            Ok(action) => action,
            Err(message) => return vec![Notice::error(message)],
        };

        let ctx = self.nat_context();
        let display = self
            .labels
            .alias(interface)
            .unwrap_or_else(|| interface.to_string());
        let enabled = self.nat_rule_present(interface);

        let op = match (action, enabled) {
            (NatAction::Enable, true) | (NatAction::Disable, false) => {
                return vec![Notice::info(format!(
                    "Source NAT (Masquerade) is already {} on {} for {}.",
                    action,
                    ctx.describe(),
                    display
                ))]
            }
            (NatAction::Enable, false) => RuleOp::Append,
            (NatAction::Disable, true) => RuleOp::Delete,
        };

        let verb = match action {
            NatAction::Enable => "enabling",
            NatAction::Disable => "disabling",
        };
        let argv = ctx.rule_command(op, interface);
        match self.runner.run(&argv) {
            Ok(output) => {
                log_command(
                    &argv,
                    &format!(
                        "Return code: {:?}, Stdout: {}, Stderr: {} (Context: {})",
                        output.status,
                        output.stdout.trim(),
                        output.stderr.trim(),
                        ctx.describe()
                    ),
                );
                if output.success() {
                    vec![Notice::success(format!(
                        "Source NAT (Masquerade) {} on {} for {}.",
                        action,
                        ctx.describe(),
                        display
                    ))]
                } else {
                    let message = format!(
                        "Error {} Source NAT on {} for {}.",
                        verb,
                        ctx.describe(),
                        display
                    );
                    error!(
                        "{} Command: {}, Output: {}",
                        message,
                        argv.join(" "),
                        output.stderr.trim()
                    );
                    vec![Notice::error(format!("{}: {}", message, output.stderr.trim()))]
                }
            }
            Err(e) => {
                error!(
                    "Exception during NAT operation for {} (Context: {}): {}",
                    interface,
                    ctx.describe(),
                    e
                );
                vec![Notice::error(format!(
                    "An unexpected error occurred while toggling NAT: {}",
                    e
                ))]
            }
        }
    }
}
