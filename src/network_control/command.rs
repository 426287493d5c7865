//! Execution of external commands (`ip`, `tc`, `iptables`, `which`).

use std::process::Command;

use log::{debug, info};

use super::types::CommandOutput;
use crate::error_handling::types::ControlError;

/// Runs an argv to completion and captures its output.
pub trait CommandRunner: Send + Sync {
    fn run(&self, argv: &[String]) -> Result<CommandOutput, ControlError>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput, ControlError> {
        let (program, args) = argv.split_first().ok_or_else(|| ControlError::SpawnFailed {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ControlError::SpawnFailed {
                command: argv.join(" "),
                source,
            })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub fn log_command(argv: &[String], output: &str) {
    info!("Command: {}", argv.join(" "));
    info!("Output: {}", output);
}

/// Builds an argv from string slices, prefixed with `sudo` when requested.
pub fn privileged(use_sudo: bool, parts: &[&str]) -> Vec<String> {
    let mut argv = Vec::with_capacity(parts.len() + 1);
    if use_sudo {
        argv.push("sudo".to_string());
    }
    argv.extend(parts.iter().map(|p| p.to_string()));
    argv
}

/// `which <tool>` exits with 0.
pub fn tool_available(runner: &dyn CommandRunner, tool: &str) -> bool {
    let argv = vec!["which".to_string(), tool.to_string()];
    match runner.run(&argv) {
        Ok(output) => {
            debug!("which {} -> {:?}", tool, output.status);
            output.success()
        }
        Err(e) => {
            debug!("Could not probe for {}: {}", tool, e);
            false
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn privileged_prefixes_sudo_only_when_enabled() {
        assert_eq!(
            privileged(true, &["tc", "qdisc", "show"]),
            vec!["sudo", "tc", "qdisc", "show"]
        );
        assert_eq!(privileged(false, &["tc"]), vec!["tc"]);
    }

    #[test]
    fn tool_probe_follows_exit_status() {
        let runner = ScriptedRunner::new();
        runner.respond("which tc", 0, "/usr/sbin/tc\n", "");
        runner.respond("which tcpdump", 1, "", "");
        runner.fail_spawn("which ip");

        assert!(tool_available(&runner, "tc"));
        assert!(!tool_available(&runner, "tcpdump"));
        assert!(!tool_available(&runner, "ip"));
    }

    #[test]
    fn system_runner_captures_output_and_status() {
        let runner = SystemRunner;
        let out = runner
            .run(&["sh".to_string(), "-c".to_string(), "echo hi; echo err >&2; exit 3".to_string()])
            .unwrap();
        assert_eq!(out.status, Some(3));
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.success());
    }

    #[test]
    fn system_runner_reports_missing_program() {
        let err = SystemRunner
            .run(&["/nonexistent/hyyperwan-tool".to_string()])
            .unwrap_err();
        assert!(matches!(err, ControlError::SpawnFailed { .. }));
        assert!(matches!(SystemRunner.run(&[]), Err(ControlError::SpawnFailed { .. })));
    }
}
