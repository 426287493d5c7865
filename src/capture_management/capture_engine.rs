//! Capture process backends.
//!
//! A [`CaptureEngine`] turns a [`CaptureRequest`] into a running process and
//! hands back a [`CaptureHandle`] that the session owns until it stops. The
//! production backend is [`TcpdumpEngine`]; tests plug in scripted engines.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use crate::error_handling::types::CaptureError;

/// Everything a backend needs to start one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub interface: String,
    pub output_path: PathBuf,
    pub max_packets: u32,
    /// Empty means capture everything.
    pub filter_expression: String,
    /// User tcpdump drops privileges to (`-Z`). `None` omits the option.
    pub identity_user: Option<String>,
}

/// Ownership of a running capture process.
#[async_trait]
pub trait CaptureHandle: Send {
    /// OS process id, if the process has not been reaped yet.
    fn pid(&self) -> Option<u32>;

    /// Takes the error stream; subsequent calls return `None`.
    fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>>;

    /// `true` while the process has not exited.
    fn is_running(&mut self) -> bool;

    /// Sends a graceful termination signal without waiting.
    fn terminate(&mut self) -> std::io::Result<()>;

    /// Forcefully kills the process without waiting.
    fn kill(&mut self) -> std::io::Result<()>;

    /// Waits for exit up to `timeout`. Returns `false` on timeout.
    async fn wait_for_exit(&mut self, timeout: Duration) -> std::io::Result<bool>;
}

/// Starts capture processes.
pub trait CaptureEngine: Send + Sync {
    fn start(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// Runs `tcpdump`, optionally through `sudo`.
pub struct TcpdumpEngine {
    use_sudo: bool,
    program: String,
}

impl TcpdumpEngine {
    pub fn new(use_sudo: bool) -> Self {
        Self {
            use_sudo,
            program: "tcpdump".to_string(),
        }
    }

    /// Full argv, including the `sudo` prefix when enabled.
    pub fn command_line(&self, request: &CaptureRequest) -> Vec<String> {
        let mut argv = Vec::new();
        if self.use_sudo {
            argv.push("sudo".to_string());
        }
        argv.push(self.program.clone());
        argv.extend([
            "-i".to_string(),
            request.interface.clone(),
            "-w".to_string(),
            request.output_path.to_string_lossy().into_owned(),
            "-c".to_string(),
            request.max_packets.to_string(),
        ]);
        if let Some(user) = &request.identity_user {
            argv.push("-Z".to_string());
            argv.push(user.clone());
        }
        if !request.filter_expression.is_empty() {
            argv.push(request.filter_expression.clone());
        }
        argv
    }
}

impl CaptureEngine for TcpdumpEngine {
    fn start(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let argv = self.command_line(request);
        info!("Starting capture with command: {}", argv.join(" "));

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CaptureError::EngineStart("empty command line".to_string()))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn {}: {}", program, e);
                CaptureError::EngineStart(e.to_string())
            })?;

        debug!("Capture process spawned with pid {:?}", child.id());
        Ok(Box::new(ProcessHandle { child }))
    }
}

/// [`CaptureHandle`] over a tokio child process.
pub struct ProcessHandle {
    child: Child,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl CaptureHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>)
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
        if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    async fn wait_for_exit(&mut self, timeout: Duration) -> std::io::Result<bool> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Capture process exited with {}", status);
                Ok(true)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(false),
        }
    }
}
