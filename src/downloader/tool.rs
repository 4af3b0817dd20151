use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use crate::errors::{AppError, Result};

/// Captured result of one external tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn from_status(status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            success: status.success(),
            exit_code: status.code(),
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }
    }

    pub fn stdout_is_empty(&self) -> bool {
        self.stdout.iter().all(|b| b.is_ascii_whitespace())
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Failure to obtain a [`ToolOutput`] at all. A non-zero exit is *not*
/// a launch error; the tool ran and reported something about the content.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start process: {0}")]
    Spawn(std::io::Error),

    #[error("process did not finish within {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl LaunchError {
    /// Maps to the caller's error kind; a timeout is a failure of the step
    /// that was waiting on the tool.
    pub fn into_app_error(self, wrap: fn(String) -> AppError) -> AppError {
        wrap(self.to_string())
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> std::result::Result<ToolOutput, LaunchError>;
}

/// Runs yt-dlp as a child process.
pub struct YtDlpRunner {
    ytdlp_path: String,
    timeout: Option<Duration>,
}

impl YtDlpRunner {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CommandRunner for YtDlpRunner {
    async fn run(&self, args: &[String]) -> std::result::Result<ToolOutput, LaunchError> {
        let mut cmd = Command::new(&self.ytdlp_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::info!("🚀 [TOOL] {} {}", self.ytdlp_path, args.join(" "));
        let child = cmd.spawn().map_err(LaunchError::Spawn)?;

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result.map_err(LaunchError::Spawn)?,
                // the child is dropped with the future and killed
                Err(_) => return Err(LaunchError::TimedOut(limit)),
            },
            None => child.wait_with_output().await.map_err(LaunchError::Spawn)?,
        };

        Ok(ToolOutput::from_status(output.status, output.stdout, output.stderr))
    }
}
