//! External tool discovery and invocation (ffmpeg, ffprobe).

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Command;

use streambox_core::config::TranscodeConfig;
use streambox_core::{Error, Result};

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Resolve an external tool: config override first (if it exists), then
/// `PATH` lookup.
pub fn find_tool(name: &str, override_path: Option<&std::path::Path>) -> Option<PathBuf> {
    if let Some(p) = override_path {
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }
    which::which(name).ok()
}

/// Locations of the encoder binaries, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Encoders {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl Encoders {
    pub fn discover(config: &TranscodeConfig) -> Self {
        let encoders = Self {
            ffmpeg: find_tool("ffmpeg", config.ffmpeg_path.as_deref()),
            ffprobe: find_tool("ffprobe", config.ffprobe_path.as_deref()),
        };
        for (name, path) in [("ffmpeg", &encoders.ffmpeg), ("ffprobe", &encoders.ffprobe)] {
            match path {
                Some(p) => tracing::info!("Tool found: {name} at {}", p.display()),
                None => tracing::warn!("Tool not found: {name}; dependent features disabled"),
            }
        }
        encoders
    }

    /// Get the ffmpeg path or fail the job with a clear error.
    pub fn require_ffmpeg(&self) -> Result<&PathBuf> {
        self.ffmpeg
            .as_ref()
            .ok_or_else(|| Error::Internal("ffmpeg is not available on this system".into()))
    }

    /// Get the ffprobe path or fail the job with a clear error.
    pub fn require_ffprobe(&self) -> Result<&PathBuf> {
        self.ffprobe
            .as_ref()
            .ok_or_else(|| Error::Internal("ffprobe is not available on this system".into()))
    }
}

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// Non-zero exits and timeouts both surface as [`Error::EncodeFailed`]
    /// with stderr attached.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let program_name = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::Internal(format!("{program_name}: failed to spawn: {e}")))?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(Error::EncodeFailed(format!(
                        "{program_name} exited with status {}: {}",
                        output.status,
                        tool_output.stderr.trim()
                    )));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(Error::EncodeFailed(format!(
                "{program_name}: I/O error waiting for process: {e}"
            ))),
            Err(_elapsed) => Err(Error::EncodeFailed(format!(
                "{program_name} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
