//! Build invoker: runs the external bootstrap pipeline for one slug.
//!
//! The command is spawned as `<program> <args...> <slug>` in the configured
//! working directory, with both output streams captured. One wall-clock
//! deadline, measured from spawn, covers both the exit and the draining of
//! the output pipes. When it passes, the child's whole process group is
//! killed.

use crate::config::BuildSettings;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::debug;

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Output bytes collected so far by one reader task.
type Captured = Arc<Mutex<Vec<u8>>>;

/// What one build run produced.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// `None` when the process was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub exit_ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// Decides whether stderr content means the build failed.
///
/// A stderr line is benign if it is blank or its trimmed, lower-cased text
/// starts with one of the markers. Any other line fails the build.
#[derive(Debug, Clone)]
pub struct DiagnosticPolicy {
    benign_markers: Vec<String>,
}

impl DiagnosticPolicy {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            benign_markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Every line counts as a failure.
    pub fn strict() -> Self {
        Self {
            benign_markers: Vec::new(),
        }
    }

    pub fn is_benign(&self, line: &str) -> bool {
        let line = line.trim().to_lowercase();
        line.is_empty() || self.benign_markers.iter().any(|m| line.starts_with(m))
    }

    /// The first stderr line that is not benign, if any.
    pub fn first_offending_line<'a>(&self, stderr: &'a str) -> Option<&'a str> {
        stderr.lines().find(|line| !self.is_benign(line)).map(str::trim)
    }
}

/// Spawns the build command under a timeout.
#[derive(Debug, Clone)]
pub struct BuildInvoker {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    policy: DiagnosticPolicy,
}

impl BuildInvoker {
    /// `command` is the program followed by its leading arguments.
    pub fn new(command: Vec<String>, timeout: Duration, policy: DiagnosticPolicy) -> Result<Self> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::Config("build command must name a program".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            working_dir: None,
            timeout,
            policy,
        })
    }

    pub fn from_settings(settings: &BuildSettings) -> Result<Self> {
        let invoker = Self::new(
            settings.command.clone(),
            Duration::from_secs(settings.timeout_secs),
            DiagnosticPolicy::new(&settings.benign_markers),
        )?;
        Ok(match &settings.working_dir {
            Some(dir) => invoker.working_dir(dir.clone()),
            None => invoker,
        })
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the build for `slug`.
    ///
    /// Only a failure to spawn is an `Err`. Non-zero exits and timeouts are
    /// reported in the returned [`BuildOutput`]. On timeout, whatever the
    /// build printed before it was killed is kept.
    pub async fn run(&self, slug: &str) -> Result<BuildOutput> {
        // Fixed to the process root unless configured. Relative programs
        // resolve against here too.
        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        debug!(
            program = %self.program,
            slug,
            dir = %working_dir.display(),
            "spawning build"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(slug)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so background jobs the build starts can be
        // killed along with it.
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut child = cmd.spawn().map_err(|e| {
            Error::Build(format!("failed to spawn {}: {e}", self.program))
        })?;
        let pgid = child.id();

        let stdout = Captured::default();
        let stderr = Captured::default();
        let mut stdout_task = tokio::spawn(read_stream(child.stdout.take(), Arc::clone(&stdout)));
        let mut stderr_task = tokio::spawn(read_stream(child.stderr.take(), Arc::clone(&stderr)));

        // Grandchildren can hold the pipes open after the child exits, so
        // the drain counts against the deadline too.
        let finished = tokio::time::timeout_at(deadline, async {
            let status = child.wait().await?;
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
            Ok::<_, std::io::Error>(status)
        })
        .await;

        match finished {
            Ok(Ok(status)) => Ok(BuildOutput {
                exit_code: status.code(),
                exit_ok: status.success(),
                stdout: take_captured(&stdout),
                stderr: take_captured(&stderr),
                timed_out: false,
                duration_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => {
                kill_build(&mut child, pgid, slug).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(Error::Io(e))
            }
            Err(_elapsed) => {
                kill_build(&mut child, pgid, slug).await;
                stdout_task.abort();
                stderr_task.abort();
                Ok(BuildOutput {
                    exit_code: None,
                    exit_ok: false,
                    stdout: take_captured(&stdout),
                    stderr: take_captured(&stderr),
                    timed_out: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }

    /// Apply the success policy to a finished build.
    pub fn verdict(&self, output: &BuildOutput) -> Result<()> {
        if output.timed_out {
            return Err(Error::Timeout {
                after_ms: output.duration_ms,
            });
        }
        if !output.exit_ok {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let detail = self
                .policy
                .first_offending_line(&output.stderr)
                .map(|l| format!(": {l}"))
                .unwrap_or_default();
            return Err(Error::Build(format!("pipeline exited with {code}{detail}")));
        }
        if let Some(line) = self.policy.first_offending_line(&output.stderr) {
            return Err(Error::Build(format!("pipeline reported an error: {line}")));
        }
        Ok(())
    }
}

/// Drain an output stream, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// Reading continues past the cap so the child never blocks on a full pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>, sink: Captured) {
    let Some(mut handle) = handle else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match handle.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut buf = sink.lock().unwrap_or_else(|e| e.into_inner());
                let room = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

fn take_captured(captured: &Captured) -> String {
    let buf = std::mem::take(&mut *captured.lock().unwrap_or_else(|e| e.into_inner()));
    String::from_utf8_lossy(&buf).into_owned()
}

/// Kill the build's process group, then the child itself, and reap it.
async fn kill_build(child: &mut Child, pgid: Option<u32>, slug: &str) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pgid.and_then(|p| libc::pid_t::try_from(p).ok()) {
            // SAFETY: `pgid` is the pid of our own child, which was spawned
            // as the leader of a fresh process group.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc != 0 {
                debug!(slug, pgid, "process group already gone");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;

    // Fails harmlessly when the child already exited and was reaped.
    if let Err(e) = child.kill().await {
        debug!(slug, error = %e, "child already exited before kill");
    }
}
