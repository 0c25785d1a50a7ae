/// Execution Engine - Isolated Script Execution
///
/// **Core Responsibility:**
/// Run one synthesized script in a fresh, disposable interpreter and hand
/// back whatever it printed.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (local process, Docker, ...)
/// - Engine does NOT know the harness protocol
/// - Engine does NOT decide pass/fail
///
/// Backends implement [`ExecutionEngine`] so the isolation mechanism can be
/// swapped without touching synthesis or evaluation.
use async_trait::async_trait;
use pyjudge_common::config::{EngineBackend, RunnerConfig};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

/// Resource bounds applied to every execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Wall-clock budget; the interpreter is killed when it runs out
    pub timeout: Duration,
    /// Ceiling for each captured stream
    pub max_output_bytes: usize,
}

impl ExecutionLimits {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::from_config(&RunnerConfig::default())
    }
}

/// Output of an interpreter that ran to completion with exit code 0
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to launch interpreter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("Execution exceeded the {limit}-byte {stream} limit")]
    OutputLimitExceeded { stream: &'static str, limit: usize },

    #[error("Execution failed (exit code {})", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    NonZeroExit {
        code: Option<i64>,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to collect interpreter output: {0}")]
    Io(#[from] std::io::Error),

    #[error("{context}: {source}")]
    Container {
        context: &'static str,
        #[source]
        source: bollard::errors::Error,
    },
}

impl EngineError {
    /// Best-effort text for the user: stderr, else stdout, else the message
    pub fn diagnostic(&self) -> String {
        if let EngineError::NonZeroExit { stdout, stderr, .. } = self {
            if !stderr.trim().is_empty() {
                return stderr.clone();
            }
            if !stdout.trim().is_empty() {
                return stdout.clone();
            }
        }
        self.to_string()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::TimedOut { .. })
    }
}

/// Isolation backend capable of running one script
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run `script` in a fresh interpreter bounded by `limits`
    async fn execute(
        &self,
        script: &str,
        limits: &ExecutionLimits,
    ) -> Result<RawOutput, EngineError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Build the engine selected by `config`
pub fn build_engine(config: &RunnerConfig) -> anyhow::Result<Arc<dyn ExecutionEngine>> {
    let engine: Arc<dyn ExecutionEngine> = match config.backend {
        EngineBackend::Process => Arc::new(ProcessEngine::from_config(config)),
        EngineBackend::Docker => Arc::new(crate::docker::DockerEngine::from_config(config)?),
    };
    Ok(engine)
}

/// Local-process engine: one `<interpreter> <args> -c <script>` per execution
///
/// **Isolation Rules:**
/// 1. A new OS process per call; nothing is reused between tests
/// 2. The script travels as an argument, never through a shared file
/// 3. stdin is closed
/// 4. The process is killed on timeout, on output overflow and on drop
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    interpreter: String,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(interpreter: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            args,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.interpreter(), config.interpreter_args.clone())
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.args)
            .arg("-c")
            .arg(script)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so anything the script spawns can be killed with it
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

#[async_trait]
impl ExecutionEngine for ProcessEngine {
    #[instrument(skip(self, script), fields(interpreter = %self.interpreter, script_bytes = script.len(), timeout_ms = limits.timeout_ms()))]
    async fn execute(
        &self,
        script: &str,
        limits: &ExecutionLimits,
    ) -> Result<RawOutput, EngineError> {
        let start_time = Instant::now();

        let mut child = self.command(script).spawn().map_err(|source| EngineError::Spawn {
            program: self.interpreter.clone(),
            source,
        })?;

        let group = child.id();

        let collected = tokio::time::timeout(
            limits.timeout,
            collect_output(&mut child, group, limits.max_output_bytes),
        )
        .await;

        let (stdout, stderr, code) = match collected {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(error = %e, "Execution aborted, killing interpreter");
                kill_process_group(group);
                kill_quietly(&mut child).await;
                return Err(e);
            }
            Err(_) => {
                warn!(timeout_ms = limits.timeout_ms(), "Execution timed out, killing interpreter");
                kill_process_group(group);
                kill_quietly(&mut child).await;
                return Err(EngineError::TimedOut {
                    timeout_ms: limits.timeout_ms(),
                });
            }
        };

        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        if code != Some(0) {
            debug!(exit_code = ?code, execution_time_ms, "Interpreter exited with failure");
            return Err(EngineError::NonZeroExit {
                code,
                stdout,
                stderr,
            });
        }

        debug!(execution_time_ms, stdout_bytes = stdout.len(), "Interpreter finished");
        Ok(RawOutput {
            stdout,
            stderr,
            execution_time_ms,
        })
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// Drain both pipes concurrently and wait for exit
///
/// Once the interpreter exits its process group is killed. Leftover
/// descendants would otherwise keep the pipes open and stall the reads.
async fn collect_output(
    child: &mut Child,
    group: Option<u32>,
    limit: usize,
) -> Result<(String, String, Option<i64>), EngineError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr was not piped"))?;

    let exited = async {
        let status = child.wait().await?;
        kill_process_group(group);
        Ok::<_, EngineError>(status)
    };

    let (stdout, stderr, status) = tokio::try_join!(
        read_limited(stdout, limit, "stdout"),
        read_limited(stderr, limit, "stderr"),
        exited,
    )?;

    Ok((stdout, stderr, status.code().map(i64::from)))
}

/// Read a stream to the end, failing once more than `limit` bytes arrive
pub(crate) async fn read_limited<R>(
    reader: R,
    limit: usize,
    stream: &'static str,
) -> Result<String, EngineError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await?;

    if buf.len() > limit {
        return Err(EngineError::OutputLimitExceeded { stream, limit });
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// SIGKILL every process left in the interpreter's group
#[cfg(unix)]
fn kill_process_group(group: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => debug!(pgid, "Killed interpreter process group"),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "Failed to kill interpreter process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_group: Option<u32>) {}

async fn kill_quietly(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Interpreter already gone");
    }
}
