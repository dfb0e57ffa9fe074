//! Tool invoker: runs the `clarinet` binary against a workspace.
//!
//! Defines the [`ToolRunner`] trait and the [`CommandOutput`] it returns.
//! [`ProcessRunner`] is the real implementation backed by
//! `tokio::process`; tests substitute a recording fake.
//!
//! A nonzero exit status is an ordinary outcome (a contract with a syntax
//! error, say) and comes back inside `CommandOutput`. Only failures to run
//! the process at all are reported as [`InvokeError`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Output from one subprocess run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn exit_succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }
}

/// A single command line to run inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Literal script piped to standard input, if any.
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, script: impl Into<String>) -> Self {
        self.stdin = Some(script.into());
        self
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("executable not found: {0}")]
    NotFound(String),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
}

/// Provider-agnostic command execution.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` with `workdir` as the current directory.
    async fn run(&self, invocation: &Invocation, workdir: &Path)
        -> Result<CommandOutput, InvokeError>;
}

/// Runs commands as local child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        workdir: &Path,
    ) -> Result<CommandOutput, InvokeError> {
        let program = invocation.program.display().to_string();
        tracing::debug!("Running `{}` in {}", invocation.display(), workdir.display());

        let mut child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(workdir)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    InvokeError::NotFound(program.clone())
                } else {
                    InvokeError::Spawn {
                        program: program.clone(),
                        source,
                    }
                }
            })?;

        let io_err = |source| InvokeError::Io {
            program: program.clone(),
            source,
        };

        // stdin is fed while stdout/stderr drain; the console echoes its
        // input, so writing first fills both pipes once the script is large.
        let stdin_pipe = child.stdin.take();
        let feed = async {
            if let (Some(script), Some(mut stdin)) = (&invocation.stdin, stdin_pipe) {
                // A console that exits early closes its end; that is not our fault.
                match stdin.write_all(script.as_bytes()).await {
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        tracing::debug!("{program} closed stdin before the script was written");
                    }
                    other => other.map_err(io_err)?,
                }
                drop(stdin);
            }
            Ok::<(), InvokeError>(())
        };
        let run = async {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output.map_err(io_err)
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_elapsed| InvokeError::Timeout {
                program: program.clone(),
                timeout: self.timeout,
            })??;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

/// Locate the tool binary.
///
/// Precedence: `<install_dir>/bin/<name>`, then `<cwd>/bin/<name>`, then the
/// bare name for `PATH` lookup at spawn time. The first candidate that exists
/// wins; the bare name is also the fallback when none do.
pub fn resolve_binary(install_dir: Option<&Path>, cwd: Option<&Path>, name: &str) -> PathBuf {
    let candidates = [install_dir, cwd]
        .into_iter()
        .flatten()
        .map(|base| base.join("bin").join(name));

    for candidate in candidates {
        if candidate.is_file() {
            return candidate;
        }
    }

    if which::which(name).is_err() {
        tracing::warn!("`{name}` not found next to the service, in ./bin, or on PATH");
    }
    PathBuf::from(name)
}

/// Directory of the running executable, used as the default install dir.
pub fn current_install_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
