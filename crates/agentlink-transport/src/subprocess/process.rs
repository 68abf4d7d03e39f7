//! Process management for the CLI subprocess

use super::supervisor::{self, Termination};
use crate::error::{Result, TransportError};
use crate::lines::LineStream;
use crate::traits::{ProcessExit, StderrSink, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info};

/// Configuration for spawning a CLI process
#[derive(Clone)]
pub struct ProcessConfig {
    /// Path to the CLI executable
    pub program: PathBuf,

    /// Arguments to pass to the CLI
    pub args: Vec<String>,

    /// Environment variables set on top of the inherited environment
    pub env: HashMap<String, String>,

    /// Start from an empty environment instead of inheriting the parent's
    pub clear_env: bool,

    /// Working directory of the child
    pub cwd: Option<PathBuf>,

    /// How long a graceful termination waits before killing
    pub grace_period: Duration,

    /// Receives each stderr line
    pub stderr: Option<StderrSink>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl std::fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessConfig")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("clear_env", &self.clear_env)
            .field("cwd", &self.cwd)
            .field("grace_period", &self.grace_period)
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

impl ProcessConfig {
    /// Create a new process configuration
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            clear_env: false,
            cwd: None,
            grace_period: Duration::from_secs(5),
            stderr: None,
        }
    }

    /// Add an argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Pass only the variables set with [`with_env`](Self::with_env)
    ///
    /// Keeps credentials in the parent's environment away from the child.
    pub fn with_clear_env(mut self, clear_env: bool) -> Self {
        self.clear_env = clear_env;
        self
    }

    /// Set the working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the stderr sink
    pub fn with_stderr(mut self, sink: StderrSink) -> Self {
        self.stderr = Some(sink);
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// A running CLI process
///
/// One supervisor task owns the child and settles its exit status. stdin
/// writes go through a single async lock so that lines from different
/// writers never interleave.
pub struct ProcessTransport {
    program: String,
    pid: Option<u32>,
    stdin: Mutex<Option<BufWriter<ChildStdin>>>,
    stdout: std::sync::Mutex<Option<LineStream>>,
    termination: mpsc::UnboundedSender<Termination>,
    exit: watch::Receiver<Option<ProcessExit>>,
}

impl ProcessTransport {
    /// Spawn a new CLI process
    ///
    /// Must be called inside a tokio runtime. Fails before spawning when the
    /// working directory is not a directory.
    pub fn spawn(config: ProcessConfig) -> Result<Self> {
        let program = config.program_name();

        if let Some(cwd) = &config.cwd
            && !cwd.is_dir()
        {
            return Err(TransportError::InvalidWorkingDirectory(cwd.clone()));
        }

        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args);
        if config.clear_env {
            cmd.env_clear();
        }
        cmd.envs(&config.env);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        info!(program = %program, ?pid, args = ?config.args, "spawned agent process");

        tokio::spawn(supervisor::drain_stderr(stderr, config.stderr.clone(), pid));

        let (termination, requests) = mpsc::unbounded_channel();
        let (exit_tx, exit) = watch::channel(None);
        tokio::spawn(supervisor::supervise(
            child,
            requests,
            exit_tx,
            config.grace_period,
        ));

        Ok(Self {
            program,
            pid,
            stdin: Mutex::new(Some(BufWriter::new(stdin))),
            stdout: std::sync::Mutex::new(Some(LineStream::new(stdout))),
            termination,
            exit,
        })
    }

    /// OS process id, if the child was still running at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn request(&self, termination: Termination) {
        // the supervisor is gone once the exit is settled
        let _ = self.termination.send(termination);
    }
}

fn missing_pipe(name: &str) -> TransportError {
    TransportError::Io(std::io::Error::other(format!("child {name} was not piped")))
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn write_line(&self, line: &[u8]) -> Result<()> {
        if self.exit.borrow().is_some() {
            return Err(TransportError::BrokenPipe);
        }

        let mut stdin = self.stdin.lock().await;
        let writer = stdin.as_mut().ok_or(TransportError::BrokenPipe)?;

        let mut written = writer.write_all(line).await;
        if written.is_ok() && !line.ends_with(b"\n") {
            written = writer.write_all(b"\n").await;
        }
        if written.is_ok() {
            written = writer.flush().await;
        }

        match written {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(program = %self.program, pid = ?self.pid, error = %e, "stdin write failed");
                stdin.take();
                match e.kind() {
                    ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
                        Err(TransportError::BrokenPipe)
                    }
                    _ => Err(TransportError::Io(e)),
                }
            }
        }
    }

    fn read_lines(&self) -> Result<LineStream> {
        self.stdout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::StreamTaken)
    }

    async fn close_input(&self) -> Result<()> {
        if let Some(mut writer) = self.stdin.lock().await.take() {
            debug!(pid = ?self.pid, "closing child stdin");
            if let Err(e) = writer.shutdown().await {
                debug!(pid = ?self.pid, error = %e, "stdin shutdown failed");
            }
        }
        Ok(())
    }

    async fn terminate(&self, graceful: bool) -> Result<ProcessExit> {
        if graceful {
            self.close_input().await?;
            self.request(Termination::Graceful);
        } else {
            self.request(Termination::Forced);
        }
        Ok(self.wait_exit().await)
    }

    fn begin_shutdown(&self) {
        // a writer holding the lock only delays exit until the grace period ends
        if let Ok(mut stdin) = self.stdin.try_lock() {
            stdin.take();
        }
        self.request(Termination::Graceful);
    }

    fn exit_status(&self) -> Option<ProcessExit> {
        *self.exit.borrow()
    }

    async fn wait_exit(&self) -> ProcessExit {
        let mut exit = self.exit.clone();
        match exit.wait_for(Option::is_some).await {
            Ok(status) => (*status).unwrap_or_else(ProcessExit::killed),
            // supervisor dropped without settling: runtime shutting down
            Err(_) => ProcessExit::killed(),
        }
    }
}

impl std::fmt::Debug for ProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTransport")
            .field("program", &self.program)
            .field("pid", &self.pid)
            .field("exit", &*self.exit.borrow())
            .finish_non_exhaustive()
    }
}
