//! In-memory agent child for tests
//!
//! [`StubTransport`] implements [`Transport`] over two duplex pipes. A script
//! plays the child: it reads the host's requests and emits records through a
//! [`StubChild`]. The script finishing counts as a clean exit, a panic as exit
//! code 1, and termination aborts it the way a kill would.
//!
//! ```
//! use agentlink::testing::StubTransport;
//! use agentlink_protocol::{AssistantMessage, ContentBlock, ResultMessage};
//!
//! # async fn demo() {
//! let transport = StubTransport::spawn(|mut child| async move {
//!     while let Ok(Some(_prompt)) = child.next_request().await {
//!         let _ = child
//!             .emit(AssistantMessage::new(vec![ContentBlock::text("4")], Some("s1".into())))
//!             .await;
//!         let _ = child.emit(ResultMessage::new("s1", 1)).await;
//!     }
//! });
//! # drop(transport);
//! # }
//! ```

use agentlink_protocol::{Message, OutboundRequest, decode_request, encode_message};
use agentlink_transport::{LineStream, ProcessExit, Result, Transport, TransportError};
use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Default grace period of a stub
pub const STUB_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// The child's end of a [`StubTransport`]
pub struct StubChild {
    requests: LineStream,
    stdout: DuplexStream,
}

impl StubChild {
    /// Write one record to the host
    pub async fn emit(&mut self, message: impl Into<Message>) -> io::Result<()> {
        let line = encode_message(&message.into()).map_err(io::Error::other)?;
        self.stdout.write_all(&line).await?;
        self.stdout.flush().await
    }

    /// Write raw bytes as one line, for malformed input
    pub async fn emit_raw(&mut self, line: &[u8]) -> io::Result<()> {
        self.stdout.write_all(line).await?;
        if !line.ends_with(b"\n") {
            self.stdout.write_all(b"\n").await?;
        }
        self.stdout.flush().await
    }

    /// Next request from the host, `None` once the host closed stdin
    pub async fn next_request(&mut self) -> io::Result<Option<OutboundRequest>> {
        loop {
            let line = match self.requests.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(TransportError::Io(e)) => return Err(e),
                Err(e) => return Err(io::Error::other(e)),
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return decode_request(&line)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
        }
    }
}

impl std::fmt::Debug for StubChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubChild").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
enum Termination {
    Graceful,
    Forced,
}

/// A [`Transport`] whose child is an async script
pub struct StubTransport {
    stdin: Mutex<Option<DuplexStream>>,
    stdout: std::sync::Mutex<Option<LineStream>>,
    termination: mpsc::UnboundedSender<Termination>,
    exit: watch::Receiver<Option<ProcessExit>>,
}

impl StubTransport {
    /// Start a script with the default grace period
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn<F, Fut>(script: F) -> Self
    where
        F: FnOnce(StubChild) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_grace(STUB_GRACE_PERIOD, script)
    }

    /// Start a script with a custom grace period
    pub fn spawn_with_grace<F, Fut>(grace_period: Duration, script: F) -> Self
    where
        F: FnOnce(StubChild) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (host_stdin, child_stdin) = tokio::io::duplex(PIPE_CAPACITY);
        let (child_stdout, host_stdout) = tokio::io::duplex(PIPE_CAPACITY);

        let child = StubChild {
            requests: LineStream::new(child_stdin),
            stdout: child_stdout,
        };
        let task = tokio::spawn(script(child));

        let (termination, requests) = mpsc::unbounded_channel();
        let (exit_tx, exit) = watch::channel(None);
        tokio::spawn(async move {
            let outcome = supervise(task, requests, grace_period).await;
            debug!(code = ?outcome.code, killed = outcome.killed, "stub child exited");
            exit_tx.send_replace(Some(outcome));
        });

        Self {
            stdin: Mutex::new(Some(host_stdin)),
            stdout: std::sync::Mutex::new(Some(LineStream::new(host_stdout))),
            termination,
            exit,
        }
    }

    fn request(&self, termination: Termination) {
        let _ = self.termination.send(termination);
    }
}

async fn supervise(
    mut task: JoinHandle<()>,
    mut requests: mpsc::UnboundedReceiver<Termination>,
    grace_period: Duration,
) -> ProcessExit {
    let request = tokio::select! {
        joined = &mut task => return settle(joined),
        request = requests.recv() => request.unwrap_or(Termination::Graceful),
    };

    if let Termination::Graceful = request {
        tokio::select! {
            joined = &mut task => return settle(joined),
            _ = tokio::time::sleep(grace_period) => {}
            Some(Termination::Forced) = requests.recv() => {}
        }
    }

    task.abort();
    let _ = task.await;
    ProcessExit::killed()
}

fn settle(joined: std::result::Result<(), JoinError>) -> ProcessExit {
    match joined {
        Ok(()) => ProcessExit::exited(0),
        Err(e) if e.is_panic() => ProcessExit::exited(1),
        Err(_) => ProcessExit::killed(),
    }
}

#[async_trait]
impl Transport for StubTransport {
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

        written.map_err(|_| {
            stdin.take();
            TransportError::BrokenPipe
        })
    }

    fn read_lines(&self) -> Result<LineStream> {
        self.stdout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::StreamTaken)
    }

    async fn close_input(&self) -> Result<()> {
        self.stdin.lock().await.take();
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
            Err(_) => ProcessExit::killed(),
        }
    }
}

impl std::fmt::Debug for StubTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubTransport")
            .field("exit", &*self.exit.borrow())
            .finish_non_exhaustive()
    }
}
