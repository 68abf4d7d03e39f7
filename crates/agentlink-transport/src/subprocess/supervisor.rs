//! Child supervision
//!
//! A single task owns the `Child`. It settles the exit slot exactly once,
//! either when the child exits on its own or after carrying out a
//! termination request.

use crate::lines::LineStream;
use crate::traits::{ProcessExit, StderrSink};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, ChildStderr};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Time allowed between SIGTERM and SIGKILL
const TERM_WAIT: Duration = Duration::from_millis(500);

/// Termination request sent to the supervisor
#[derive(Debug, Clone, Copy)]
pub(crate) enum Termination {
    /// Wait for the grace period, then SIGTERM and kill
    Graceful,
    /// SIGTERM now, kill if still alive after `TERM_WAIT`
    Forced,
}

pub(crate) async fn supervise(
    mut child: Child,
    mut requests: mpsc::UnboundedReceiver<Termination>,
    exit: watch::Sender<Option<ProcessExit>>,
    grace_period: Duration,
) {
    let pid = child.id();

    let outcome = tokio::select! {
        status = child.wait() => settle(status, false),
        request = requests.recv() => {
            // every handle dropped: treat as graceful
            let request = request.unwrap_or(Termination::Graceful);
            debug!(?pid, ?request, "terminating child");
            shutdown(&mut child, request, &mut requests, grace_period).await
        }
    };

    debug!(?pid, code = ?outcome.code, killed = outcome.killed, "child exited");
    exit.send_replace(Some(outcome));
}

async fn shutdown(
    child: &mut Child,
    request: Termination,
    requests: &mut mpsc::UnboundedReceiver<Termination>,
    grace_period: Duration,
) -> ProcessExit {
    if let Termination::Graceful = request {
        tokio::select! {
            status = child.wait() => return settle(status, false),
            _ = tokio::time::sleep(grace_period) => {
                debug!(pid = ?child.id(), ?grace_period, "grace period elapsed");
            }
            Some(Termination::Forced) = requests.recv() => {}
        }
    }

    if send_sigterm(child.id())
        && let Ok(status) = tokio::time::timeout(TERM_WAIT, child.wait()).await
    {
        return settle(status, true);
    }

    if let Err(e) = child.start_kill() {
        warn!(pid = ?child.id(), error = %e, "failed to kill child");
    }
    settle(child.wait().await, true)
}

fn settle(status: std::io::Result<ExitStatus>, killed: bool) -> ProcessExit {
    match status {
        Ok(status) => ProcessExit {
            code: status.code(),
            killed,
        },
        Err(e) => {
            warn!(error = %e, "failed to reap child");
            ProcessExit::killed()
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: Option<u32>) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            debug!(pid, error = %e, "SIGTERM failed");
            false
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: Option<u32>) -> bool {
    false
}

/// Forward each stderr line to the sink, or to the debug log without one
pub(crate) async fn drain_stderr(stderr: ChildStderr, sink: Option<StderrSink>, pid: Option<u32>) {
    let mut lines = LineStream::new(stderr);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = String::from_utf8_lossy(&line).into_owned();
                match &sink {
                    Some(sink) => sink(line),
                    None => debug!(?pid, stderr = %line, "child stderr"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(?pid, error = %e, "stderr read failed");
                break;
            }
        }
    }
}
