//! Child process supervision on unix
//!
//! Each launch owns three kinds of tasks: one reader per output pipe, and a
//! supervisor that waits for the child, applies cancellation, drains the
//! readers and resolves the completion.

use futures::future::join_all;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taphouse_config::RunnerConfig;
use taphouse_errors::PlatformError;
use taphouse_events::{FailureContext, ProcessCommandDescriptor, ProcessEvent};
use taphouse_types::{OutputLine, ProcessExit, StreamKind, TerminationReason};
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::lines::LineSplitter;
use super::{
    Completion, HandleShared, LineStream, PlatformCommand, ProcessHandle, ProcessLauncher,
    RunningProcess,
};
use crate::core::PlatformContext;

const READ_CHUNK: usize = 8 * 1024;

/// Launches commands with tokio, streaming their output line by line
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    merge_stderr: bool,
    terminate_grace: Duration,
    drain_timeout: Duration,
}

impl ProcessRunner {
    #[must_use]
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            merge_stderr: config.merge_stderr,
            terminate_grace: config.terminate_grace(),
            drain_timeout: config.drain_timeout(),
        }
    }

    /// Read stderr through the stdout pipe (default) or through its own pipe
    #[must_use]
    pub fn with_merge_stderr(mut self, merge: bool) -> Self {
        self.merge_stderr = merge;
        self
    }

    #[must_use]
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    fn spawn(&self, cmd: &PlatformCommand) -> Result<(Child, Vec<PipeSource>), PlatformError> {
        let program = cmd.program();
        let pipe_error = |err: io::Error| PlatformError::ProcessExecutionFailed {
            command: program.to_string(),
            message: format!("failed to create output pipe: {err}"),
        };

        let mut command = Command::new(program);
        command
            .args(cmd.get_args())
            .envs(cmd.get_env_vars().iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .process_group(0);
        if let Some(dir) = cmd.get_current_dir() {
            command.current_dir(dir);
        }

        let mut sources = Vec::with_capacity(2);
        let (reader, writer) = io::pipe().map_err(pipe_error)?;
        if self.merge_stderr {
            let stderr = writer.try_clone().map_err(pipe_error)?;
            command.stdout(writer).stderr(stderr);
            sources.push(PipeSource::open(reader, StreamKind::Combined).map_err(pipe_error)?);
        } else {
            let (err_reader, err_writer) = io::pipe().map_err(pipe_error)?;
            command.stdout(writer).stderr(err_writer);
            sources.push(PipeSource::open(reader, StreamKind::Stdout).map_err(pipe_error)?);
            sources.push(PipeSource::open(err_reader, StreamKind::Stderr).map_err(pipe_error)?);
        }

        let child = command
            .spawn()
            .map_err(|err| PlatformError::from_spawn(program, &err))?;
        // The write ends live in `command`; the readers only see EOF once the
        // parent's copies are closed.
        drop(command);
        Ok((child, sources))
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(&RunnerConfig::default())
    }
}

impl ProcessLauncher for ProcessRunner {
    fn start(&self, ctx: &PlatformContext, cmd: PlatformCommand) -> RunningProcess {
        let descriptor = cmd.descriptor();

        let (child, sources) = match self.spawn(&cmd) {
            Ok(spawned) => spawned,
            Err(error) => {
                tracing::debug!(command = %descriptor, %error, "spawn failed");
                ctx.emit_process(ProcessEvent::SpawnFailed {
                    command: descriptor.clone(),
                    failure: FailureContext::from_error(&error),
                });
                let exit = ProcessExit::spawn_failed(error);
                let shared = Arc::new(HandleShared::finished(exit.clone()));
                return RunningProcess {
                    handle: ProcessHandle::new(shared, descriptor),
                    lines: LineStream::closed(),
                    completion: Completion::ready(exit),
                };
            }
        };

        let pid = child.id();
        tracing::debug!(command = %descriptor, ?pid, "process started");
        ctx.emit_process(ProcessEvent::Started {
            command: descriptor.clone(),
            pid,
        });

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let line_count = Arc::new(AtomicU64::new(0));
        let readers = sources
            .into_iter()
            .map(|source| {
                let sink = LineSink {
                    tx: line_tx.clone(),
                    count: Arc::clone(&line_count),
                };
                tokio::spawn(source.read_lines(sink))
            })
            .collect();
        drop(line_tx);

        let shared = Arc::new(HandleShared::running(pid));
        let (exit_tx, exit_rx) = oneshot::channel();
        let supervisor = Supervisor {
            shared: Arc::clone(&shared),
            ctx: ctx.clone(),
            command: descriptor.clone(),
            terminate_grace: self.terminate_grace,
            drain_timeout: self.drain_timeout,
            started: Instant::now(),
            line_count,
        };
        tokio::spawn(supervisor.run(child, readers, exit_tx));

        RunningProcess {
            handle: ProcessHandle::new(shared, descriptor),
            lines: LineStream::new(line_rx),
            completion: Completion::new(exit_rx),
        }
    }
}

/// Read end of one output pipe
struct PipeSource {
    pipe: pipe::Receiver,
    stream: StreamKind,
}

impl PipeSource {
    fn open(reader: io::PipeReader, stream: StreamKind) -> io::Result<Self> {
        let pipe = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
        Ok(Self { pipe, stream })
    }

    async fn read_lines(mut self, sink: LineSink) -> Result<(), PlatformError> {
        let mut splitter = LineSplitter::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let result = loop {
            match self.pipe.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    for line in splitter.push(&buf[..n]) {
                        sink.send(OutputLine::new(self.stream, line));
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    break Err(PlatformError::OutputReadFailed {
                        message: format!("{:?} pipe: {err}", self.stream),
                    })
                }
            }
        };
        if let Some(line) = splitter.finish() {
            sink.send(OutputLine::new(self.stream, line));
        }
        result
    }
}

struct LineSink {
    tx: mpsc::UnboundedSender<OutputLine>,
    count: Arc<AtomicU64>,
}

impl LineSink {
    fn send(&self, line: OutputLine) {
        // A dropped stream only means nobody is listening any more
        if self.tx.send(line).is_ok() {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

enum Wake {
    Exited(io::Result<ExitStatus>),
    CancelRequested,
}

struct Supervisor {
    shared: Arc<HandleShared>,
    ctx: PlatformContext,
    command: ProcessCommandDescriptor,
    terminate_grace: Duration,
    drain_timeout: Duration,
    started: Instant,
    line_count: Arc<AtomicU64>,
}

impl Supervisor {
    async fn run(
        self,
        mut child: Child,
        readers: Vec<JoinHandle<Result<(), PlatformError>>>,
        exit_tx: oneshot::Sender<ProcessExit>,
    ) {
        // An exit that is already observable wins over a pending cancel
        let wake = tokio::select! {
            biased;
            status = child.wait() => Wake::Exited(status),
            () = self.shared.cancel.notified() => Wake::CancelRequested,
        };

        let (status, cancelled) = match wake {
            Wake::Exited(status) => (status, false),
            Wake::CancelRequested => (self.terminate(&mut child).await, true),
        };

        let exit = match status {
            Ok(status) => exit_from_status(status, cancelled),
            Err(err) => {
                tracing::warn!(command = %self.command, error = %err, "failed to wait for process");
                ProcessExit {
                    exit_code: -1,
                    reason: if cancelled {
                        TerminationReason::Cancelled
                    } else {
                        TerminationReason::Exited
                    },
                }
            }
        };
        let _ = self.shared.exit.set(exit.clone());

        self.drain(readers).await;

        self.ctx.emit_process(ProcessEvent::Exited {
            command: self.command.clone(),
            exit: exit.clone(),
            duration_ms: millis(self.started.elapsed()),
            lines: self.line_count.load(Ordering::Relaxed),
        });
        let _ = exit_tx.send(exit);
    }

    /// SIGTERM the process group, then SIGKILL it once the grace period runs out
    async fn terminate(&self, child: &mut Child) -> io::Result<ExitStatus> {
        if let Some(pid) = self.shared.pid {
            signal_group(pid, libc::SIGTERM);
            self.ctx.emit_process(ProcessEvent::CancelRequested { pid });
        }

        if let Ok(status) = tokio::time::timeout(self.terminate_grace, child.wait()).await {
            return status;
        }

        if let Some(pid) = self.shared.pid {
            signal_group(pid, libc::SIGKILL);
            self.ctx.emit_process(ProcessEvent::KillEscalated {
                pid,
                grace_ms: millis(self.terminate_grace),
            });
        }
        if let Err(err) = child.start_kill() {
            tracing::debug!(error = %err, "start_kill after SIGKILL");
        }
        child.wait().await
    }

    /// Wait for the readers to hit EOF. A descendant that inherited the pipe
    /// can keep it open past the child's exit, so this is bounded.
    async fn drain(&self, readers: Vec<JoinHandle<Result<(), PlatformError>>>) {
        let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();
        match tokio::time::timeout(self.drain_timeout, join_all(readers)).await {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            self.ctx.emit_process(ProcessEvent::OutputReadFailed {
                                message: err.to_string(),
                            });
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "output reader task failed");
                        }
                    }
                }
            }
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                self.ctx.emit_process(ProcessEvent::OutputReadFailed {
                    message: format!(
                        "output still open {}ms after exit, stopped reading",
                        millis(self.drain_timeout)
                    ),
                });
            }
        }
    }
}

fn exit_from_status(status: ExitStatus, cancelled: bool) -> ProcessExit {
    let (exit_code, signalled) = match (status.code(), status.signal()) {
        (Some(code), _) => (code, false),
        (None, Some(signal)) => (-signal, true),
        (None, None) => (-1, false),
    };
    let reason = if cancelled {
        TerminationReason::Cancelled
    } else if signalled {
        TerminationReason::SignalKilled
    } else {
        TerminationReason::Exited
    };
    ProcessExit { exit_code, reason }
}

/// Send `signal` to the process group led by `pid`, falling back to the
/// process alone when the group is gone
#[allow(unsafe_code)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours
    let rc = unsafe { libc::kill(-pid, signal) };
    if rc != 0 {
        // SAFETY: as above
        unsafe {
            libc::kill(pid, signal);
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let exit = exit_from_status(ExitStatus::from_raw(3 << 8), false);
        assert_eq!(exit, ProcessExit::exited(3));

        // raw wait status 9 is "killed by SIGKILL"
        let exit = exit_from_status(ExitStatus::from_raw(9), false);
        assert_eq!(exit.exit_code, -9);
        assert_eq!(exit.reason, TerminationReason::SignalKilled);

        let exit = exit_from_status(ExitStatus::from_raw(15), true);
        assert_eq!(exit.exit_code, -15);
        assert_eq!(exit.reason, TerminationReason::Cancelled);
    }

    #[test]
    fn test_runner_from_config() {
        let config = RunnerConfig {
            terminate_grace_ms: 250,
            merge_stderr: false,
            ..RunnerConfig::default()
        };
        let runner = ProcessRunner::new(&config);
        assert!(!runner.merge_stderr);
        assert_eq!(runner.terminate_grace, Duration::from_millis(250));
    }
}
