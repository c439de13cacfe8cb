//! Launching external commands and consuming their output

pub mod lines;
pub mod runner;

use futures::Stream;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use taphouse_errors::PlatformError;
use taphouse_events::ProcessCommandDescriptor;
use taphouse_types::{OutputLine, ProcessExit};
use tokio::sync::{mpsc, oneshot, Notify};

use crate::core::PlatformContext;

/// Platform-specific command builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl PlatformCommand {
    /// Create a new platform command
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<str>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_string()));
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: Into<PathBuf>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable on top of the inherited environment
    pub fn env<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn get_current_dir(&self) -> Option<&PathBuf> {
        self.current_dir.as_ref()
    }

    #[must_use]
    pub fn get_env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    /// Command line as recorded in events
    #[must_use]
    pub fn descriptor(&self) -> ProcessCommandDescriptor {
        ProcessCommandDescriptor {
            program: self.program.clone(),
            args: self.args.clone(),
            cwd: self.current_dir.clone(),
        }
    }
}

/// Starts external processes.
///
/// `start` never fails: a command that cannot be launched yields a
/// `RunningProcess` whose line stream is already closed and whose completion
/// resolves to a spawn-failure exit. Must be called from within a tokio
/// runtime.
pub trait ProcessLauncher: Send + Sync {
    fn start(&self, ctx: &PlatformContext, cmd: PlatformCommand) -> RunningProcess;
}

/// A launched process: its control handle, its output and its final result
pub struct RunningProcess {
    pub handle: ProcessHandle,
    pub lines: LineStream,
    pub completion: Completion,
}

/// State shared between a handle and the task supervising the child
#[derive(Debug)]
pub(crate) struct HandleShared {
    pub(crate) pid: Option<u32>,
    pub(crate) cancel: Notify,
    cancel_requested: AtomicBool,
    pub(crate) exit: OnceLock<ProcessExit>,
}

impl HandleShared {
    pub(crate) fn running(pid: Option<u32>) -> Self {
        Self {
            pid,
            cancel: Notify::new(),
            cancel_requested: AtomicBool::new(false),
            exit: OnceLock::new(),
        }
    }

    pub(crate) fn finished(exit: ProcessExit) -> Self {
        let shared = Self::running(None);
        let _ = shared.exit.set(exit);
        shared
    }
}

/// Cloneable control handle for one launched process
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    shared: Arc<HandleShared>,
    command: Arc<ProcessCommandDescriptor>,
}

impl ProcessHandle {
    pub(crate) fn new(shared: Arc<HandleShared>, command: ProcessCommandDescriptor) -> Self {
        Self {
            shared,
            command: Arc::new(command),
        }
    }

    /// OS process id, `None` if the process never started
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.shared.pid
    }

    #[must_use]
    pub fn command(&self) -> &ProcessCommandDescriptor {
        &self.command
    }

    /// Ask the process to terminate.
    ///
    /// Sends SIGTERM to the process group and escalates to SIGKILL after the
    /// runner's grace period. Returns `false` without doing anything when the
    /// process has already been reaped or a cancel was already requested.
    pub fn cancel(&self) -> bool {
        if self.has_exited() {
            return false;
        }
        if self.shared.cancel_requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shared.cancel.notify_one();
        true
    }

    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::Acquire)
    }

    /// Whether the process has been reaped
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.shared.exit.get().is_some()
    }

    #[must_use]
    pub fn exit_status(&self) -> Option<ProcessExit> {
        self.shared.exit.get().cloned()
    }
}

/// Decoded output lines in the order they were read.
///
/// With merged output, order matches the order the child wrote to its
/// pipe. The stream ends once the process exited and its pipes drained.
#[derive(Debug)]
pub struct LineStream {
    rx: mpsc::UnboundedReceiver<OutputLine>,
}

impl LineStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<OutputLine>) -> Self {
        Self { rx }
    }

    /// A stream with no lines, already at its end
    #[must_use]
    pub fn closed() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self { rx }
    }

    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.rx.recv().await
    }

    /// Wait for at least one line, then take everything already buffered up
    /// to `limit` lines. Returns 0 only at the end of the stream.
    pub async fn next_batch(&mut self, buffer: &mut Vec<OutputLine>, limit: usize) -> usize {
        self.rx.recv_many(buffer, limit.max(1)).await
    }
}

impl Stream for LineStream {
    type Item = OutputLine;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Resolves exactly once with the final result of a launch
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<ProcessExit>,
}

impl Completion {
    pub(crate) fn new(rx: oneshot::Receiver<ProcessExit>) -> Self {
        Self { rx }
    }

    /// A completion that is already resolved
    #[must_use]
    pub fn ready(exit: ProcessExit) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(exit);
        Self { rx }
    }
}

impl Future for Completion {
    type Output = ProcessExit;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                ProcessExit::spawn_failed(PlatformError::ProcessExecutionFailed {
                    command: String::new(),
                    message: "process supervisor stopped".to_string(),
                })
            })
        })
    }
}

/// Everything a short-lived command printed, plus how it ended
#[derive(Debug, Clone)]
pub struct CollectedOutput {
    pub exit: ProcessExit,
    pub lines: Vec<OutputLine>,
}

impl CollectedOutput {
    /// Lines joined with `\n`, escapes preserved
    #[must_use]
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run a command to completion and gather all of its output
pub async fn collect_output<L>(
    launcher: &L,
    ctx: &PlatformContext,
    cmd: PlatformCommand,
) -> CollectedOutput
where
    L: ProcessLauncher + ?Sized,
{
    let RunningProcess {
        lines: mut stream,
        completion,
        ..
    } = launcher.start(ctx, cmd);

    let mut lines = Vec::new();
    while let Some(line) = stream.next_line().await {
        lines.push(line);
    }
    CollectedOutput {
        exit: completion.await,
        lines,
    }
}
