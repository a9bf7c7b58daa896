//! Subprocess driver for backend recipes and hook commands.
//!
//! Every child process gets piped stdout/stderr, and both streams are
//! drained concurrently line-by-line into a [`LogSink`] tagged with the
//! caller's prefix (the unit's `"[hook@id] "` prefix for hook runs). Children
//! are spawned with kill-on-drop so cancelling the owning task terminates
//! the process; the subsequent `wait` reaps it.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::GooseError;

/// Destination for subprocess output lines.
///
/// Cheap to clone; writers share one underlying sink. The default sink is
/// standard error (hook output must never interleave with the event stream
/// on stdout); tests capture lines in memory instead.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<SinkKind>>,
}

enum SinkKind {
    Stderr,
    Memory(Vec<String>),
}

impl LogSink {
    /// Sink writing each line to standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkKind::Stderr)),
        }
    }

    /// Sink capturing lines in memory, for tests and buffered displays.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkKind::Memory(Vec::new()))),
        }
    }

    /// Append one line.
    pub fn line(&self, line: &str) {
        let mut sink = self.inner.lock().expect("log sink poisoned");
        match &mut *sink {
            SinkKind::Stderr => eprintln!("{line}"),
            SinkKind::Memory(lines) => lines.push(line.to_string()),
        }
    }

    /// Captured lines of a memory sink; empty for a stderr sink.
    #[must_use]
    pub fn captured(&self) -> Vec<String> {
        let sink = self.inner.lock().expect("log sink poisoned");
        match &*sink {
            SinkKind::Stderr => Vec::new(),
            SinkKind::Memory(lines) => lines.clone(),
        }
    }
}

async fn drain_stream<R>(reader: R, prefix: String, sink: LogSink)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink.line(&format!("{prefix}{line}"));
    }
}

/// Spawn `command`, stream both output channels into `sink`, and wait.
///
/// Lines are tagged `{prefix}[stdout] ` / `{prefix}[stderr] `. The child is
/// killed if the surrounding future is dropped.
pub async fn stream_command(
    mut command: Command,
    prefix: &str,
    sink: &LogSink,
) -> Result<ExitStatus> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let mut child = command
        .spawn()
        .with_context(|| format!("failed spawning {program:?}"))?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");
    let drain_stdout = tokio::spawn(drain_stream(
        stdout,
        format!("{prefix}[stdout] "),
        sink.clone(),
    ));
    let drain_stderr = tokio::spawn(drain_stream(
        stderr,
        format!("{prefix}[stderr] "),
        sink.clone(),
    ));

    let status = child.wait().await.context("failed waiting for child process")?;
    let (out, err) = tokio::join!(drain_stdout, drain_stderr);
    out.context("stdout drain task failed")?;
    err.context("stderr drain task failed")?;
    Ok(status)
}

/// Run one backend recipe step; non-zero exit is a [`GooseError::BackendFailure`].
pub async fn run_step(
    command: Command,
    prefix: &str,
    sink: &LogSink,
    operation: &str,
) -> Result<()> {
    let status = stream_command(command, prefix, sink).await?;
    if !status.success() {
        return Err(GooseError::BackendFailure {
            operation: operation.to_string(),
            detail: status.to_string(),
        }
        .into());
    }
    Ok(())
}
