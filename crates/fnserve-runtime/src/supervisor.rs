//! Deadline and cancellation enforcement around one child process.
//!
//! The supervisor owns the child handle for the whole invocation and races
//! three signals: process exit, deadline, and caller cancellation. Whichever
//! fires first decides the single outcome. Deadline and cancellation both kill
//! the child and discard whatever output it produced so far.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

use fnserve_common::{InvocationContext, CONTEXT_ENV_VAR};

use crate::error::InvokeError;

const READ_CHUNK: usize = 8 * 1024;

enum Race {
    Finished(io::Result<(ExitStatus, Vec<u8>)>),
    DeadlineExceeded,
    Canceled,
}

/// Attach the invocation context to a command: `FN_CONTEXT` plus one entry per
/// context env key. Context env entries are applied last and shadow inherited
/// variables of the same name.
pub fn prepare(cmd: &mut Command, ctx: &InvocationContext) -> Result<(), InvokeError> {
    let ctx_json = ctx.to_json()?;
    cmd.env(CONTEXT_ENV_VAR, ctx_json);
    for (k, v) in &ctx.env {
        cmd.env(k, v);
    }
    Ok(())
}

/// Spawn `cmd`, feed it `event` on stdin and wait for one of exit, deadline or
/// cancellation. A zero `deadline` disables the deadline.
pub async fn supervise(
    mut cmd: Command,
    runtime: &'static str,
    artifact: &Path,
    event: &[u8],
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, InvokeError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| InvokeError::Spawn {
        path: artifact.to_path_buf(),
        source,
    })?;
    let pid = child.id();
    tracing::debug!(runtime, artifact=%artifact.display(), ?pid, "function process started");

    let feeder = tokio::spawn(feed_stdin(child.stdin.take(), event.to_vec()));
    let mut collector = tokio::spawn(drain_merged(child.stdout.take(), child.stderr.take()));

    let race = {
        let run = async {
            let status = child.wait().await?;
            let output = (&mut collector).await.map_err(io::Error::other)??;
            Ok::<_, io::Error>((status, output))
        };
        let timer = async {
            if deadline.is_zero() {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(deadline).await
            }
        };

        tokio::select! {
            biased;
            res = run => Race::Finished(res),
            _ = timer => Race::DeadlineExceeded,
            _ = cancel.cancelled() => Race::Canceled,
        }
    };

    feeder.abort();

    match race {
        Race::Finished(Ok((status, output))) => {
            if status.success() {
                Ok(output)
            } else {
                Err(InvokeError::Execution {
                    runtime,
                    code: status.code(),
                    output: String::from_utf8_lossy(&output).into_owned(),
                })
            }
        }
        Race::Finished(Err(e)) => {
            collector.abort();
            terminate(&mut child).await;
            Err(InvokeError::Io(e))
        }
        Race::DeadlineExceeded => {
            collector.abort();
            terminate(&mut child).await;
            tracing::warn!(runtime, artifact=%artifact.display(), ?deadline, "function deadline exceeded, process killed");
            Err(InvokeError::DeadlineExceeded(deadline))
        }
        Race::Canceled => {
            collector.abort();
            terminate(&mut child).await;
            tracing::info!(runtime, artifact=%artifact.display(), "invocation canceled, process killed");
            Err(InvokeError::Canceled)
        }
    }
}

/// Best-effort kill and reap. A child that already exited is not an error.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error=%e, "kill skipped, process already gone");
    }
    let _ = child.wait().await;
}

async fn feed_stdin(stdin: Option<tokio::process::ChildStdin>, event: Vec<u8>) {
    let Some(mut stdin) = stdin else {
        return;
    };
    // A child that never reads stdin closes the pipe early; that is not a failure.
    if let Err(e) = stdin.write_all(&event).await {
        tracing::debug!(error=%e, "function did not consume the full event");
        return;
    }
    let _ = stdin.shutdown().await;
}

/// Read stdout and stderr concurrently into one buffer in arrival order.
async fn drain_merged(
    mut stdout: Option<ChildStdout>,
    mut stderr: Option<ChildStderr>,
) -> io::Result<Vec<u8>> {
    let mut merged = Vec::new();
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => {
                match read? {
                    0 => stdout = None,
                    n => merged.extend_from_slice(&out_buf[..n]),
                }
            }
            read = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => {
                match read? {
                    0 => stderr = None,
                    n => merged.extend_from_slice(&err_buf[..n]),
                }
            }
        }
    }

    Ok(merged)
}

async fn read_some<R: AsyncRead + Unpin>(reader: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => Ok(0),
    }
}
