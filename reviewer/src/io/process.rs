//! Helpers for running child processes with timeouts and bounded output.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        captured_text(&self.stdout, self.stdout_truncated)
    }

    pub fn stderr_lossy(&self) -> String {
        captured_text(&self.stderr, self.stderr_truncated)
    }

    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        if self.stdout_truncated > 0 {
            format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            )
        } else {
            String::new()
        }
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is drained concurrently while the child runs. `output_limit_bytes` bounds the
/// amount of stdout/stderr kept in memory (bytes beyond this are discarded while still
/// draining the pipe). The child is killed when the timeout elapses or when the returned
/// future is dropped.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes = output_limit_bytes))]
pub async fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = tokio::spawn(read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = tokio::spawn(read_stream_limited(stderr, output_limit_bytes));

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let input = input.to_vec();
        // Written from a task so a child that never reads cannot block the timeout.
        tokio::spawn(async move {
            if let Err(err) = child_stdin.write_all(&input).await {
                debug!(err = %err, "child closed stdin early");
            }
            // Dropping stdin closes it so the child sees EOF.
        });
    }

    let mut timed_out = false;
    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status.context("wait for command")?,
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().await.context("kill command")?;
            child.wait().await.context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).await.context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).await.context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn captured_text(bytes: &[u8], truncated: usize) -> String {
    let kept = if truncated > 0 {
        complete_utf8_prefix(bytes)
    } else {
        bytes
    };
    String::from_utf8_lossy(kept).into_owned()
}

/// Drop a trailing multibyte character split by the capture limit.
fn complete_utf8_prefix(bytes: &[u8]) -> &[u8] {
    let tail_start = bytes.len().saturating_sub(4);
    let Some(lead) = (tail_start..bytes.len())
        .rev()
        .find(|&i| bytes[i] & 0xC0 != 0x80)
    else {
        return bytes;
    };
    match std::str::from_utf8(&bytes[lead..]) {
        Err(err) if err.error_len().is_none() => &bytes[..lead],
        _ => bytes,
    }
}

async fn join_output(handle: JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader task panicked")),
    }
}

async fn read_stream_limited<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await.context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_status() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf hello; printf oops >&2; exit 3");
        let output = run_command_with_timeout(cmd, None, Duration::from_secs(10), 1024)
            .await
            .expect("run");
        assert_eq!(output.stdout_lossy(), "hello");
        assert_eq!(output.stderr_lossy(), "oops");
        assert_eq!(output.status.code(), Some(3));
        assert!(!output.timed_out);
    }

    #[tokio::test]
    async fn bounds_captured_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 0123456789");
        let output = run_command_with_timeout(cmd, None, Duration::from_secs(10), 4)
            .await
            .expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
        assert_eq!(
            output.stdout_truncated_notice("sh"),
            "\n[sh stdout truncated 6 bytes]\n"
        );
    }

    #[test]
    fn split_character_is_dropped_from_truncated_capture() {
        assert_eq!(complete_utf8_prefix("aé".as_bytes()), "aé".as_bytes());
        assert_eq!(complete_utf8_prefix(&"aé".as_bytes()[..2]), b"a");
        assert_eq!(complete_utf8_prefix(&"a€".as_bytes()[..3]), b"a");
        assert_eq!(captured_text(&"a€".as_bytes()[..3], 1), "a");
        assert_eq!(complete_utf8_prefix(b""), b"");
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let cmd = Command::new("cat");
        let output =
            run_command_with_timeout(cmd, Some(b"piped"), Duration::from_secs(10), 1024)
                .await
                .expect("run");
        assert_eq!(output.stdout_lossy(), "piped");
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output = run_command_with_timeout(cmd, None, Duration::from_millis(100), 1024)
            .await
            .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }
}
