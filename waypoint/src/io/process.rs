//! Running child processes with a timeout and bounded output capture.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// What a demo command printed and how it ended.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes drained but discarded beyond the output limit.
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Last `max_chars` characters of stderr, or of stdout when stderr is blank.
    pub fn tail(&self, max_chars: usize) -> String {
        let stream = if self.stderr.iter().all(u8::is_ascii_whitespace) {
            &self.stdout
        } else {
            &self.stderr
        };
        let text = String::from_utf8_lossy(stream);
        let text = text.trim_end();
        let count = text.chars().count();
        if count <= max_chars {
            return text.to_string();
        }
        text.chars().skip(count - max_chars).collect()
    }
}

/// Run one demo command for the smoke gate.
///
/// The child gets no stdin. It is killed once `timeout` elapses so a hanging
/// demo cannot stall `next`. Each stream keeps its first `output_limit_bytes`
/// for the triage reason and only counts the rest.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .inspect_err(|err| error!(%err, "failed to spawn demo command"))
        .context("spawn command")?;
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(anyhow!("child output was not piped"));
    };
    // Readers run concurrently with the wait so a chatty demo never blocks on a full pipe.
    let stdout_reader = thread::spawn(move || read_capped(stdout, output_limit_bytes));
    let stderr_reader = thread::spawn(move || read_capped(stderr, output_limit_bytes));

    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;
    let (stdout, stdout_truncated) = join_output(stdout_reader).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_reader).context("join stderr")?;

    debug!(
        exit_code = ?status.code(),
        timed_out,
        stdout_truncated,
        stderr_truncated,
        "demo command finished"
    );
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Wait up to `timeout`; past the deadline the child is killed and reaped.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "demo command hit the deadline, killing");
    child.kill().context("kill command")?;
    let status = child.wait().context("reap killed command")?;
    Ok((status, true))
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

/// Drain `reader` to EOF. Returns the kept prefix and the count of dropped bytes.
fn read_capped<R: Read>(mut reader: R, cap: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::with_capacity(cap.min(8192));
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk).context("read demo output")?;
        if read == 0 {
            return Ok((kept, dropped));
        }
        let keep = cap.saturating_sub(kept.len()).min(read);
        kept.extend_from_slice(&chunk[..keep]);
        dropped += read - keep;
    }
}
