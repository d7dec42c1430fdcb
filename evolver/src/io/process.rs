//! Helpers for running child processes with timeouts and bounded output.

use std::io::{Read, Write};
use std::mem;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

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
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Extra time granted to the output readers after the child has been reaped.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// On timeout the child is killed and reaped before returning with `timed_out = true`.
///
/// The child leads its own process group, and that group is killed once the child has been
/// reaped on every path, so background descendants never outlive the call. Readers that are
/// still blocked after [`DRAIN_GRACE`] are abandoned, keeping whatever they captured so far.
#[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, output_limit_bytes))]
pub fn run_command_with_timeout(
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
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    // Feed stdin from its own thread so a child that never reads cannot block us past the timeout.
    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let input = input.to_vec();
        thread::spawn(move || {
            if let Err(err) = child_stdin.write_all(&input) {
                debug!(err = %err, "child closed stdin early");
            }
        });
    }

    let pid = child.id();
    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(pid);
            if let Err(err) = child.kill() {
                debug!(err = %err, "child already exited");
            }
            child.wait().context("wait command after kill")?
        }
    };
    kill_process_group(pid);

    let drain_deadline = Instant::now() + DRAIN_GRACE;
    let (stdout, stdout_truncated) = stdout_rx.collect(drain_deadline, "stdout")?;
    let (stderr, stderr_truncated) = stderr_rx.collect(drain_deadline, "stderr")?;

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

/// Bytes captured from one stream so far.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: usize,
}

/// A stream being drained on its own thread into a shared buffer.
struct StreamReader {
    captured: Arc<Mutex<Captured>>,
    done: Receiver<Result<()>>,
}

impl StreamReader {
    /// Wait for the reader until `deadline`, then take what it captured.
    ///
    /// A reader still blocked at the deadline is abandoned but its bytes are kept.
    fn collect(self, deadline: Instant, label: &str) -> Result<(Vec<u8>, usize)> {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(wait) {
            Ok(result) => result.with_context(|| format!("read {label}"))?,
            Err(RecvTimeoutError::Timeout) => {
                warn!(stream = label, "pipe still open after child exit, abandoning reader");
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("{label} reader thread panicked"));
            }
        }
        let mut captured = self
            .captured
            .lock()
            .map_err(|_| anyhow!("{label} buffer poisoned"))?;
        let truncated = captured.truncated;
        Ok((mem::take(&mut captured.bytes), truncated))
    }
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> StreamReader {
    let captured = Arc::new(Mutex::new(Captured::default()));
    let sink = Arc::clone(&captured);
    let (tx, done) = mpsc::channel();
    thread::spawn(move || {
        // The receiver may already be gone if the drain deadline passed.
        let _ = tx.send(read_stream_limited(reader, limit, &sink));
    });
    StreamReader { captured, done }
}

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

/// Kill every process left in the child's group (the child leads its own group).
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "pid out of range, cannot kill process group");
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "killed leftover process group members"),
        // Nothing left in the group.
        Err(Errno::ESRCH) => {}
        Err(err) => warn!(pid, err = %err, "process group kill failed"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize, sink: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = sink
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        let remaining = limit.saturating_sub(captured.bytes.len());
        let keep = n.min(remaining);
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }

    Ok(())
}
