//! Supervised child processes with a hard deadline
//!
//! The child is placed in its own process group so that everything it
//! spawns (the bots) can be killed together. Every path through
//! [`supervise`] ends with the group killed and the child reaped, and returns
//! within `deadline + 2 * grace`. Dropping the future mid-run still kills the
//! group.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Bytes of stdout/stderr kept from the end of each stream
pub const OUTPUT_TAIL_BYTES: usize = 64 * 1024;

/// How a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Completed(ExitStatus),
    /// Killed after running past its deadline
    DeadlineExceeded,
}

/// Result of a supervised run
#[derive(Debug)]
pub struct Supervised {
    pub exit: Exit,
    /// Tail of standard output
    pub stdout: Vec<u8>,
    /// Tail of standard error
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl Supervised {
    pub fn succeeded(&self) -> bool {
        matches!(self.exit, Exit::Completed(status) if status.success())
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run `command` to completion or until `deadline`, whichever comes first.
///
/// Only a failure to spawn is an `Err`; a process that misbehaves is
/// reported through [`Exit`].
pub async fn supervise(
    mut command: Command,
    deadline: Duration,
    grace: Duration,
) -> std::io::Result<Supervised> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let started = Instant::now();
    let mut child = command.spawn()?;
    let pid = child.id();
    let mut group = GroupGuard(pid);
    tracing::debug!(pid = ?pid, "supervised process started");

    let stdout = spawn_tail_reader(child.stdout.take());
    let stderr = spawn_tail_reader(child.stderr.take());

    let exit = match tokio::time::timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => {
            // Bots outliving the simulator would hold its pipes open
            group.kill();
            Exit::Completed(status)
        }
        Ok(Err(err)) => {
            group.kill();
            let _ = child.start_kill();
            let _ = tokio::time::timeout(grace, child.wait()).await;
            return Err(err);
        }
        Err(_) => {
            tracing::warn!(
                pid = ?pid,
                deadline_ms = deadline.as_millis() as u64,
                "supervised process exceeded deadline, killing process group"
            );
            group.kill();
            let _ = child.start_kill();
            if tokio::time::timeout(grace, child.wait()).await.is_err() {
                tracing::error!(pid = ?pid, "process did not exit after SIGKILL");
            }
            Exit::DeadlineExceeded
        }
    };

    let stdout = join_tail(stdout, grace).await;
    let stderr = join_tail(stderr, grace).await;

    Ok(Supervised {
        exit,
        stdout,
        stderr,
        elapsed: started.elapsed(),
    })
}

/// Kills the child's process group once, explicitly or on drop.
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn kill(&mut self) {
        kill_group(self.0.take());
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(err) => tracing::warn!(pid, error = %err, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

fn spawn_tail_reader<R>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream.map(|stream| tokio::spawn(read_tail(stream, OUTPUT_TAIL_BYTES)))
}

async fn join_tail(handle: Option<JoinHandle<Vec<u8>>>, grace: Duration) -> Vec<u8> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            handle.abort();
            Vec::new()
        }
    }
}

async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut tail = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
        }
    }
    tail
}

#[cfg(all(test, unix))]
#[path = "supervisor_tests.rs"]
mod supervisor_tests;
