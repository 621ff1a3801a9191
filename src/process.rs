//! Argv-direct process execution shared by every framework adapter.
//!
//! Grounded on `offload`'s `provider::local` (`examples/imbue-ai-offload/src/provider/local.rs`)
//! for the spawn/wait/timeout plumbing (`Stdio::piped`, `BufReader` draining
//! each pipe after the process exits), but diverging from it in one
//! deliberate way: `offload::provider::Command::to_shell_string()` feeds
//! `/bin/sh -c <string>`, which this crate's adapters must never do — test
//! commands are spawned as `argv` directly, never through a shell.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use crate::error::AdapterError;

/// A process invocation: program plus argv, never a single shell string.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Captured output and exit status of a completed (or killed) process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

/// Runs `spec`, waiting up to `timeout`. On timeout, sends a polite
/// terminate signal, waits `grace_window`, then hard-kills. Output captured
/// so far is returned even on timeout so adapters can still extract a
/// partial error signature.
pub async fn run_with_timeout(
    spec: &ProcessSpec,
    timeout: Duration,
    grace_window: Duration,
) -> Result<ProcessOutput, AdapterError> {
    let started = Instant::now();

    let mut command = TokioCommand::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let mut child = command
        .spawn()
        .map_err(|e| AdapterError::SpawnFailed(format!("{}: {e}", spec.program)))?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let wait_fut = child.wait();
    tokio::pin!(wait_fut);

    let status = match tokio::time::timeout(timeout, &mut wait_fut).await {
        Ok(status) => Some(status.map_err(AdapterError::Io)?),
        None => {
            polite_terminate(&mut child);
            match tokio::time::timeout(grace_window, &mut wait_fut).await {
                Ok(status) => Some(status.map_err(AdapterError::Io)?),
                None => {
                    let _ = child.start_kill();
                    let _ = wait_fut.await;
                    None
                }
            }
        }
    };

    let stdout = drain_pipe(stdout_pipe.take()).await;
    let stderr = drain_pipe(stderr_pipe.take()).await;

    let timed_out = status.is_none();
    Ok(ProcessOutput {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        duration: started.elapsed(),
        timed_out,
    })
}

async fn drain_pipe<R>(pipe: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return String::new();
    };
    let mut reader = BufReader::new(pipe);
    let mut out = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => out.push_str(&line),
            Err(_) => break,
        }
    }
    out
}

/// Sends SIGTERM on unix; on other platforms there is no polite-terminate
/// primitive exposed by `tokio::process`, so this falls through to the
/// grace-window hard kill.
fn polite_terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid is a valid, still-running child pid owned by this process.
            unsafe {
                libc_kill(pid as i32, 15 /* SIGTERM */);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child;
    }
}

#[cfg(unix)]
unsafe fn libc_kill(pid: i32, sig: i32) {
    unsafe extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    unsafe {
        kill(pid, sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_with_timeout_captures_exit_code() {
        let spec = ProcessSpec::new("true", std::env::temp_dir());
        let out = run_with_timeout(&spec, Duration::from_secs(5), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn test_run_with_timeout_kills_hung_process() {
        let spec = ProcessSpec::new("sleep", std::env::temp_dir()).arg("30");
        let out = run_with_timeout(
            &spec,
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(out.timed_out);
        assert!(out.exit_code.is_none());
    }
}
