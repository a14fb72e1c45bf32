//! Bounded subprocess execution
//!
//! Every child the harness runs to completion goes through [`SystemRunner`]:
//! output is drained on reader threads so a chatty child cannot fill its pipe
//! and stall, and the parent polls `try_wait` against a hard deadline.
//!
//! On unix each child leads its own process group. At the deadline the whole
//! group is killed, so a grandchild (the client under `timeout`, or anything a
//! shell forked) cannot outlive the budget or keep the output pipes open.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use super::interfaces::{CommandRunner, HarnessError, HarnessResult};

/// Poll interval while waiting on a child.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to keep reading output once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Exit value reported when a child had to be killed at the deadline and the
/// platform gave no code back. Matches the `timeout(1)` convention.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// A fully described child invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment
    pub envs: Vec<(String, String)>,
    /// Variables removed from the inherited environment
    pub env_removals: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub deadline: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, deadline: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            env_removals: Vec::new(),
            cwd: None,
            deadline,
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
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_removals.push(key.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program and arguments joined for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        for key in &self.env_removals {
            cmd.env_remove(key);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

/// Captured result of a finished (or killed) child.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Normalised exit value, see [`exit_value`]
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// The deadline fired and the child was killed by the harness
    pub timed_out: bool,
    pub duration: Duration,
}

impl ProcessOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Fold an [`ExitStatus`] into a single integer.
///
/// Normal exits keep their code. A child terminated by a signal is reported as
/// the negated signal number, so SIGSEGV becomes `-11`.
pub fn exit_value(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Runs commands on the local machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> HarnessResult<ProcessOutput> {
        tracing::debug!(command = %spec.display(), deadline = ?spec.deadline, "spawning");

        let start = Instant::now();
        let mut child = spec.to_command().spawn().map_err(|source| HarnessError::Spawn {
            program: spec.program.display().to_string(),
            source,
        })?;

        let stdout_rx = child.stdout.take().map(spawn_reader);
        let stderr_rx = child.stderr.take().map(spawn_reader);

        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {}
                Err(e) => {
                    abandon(&mut child);
                    return Err(e.into());
                }
            }
            if start.elapsed() >= spec.deadline {
                timed_out = true;
                tracing::warn!(command = %spec.display(), "deadline reached, killing process group");
                kill_tree(&mut child);
                break child.wait().ok();
            }
            thread::sleep(POLL_INTERVAL);
        };

        let duration = start.elapsed();
        let exit_code = match status {
            Some(status) if !timed_out => exit_value(status),
            _ => TIMEOUT_EXIT_CODE,
        };

        // A descendant may still hold the pipes after the child exits.
        let read_until = Instant::now() + DRAIN_GRACE;
        Ok(ProcessOutput {
            exit_code,
            stdout: collect_output(stdout_rx, read_until),
            stderr: collect_output(stderr_rx, read_until),
            timed_out,
            duration,
        })
    }
}

/// Kill and reap a child whose status can no longer be tracked.
fn abandon(child: &mut Child) {
    kill_tree(child);
    let _ = child.wait();
}

/// SIGKILL the child's process group, falling back to the child alone.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let group = i32::try_from(child.id()).ok().map(Pid::from_raw);
    if let Some(group) = group {
        if let Err(e) = killpg(group, Signal::SIGKILL) {
            tracing::debug!("killpg failed ({e}), killing child only");
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Forward a pipe in chunks until EOF.
fn spawn_reader(mut pipe: impl Read + Send + 'static) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Everything a reader forwarded before EOF or `until`, whichever comes first.
fn collect_output(rx: Option<Receiver<Vec<u8>>>, until: Instant) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    let mut bytes = Vec::new();
    loop {
        let wait = until.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!("output pipe still open after child exit, truncating");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
