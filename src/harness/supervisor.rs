//! Battle server supervision
//!
//! [`ServiceSupervisor`] owns at most one server process. `start()` spawns a
//! fresh instance and polls `GET /health` until it answers, the process dies,
//! or the attempt budget runs out. `stop()` sends SIGTERM, waits out the grace
//! period, then kills.
//!
//! Phases never call `start`/`stop` directly; they hold a [`ServiceGuard`],
//! whose `Drop` stops the service on every exit path.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{HealthPolicy, RunnerConfig, SERVER_PORT_VAR};

use super::interfaces::{CommandRunner, HarnessError, HarnessResult, ServiceControl};
use super::process::{CommandSpec, SystemRunner};

/// Poll interval while waiting for a terminated server to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Pause after clearing stale instances so their port is released.
const STALE_KILL_SETTLE: Duration = Duration::from_millis(500);

/// Lifecycle of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Spawned, not yet answering health probes
    Starting,
    /// Answered a health probe while alive
    Healthy,
    /// Exited or was stopped; never reused
    Dead,
}

/// A live server process.
#[derive(Debug)]
pub struct ServiceHandle {
    child: Child,
    pub pid: u32,
    pub port: u16,
    pub state: ServiceState,
}

impl ServiceHandle {
    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }
}

/// What the supervisor needs from [`RunnerConfig`].
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub port_flag: Option<String>,
    pub health: HealthPolicy,
    pub stop_grace: Duration,
    pub kill_stale: bool,
}

impl SupervisorSettings {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            executable: config.resolve_program(&config.server_executable),
            working_dir: config.working_dir.clone(),
            host: config.server_host.clone(),
            port: config.server_port,
            port_flag: config.service_port_flag.clone(),
            health: config.health,
            stop_grace: config.stop_grace,
            kill_stale: config.kill_stale,
        }
    }

    pub fn health_url(&self) -> String {
        format!("http://{}:{}/health", self.host, self.port)
    }
}

/// Owns the start/stop lifecycle of one server process at a time.
pub struct ServiceSupervisor {
    settings: SupervisorSettings,
    handle: Option<ServiceHandle>,
    last_state: Option<ServiceState>,
    probes_sent: u32,
    agent: ureq::Agent,
}

impl ServiceSupervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(settings.health.probe_timeout))
            .build();
        Self {
            settings,
            handle: None,
            last_state: None,
            probes_sent: 0,
            agent: ureq::Agent::new_with_config(config),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(SupervisorSettings::from_config(config))
    }

    /// State of the current or most recent instance.
    pub fn state(&self) -> Option<ServiceState> {
        self.handle.as_ref().map(|h| h.state).or(self.last_state)
    }

    /// Health probes sent during the most recent `start()`.
    pub fn probes_sent(&self) -> u32 {
        self.probes_sent
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn probe(&self) -> bool {
        match self.agent.get(&self.settings.health_url()).call() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::trace!("health probe failed: {e}");
                false
            }
        }
    }

    /// Best-effort removal of same-named servers from an earlier run.
    fn kill_stale_instances(&self) {
        let Some(name) = self.settings.executable.file_name() else {
            return;
        };
        let spec = CommandSpec::new("killall", Duration::from_secs(2)).arg(name.to_string_lossy());
        match SystemRunner.run(&spec) {
            Ok(output) if output.success() => {
                tracing::info!(name = %name.to_string_lossy(), "killed stale server instances");
                thread::sleep(STALE_KILL_SETTLE);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("stale instance cleanup skipped: {e}"),
        }
    }

    fn spawn(&self) -> HarnessResult<ServiceHandle> {
        let mut cmd = Command::new(&self.settings.executable);
        if let Some(flag) = &self.settings.port_flag {
            cmd.arg(flag).arg(self.settings.port.to_string());
        }
        cmd.env(SERVER_PORT_VAR, self.settings.port.to_string())
            .current_dir(&self.settings.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            program: self.settings.executable.display().to_string(),
            source,
        })?;
        let pid = child.id();
        tracing::debug!(pid, port = self.settings.port, "server spawned");

        Ok(ServiceHandle {
            child,
            pid,
            port: self.settings.port,
            state: ServiceState::Starting,
        })
    }

    /// Reap a handle whose process already exited.
    fn bury(&mut self, mut handle: ServiceHandle) {
        let _ = handle.child.wait();
        handle.state = ServiceState::Dead;
        self.last_state = Some(ServiceState::Dead);
    }
}

impl ServiceControl for ServiceSupervisor {
    #[tracing::instrument(skip_all, fields(port = self.settings.port))]
    fn start(&mut self) -> HarnessResult<()> {
        // A second start never reuses the old process.
        self.stop();
        self.probes_sent = 0;

        if self.settings.kill_stale {
            self.kill_stale_instances();
        }

        let mut handle = match self.spawn() {
            Ok(handle) => handle,
            Err(e) => {
                self.last_state = Some(ServiceState::Dead);
                return Err(HarnessError::ServiceStart(e.to_string()));
            }
        };

        let policy = self.settings.health;
        for attempt in 1..=policy.attempts {
            self.probes_sent = attempt;
            let answered = self.probe();

            if handle.has_exited() {
                tracing::warn!(pid = handle.pid, attempt, "server exited during startup");
                self.bury(handle);
                return Err(HarnessError::ServiceStart("server process died during startup".to_string()));
            }

            if answered {
                handle.state = ServiceState::Healthy;
                tracing::debug!(pid = handle.pid, attempt, "server healthy");
                self.handle = Some(handle);
                return Ok(());
            }

            if attempt < policy.attempts {
                thread::sleep(policy.interval);
            }
        }

        self.handle = Some(handle);
        self.stop();
        Err(HarnessError::ServiceStart(format!(
            "server failed to respond on port {} after {} attempts",
            self.settings.port, policy.attempts
        )))
    }

    fn stop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        if !handle.has_exited() {
            terminate(&mut handle.child);
            let deadline = Instant::now() + self.settings.stop_grace;
            while !handle.has_exited() && Instant::now() < deadline {
                thread::sleep(EXIT_POLL_INTERVAL);
            }
            if !handle.has_exited() {
                tracing::warn!(pid = handle.pid, "server ignored SIGTERM, killing");
                let _ = handle.child.kill();
            }
        }

        self.bury(handle);
    }

    fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.pid)
    }
}

impl Drop for ServiceSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        tracing::debug!("SIGTERM failed ({e}), killing");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}

// ============================================================================
// Scoped acquisition
// ============================================================================

/// A started service that is stopped when the guard goes out of scope.
pub struct ServiceGuard<'a> {
    service: &'a mut dyn ServiceControl,
}

impl<'a> ServiceGuard<'a> {
    /// Start the service. On failure nothing is left running.
    pub fn acquire(service: &'a mut dyn ServiceControl) -> HarnessResult<Self> {
        service.start()?;
        Ok(Self { service })
    }

    pub fn pid(&self) -> Option<u32> {
        self.service.pid()
    }
}

impl Drop for ServiceGuard<'_> {
    fn drop(&mut self) {
        self.service.stop();
    }
}
