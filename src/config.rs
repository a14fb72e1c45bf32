//! Runner configuration
//!
//! Every path, port and timeout the harness uses lives in one [`RunnerConfig`]
//! value handed to the coordinator at construction. Nothing is read from
//! process-wide state after that.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable the client reads for its network check interval.
pub const NETWORK_CHECK_INTERVAL_VAR: &str = "NETWORK_CHECK_INTERVAL_SECONDS";
/// Environment variable the client reads for its network request timeout.
pub const NETWORK_TIMEOUT_VAR: &str = "NETWORK_TIMEOUT_MS";
/// Exported to client tests that run under a supervised server.
pub const SERVER_PID_VAR: &str = "TEST_SERVER_PID";
/// Exported to the supervised server.
pub const SERVER_PORT_VAR: &str = "BATTLE_SERVER_PORT";

/// Harness configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Game client under test
    pub client_executable: PathBuf,
    /// Battle server binary
    pub server_executable: PathBuf,
    /// Working directory for every child process
    pub working_dir: PathBuf,
    /// Host the harness uses to reach the supervised server
    pub server_host: String,
    /// Port the supervised server listens on
    pub server_port: u16,
    /// When set, the server is launched with `<flag> <port>`
    pub service_port_flag: Option<String>,
    /// Per-test budget for client tests
    pub default_timeout: Duration,
    /// Fixed budget for integration tests
    pub integration_timeout: Duration,
    /// Budget for server-failure tests
    pub failure_path_timeout: Duration,
    /// Budget for `--list-tests`
    pub discovery_timeout: Duration,
    /// Budget for the server's `--run-tests`
    pub unit_test_timeout: Duration,
    /// Budget for the lint command
    pub lint_timeout: Duration,
    /// Value passed to `--timing-speed-scale`
    pub timing_speed_scale: u32,
    /// Pause between consecutive tests in a batch
    pub inter_test_delay: Duration,
    /// External wall-clock enforcer wrapped around each test
    pub timeout_launcher: Option<PathBuf>,
    /// Extra time the internal guard allows past the launcher's budget
    pub launcher_grace: Duration,
    /// Health polling policy for the supervised server
    pub health: HealthPolicy,
    /// How long a terminated server may take before it is killed
    pub stop_grace: Duration,
    /// Kill stray server processes left over from an earlier run
    pub kill_stale: bool,
    /// Fast-fail settings for server-failure tests
    pub network_overlay: NetworkOverlay,
    /// Static lint of the test sources
    pub lint: Option<LintCommand>,
    /// Count lint violations as a failed unit instead of a warning
    pub strict_lint: bool,
    /// Which optional phases run
    pub phases: PhaseSelection,
    /// ANSI colors in console output
    pub color: bool,
    /// Where to write the JSON summary, if anywhere
    pub report_json: Option<PathBuf>,
}

/// Bounded liveness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Maximum number of probes
    pub attempts: u32,
    /// Sleep between probes
    pub interval: Duration,
    /// Per-probe HTTP timeout
    pub probe_timeout: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
        }
    }
}

/// Shortened network checks for tests that simulate a server outage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOverlay {
    pub check_interval_seconds: String,
    pub timeout_ms: String,
}

impl Default for NetworkOverlay {
    fn default() -> Self {
        Self {
            check_interval_seconds: "0.25".to_string(),
            timeout_ms: "200".to_string(),
        }
    }
}

impl NetworkOverlay {
    /// Variable/value pairs to export.
    pub fn vars(&self) -> [(&'static str, &str); 2] {
        [
            (NETWORK_CHECK_INTERVAL_VAR, self.check_interval_seconds.as_str()),
            (NETWORK_TIMEOUT_VAR, self.timeout_ms.as_str()),
        ]
    }

    /// Variables that must not leak into other tests.
    pub fn var_names() -> [&'static str; 2] {
        [NETWORK_CHECK_INTERVAL_VAR, NETWORK_TIMEOUT_VAR]
    }
}

/// External lint invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Script that must exist (relative to the working dir) for lint to run
    pub script: Option<PathBuf>,
}

impl Default for LintCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python3"),
            args: vec!["scripts/lint_tests.py".to_string()],
            script: Some(PathBuf::from("scripts/lint_tests.py")),
        }
    }
}

/// Optional phases. Discovery and the per-test phases always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSelection {
    pub lint: bool,
    pub server_unit: bool,
    pub endpoint: bool,
    pub visible_pass: bool,
}

impl Default for PhaseSelection {
    fn default() -> Self {
        Self {
            lint: true,
            server_unit: true,
            endpoint: true,
            visible_pass: false,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            client_executable: PathBuf::from("./output/my_name_chef.exe"),
            server_executable: PathBuf::from("./output/battle_server.exe"),
            working_dir: PathBuf::from("."),
            server_host: "localhost".to_string(),
            server_port: 8080,
            service_port_flag: None,
            default_timeout: Duration::from_secs(30),
            integration_timeout: Duration::from_secs(60),
            failure_path_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(10),
            unit_test_timeout: Duration::from_secs(30),
            lint_timeout: Duration::from_secs(60),
            timing_speed_scale: 5,
            inter_test_delay: Duration::from_millis(100),
            timeout_launcher: Some(PathBuf::from("timeout")),
            launcher_grace: Duration::from_secs(5),
            health: HealthPolicy::default(),
            stop_grace: Duration::from_secs(5),
            kill_stale: true,
            network_overlay: NetworkOverlay::default(),
            lint: Some(LintCommand::default()),
            strict_lint: false,
            phases: PhaseSelection::default(),
            color: true,
            report_json: None,
        }
    }
}

impl RunnerConfig {
    /// Create a config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_executable = path.into();
        self
    }

    pub fn with_server_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_executable = path.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_server_host(mut self, host: impl Into<String>) -> Self {
        self.server_host = host.into();
        self
    }

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    /// Set the per-test budget for client tests
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_health(mut self, health: HealthPolicy) -> Self {
        self.health = health;
        self
    }

    pub fn with_phases(mut self, phases: PhaseSelection) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_timeout_launcher(mut self, launcher: Option<PathBuf>) -> Self {
        self.timeout_launcher = launcher;
        self
    }

    pub fn with_lint(mut self, lint: Option<LintCommand>) -> Self {
        self.lint = lint;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Settings suited to scripted fakes: no launcher, no pauses, fast polling.
    pub fn for_tests() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            timeout_launcher: None,
            inter_test_delay: Duration::ZERO,
            kill_stale: false,
            stop_grace: Duration::from_millis(500),
            health: HealthPolicy {
                attempts: 15,
                interval: Duration::from_millis(20),
                probe_timeout: Duration::from_millis(200),
            },
            color: false,
            ..Self::default()
        }
    }

    /// Resolve a configured program path against the working directory.
    ///
    /// Bare names (`timeout`, `python3`) are left for `PATH` lookup; relative
    /// paths with a directory part are anchored at `working_dir` so children
    /// launched with a different cwd still find them.
    pub fn resolve_program(&self, program: &Path) -> PathBuf {
        let anchored = program.is_relative() && program.components().count() > 1;
        if anchored && self.working_dir != Path::new(".") {
            self.working_dir.join(program)
        } else {
            program.to_path_buf()
        }
    }

    /// Base URL of the supervised server.
    pub fn service_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}
