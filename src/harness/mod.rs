//! Test orchestration engine
//!
//! Discovers the tests embedded in the game client and battle server, runs
//! each one in its own child process, supervises the server the client tests
//! talk to, checks the server's HTTP contract directly, and tallies the lot.
//!
//! Everything that touches the outside world sits behind a trait in
//! [`interfaces`], so the [`SuiteCoordinator`] can be driven by fakes.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod catalog;
pub mod coordinator;
pub mod discovery;
pub mod executor;
pub mod interfaces;
pub mod process;
pub mod reporter;
pub mod supervisor;
pub mod verifier;

pub use coordinator::{DiscoveredSuite, Phase, SuiteCoordinator};
pub use executor::{CrashKind, ExecutionOutcome, ExecutionRequest, SubprocessExecutor, Visibility, classify};
pub use interfaces::{
    CommandRunner, ContractVerifier, HarnessError, HarnessResult, ServiceControl, SuiteReporter, TestDiscovery,
    TestExecutor,
};
pub use process::{CommandSpec, ProcessOutput, SystemRunner};
pub use reporter::{ConsoleReporter, PhaseResult, SuiteSummary, SuiteTally, TestRecord};
pub use supervisor::{ServiceGuard, ServiceState, ServiceSupervisor};
pub use verifier::{HttpContractVerifier, VerificationReport, VerificationStage};
