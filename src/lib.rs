#![forbid(unsafe_code)]
//! Test orchestration for the My Name Chef game client and battle server
//!
//! The harness discovers the tests both binaries embed, runs each client test
//! in its own child process under a wall-clock budget, keeps a battle server
//! alive for the tests that need one, checks the server's HTTP contract
//! directly, and reports a single pass/fail tally.
//!
//! ## Panic Policy
//!
//! - **Production code**: `Result`/`Option` with `?`, `ok_or` and `map_err`. The `cli` and `harness` modules enforce
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Child processes**: a misbehaving test binary is never a reason to panic. Every way a child can end (marker,
//!   exit code, signal, timeout, failure to launch) maps to an `ExecutionOutcome`.

pub mod cli;
pub mod config;
pub mod harness;
pub mod version;

pub use config::RunnerConfig;
pub use harness::{ExecutionOutcome, HarnessError, HarnessResult, SuiteCoordinator, SuiteSummary};
