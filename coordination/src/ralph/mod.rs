//! Ralph: autonomous retry loop
//!
//! Runs a task through ordered gates (implementation, tests, an advisory
//! spec check) and retries with accumulated failure context until every
//! mandatory gate passes or the iteration budget is spent. Repeated
//! equivalent failures trigger a forced strategy shift; exhaustion hands the
//! incomplete work off instead of discarding it.
//!
//! One loop per working directory, enforced by [`RalphLock`].

pub mod error;
pub mod gates;
pub mod lock;
pub mod runner;
pub mod state;
pub mod stuck;

pub use error::{RalphError, RalphResult};
pub use gates::{
    detect_test_command, failed_branch_name, run_gate_command, spec_marker_present,
    CommandImplementer, CommandTestGate, GateFailure, GateResult, GitBranchHandOff, HandOff,
    Implementer, TestGate, SPEC_PASS_MARKER,
};
pub use lock::{RalphLock, LOCK_FILE};
pub use runner::{RalphConfig, RalphLoop, RalphOutcome};
pub use state::{
    RalphState, StateCleanupGuard, StateManager, CONTEXT_FILE, GATE_IMPLEMENT, GATE_TESTS,
    STATE_FILE,
};
pub use stuck::{failure_signature, is_stuck, normalize_failure, STUCK_DIRECTIVE};
