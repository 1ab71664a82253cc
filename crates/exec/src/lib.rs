//! Action layer: the applier that collapses proposals into real files (with
//! backups and rollback), the in-tree test sweep, the git synchronizer with
//! its data-API fallback, and the crash-recovery strategy chain.

mod api_push;
mod apply;
mod git;
mod recovery;
mod sweep;

pub use api_push::push_via_api;
pub use apply::{ApplyError, ApplyOutcome, Applier};
pub use git::{GitSync, SyncOutcome, run_git};
pub use recovery::{RecoveryReport, mark_stable, smart_rollback};
pub use sweep::{SweepResult, TestOutcome, restricted_runtime, run_test_sweep};
