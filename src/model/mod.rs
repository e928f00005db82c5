//! Data model shared with the schmux daemon.
//!
//! Everything here mirrors the daemon's JSON shapes. Types that the daemon
//! sends with loose string tags (run target kinds, source control mode) are
//! parsed into enums at the boundary.

mod config;
mod spawn;
mod target;
mod workspace;

pub use config::{DaemonConfig, RepoEntry, ScmMode, TerminalSettings};
pub use spawn::{BranchConflict, BranchSuggestion, SpawnRequest, SpawnResult, BRANCH_CONFLICT_PREFIX};
pub use target::{RunTarget, SpawnUnit, TargetCounts, TargetKind, TargetSource};
pub use workspace::{Session, Workspace};
