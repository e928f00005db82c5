//! Spawn flow: batch creation, branch conflict detection and the spawn form.

mod conflict;
mod controller;
mod coordinator;

pub use conflict::{ConflictChecker, ConflictInput, ConflictState};
pub use controller::SpawnController;
pub use coordinator::{Navigation, SpawnCoordinator, SpawnOutcome};
