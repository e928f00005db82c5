//! Client-only persisted state: spawn drafts and UI preferences.

mod drafts;
mod preferences;
mod store;

pub use drafts::{DraftKey, DraftStore, SaveOutcome, SpawnDraft, SpawnMode};
pub use preferences::Preferences;
pub use store::{FileStore, KeyValueStore, MemoryStore, SharedStore};
