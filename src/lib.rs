pub mod cache;
pub mod config;
pub mod daemon;
pub mod draft;
pub mod error;
pub mod model;
pub mod spawn;
pub mod terminal;
pub mod util;

pub use cache::{CacheSnapshot, PollerHandle, SessionCache, SessionLookup};
pub use config::{ClientConfig, ReconnectPolicy};
pub use daemon::{DaemonApi, HttpDaemon};
pub use draft::{DraftKey, DraftStore, FileStore, MemoryStore, Preferences, SpawnDraft, SpawnMode};
pub use error::{ClientError, SpawnError, StoreError, TransportError};
pub use model::{
    BranchConflict, BranchSuggestion, DaemonConfig, RunTarget, Session, SpawnRequest, SpawnResult,
    TargetCounts, Workspace,
};
pub use spawn::{
    ConflictChecker, ConflictInput, ConflictState, Navigation, SpawnController, SpawnCoordinator,
    SpawnOutcome,
};
pub use terminal::{
    TerminalConnector, TerminalOptions, TerminalStatus, TerminalTransport, TerminalView,
    WsConnector,
};
