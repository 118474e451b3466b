//! # warden-core
//!
//! Core library for Warden, a session-liveness supervisor for tmux-hosted
//! agent fleets: age/dead restart policy with per-session debounce, watcher
//! nudges, upstream release checks, and AI-oracle escalation.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. One supervisor, one loop.
//! - **Single writer**: The supervisor process is the only writer of the
//!   durable state record and the handoff debounce table.
//! - **Phases return outcomes**: Errors never cross a phase boundary as
//!   control flow; each phase yields a report plus the events to append.
//! - **Collaborators behind traits**: tmux, the orchestrator CLI, the
//!   release feed, and the decision oracle are injected, so whole cycles
//!   run against fakes in tests.

// Public modules
pub mod config;
pub mod error;
pub mod events;
pub mod exec;
pub mod host;
pub mod oracle;
pub mod orchestrator;
pub mod phases;
pub mod session;
pub mod state;
pub mod storage;
pub mod supervisor;
pub mod transcripts;
pub mod upstream;

// Re-export commonly used items at crate root
pub use config::{load_config, save_config, WardenConfig};
pub use error::{Result, WardenError};
pub use events::{EventLevel, EventLog, EventRecord};
pub use host::{collect_inventory, PaneStatus, TerminalHost, TmuxHost};
pub use oracle::{Action, Analysis, CommandOracle, DecisionOracle, SessionView, Snapshot};
pub use orchestrator::{CommandOrchestrator, Orchestrator};
pub use phases::{Phase, PhaseOutcome, PhaseReport};
pub use session::{SessionCategory, SessionRecord};
pub use state::{DebounceTable, PersistentState};
pub use storage::StorageConfig;
pub use supervisor::{Collaborators, CycleReport, Supervisor};
pub use upstream::{HttpReleaseFeed, PendingUpgrade, Release, ReleaseFeed};
