//! The traversal and read-progress engine.
//!
//! ```text
//! Scheduler → Poller → Backlog
//!     ↓
//! ReadEngine → ContentSource
//! ```
//!
//! The scheduler drives everything: discovery fills the backlog, then each
//! thread is handed to the read engine in FIFO order, and anything the
//! engine discovers at a thread foot is merged back into the backlog.

pub mod backlog;
pub mod engine;
pub mod poller;
pub mod scheduler;

pub use backlog::{Backlog, Item};
pub use engine::{ReadEngine, ReadOutcome, ReadPolicy, ReadVisit};
pub use poller::{DiscoveryOutcome, DiscoveryPoller};
pub use scheduler::{RunSummary, Scheduler};
