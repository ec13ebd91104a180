//! Call queue poller
//!
//! ```text
//! Joining ─▶ Waiting ─(interval)─▶ Reassessing ─┬─ continue ─▶ Waiting
//!               │                               ├─ 5: re-prompt ─▶ Waiting
//!               │ hangup                        ├─ 4: leave
//!               │                               ├─ poll error: leave
//!               ▼                               └─ other: direct bridge
//!            Leaving ◀──────────────────────────────┘
//! ```

pub mod poller;
pub mod service;
pub mod status;

pub use poller::{PollerState, QueueExit, QueueMembership, QueuePoller, QueueRun};
pub use service::{HttpQueueService, QueueService};
pub use status::{DisconnectReason, QueueStatusCode, StatusReaction};
