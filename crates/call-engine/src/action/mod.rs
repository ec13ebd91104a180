//! Call-control actions and their executor
//!
//! A matched rule yields an ordered list of [`Action`]s. The
//! [`ActionExecutor`] runs them strictly in sequence against one session;
//! an action can continue, end the sequence (hangup, transfer), or splice
//! in further actions (menu selections, lookup fallbacks).

pub mod dial;
pub mod executor;
pub mod types;

pub use dial::DialString;
pub use executor::{ActionExecutor, Flow, SequenceOutcome, SideEffectReport, TransferTarget};
pub use types::{Action, CollectSpec, ExternalCallSpec, LogLevel};
