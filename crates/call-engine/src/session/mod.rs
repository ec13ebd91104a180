//! Call session lifecycle
//!
//! A [`CallSession`] moves through
//! `Created -> Ringing -> Answered -> Bridged -> HangingUp -> Destroyed`.
//! Hangup hooks fire exactly once, in registration order, on entry to
//! `HangingUp`. After that point only cleanup and logging may touch the
//! session; every action sequence checks [`CallSession::is_ready`] first.

pub mod call_session;
pub mod registry;
pub mod types;

pub use call_session::{CallSession, HangupHook, PeerLeg, StateChange};
pub use registry::{ActiveCall, SessionRegistry};
pub use types::{CallState, HangupCause, InboundCall, SessionId};
