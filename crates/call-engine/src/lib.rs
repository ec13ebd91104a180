//! # Callflow Call Engine
//!
//! Call routing and session control for a softswitch.
//!
//! This crate provides:
//! - Anchored, first-match-wins routing over ordered dialplan contexts
//! - A sequential action executor (answer, playback, bridge, transfer, collect, ...)
//! - The call session lifecycle with exactly-once hangup hooks
//! - A prompt/collect engine behind menus, wizards and dial-by-name
//! - An HTTP client for routing lookups, with explicit timeouts and fallbacks
//! - A queue poller that holds callers in an external queue
//!
//! ## Architecture
//!
//! The switch itself (signaling, media) is reached through the
//! [`CallChannel`] trait. Each call runs as one task owning one
//! [`CallSession`]; hangup is observed through the channel's cancellation
//! token before every blocking step.

pub mod action;
pub mod channel;
pub mod config;
pub mod directory;
pub mod error;
pub mod external;
pub mod ivr;
pub mod orchestrator;
pub mod queue;
pub mod routing;
pub mod session;
pub mod sim;

pub use action::{Action, ActionExecutor, SequenceOutcome, SideEffectReport};
pub use channel::{BridgeOutcome, CallChannel, PlaybackOutcome};
pub use config::CallFlowConfig;
pub use error::{CallFlowError, Result};
pub use orchestrator::{CallFlowEngine, CallFlowEngineBuilder, CallReport};
pub use routing::{Dialplan, RouteDecision};
pub use session::{CallSession, CallState, HangupCause, InboundCall, SessionId};
pub use sim::SimulatedChannel;

pub mod prelude {
    pub use crate::{
        Action, CallChannel, CallFlowConfig, CallFlowEngine, CallFlowError, CallReport,
        CallSession, CallState, HangupCause, InboundCall, Result, SessionId, SimulatedChannel,
        action::{ActionExecutor, Flow, SequenceOutcome, TransferTarget},
        external::{HttpTransport, ReqwestTransport},
        queue::{QueuePoller, QueueService},
        routing::{Dialplan, RouteDecision},
    };
}
