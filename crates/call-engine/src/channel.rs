//! Telephony primitives consumed by the engine.
//!
//! The switch itself (signaling, media, codecs) lives behind [`CallChannel`].
//! Every blocking primitive must return [`CallFlowError::SessionGone`] as soon
//! as the channel's hangup token is cancelled.
//!
//! [`CallFlowError::SessionGone`]: crate::error::CallFlowError::SessionGone

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::ivr::CollectControl;
use crate::session::{HangupCause, SessionId};

/// How a `stream_file` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The whole file was played
    Completed,
    /// The DTMF callback asked to stop playback
    Interrupted,
}

/// Result of a single bridge attempt over a set of parallel candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeOutcome {
    /// One candidate answered; the bridged conversation has ended when this is returned
    Answered { target: String, peer: SessionId },
    /// No candidate answered within the timeout
    Failed { cause: HangupCause },
}

/// Narrow interface to one call leg on the switch
#[async_trait]
pub trait CallChannel: Send + Sync {
    /// Answer the leg. Idempotent on the switch side.
    async fn answer(&self) -> Result<()>;

    /// Signal early media / ringback
    async fn ring(&self) -> Result<()>;

    /// Token cancelled when the leg hangs up, locally or remotely
    fn hangup_token(&self) -> CancellationToken;

    fn is_ready(&self) -> bool {
        !self.hangup_token().is_cancelled()
    }

    /// Play a file, offering every DTMF digit received meanwhile to `on_digit`.
    ///
    /// Fails with a transient action error when the file cannot be found.
    async fn stream_file(
        &self,
        path: &str,
        on_digit: &mut (dyn FnMut(char) -> CollectControl + Send),
    ) -> Result<PlaybackOutcome>;

    /// Wait up to `timeout` for the next DTMF digit. `None` on timeout.
    async fn read_digit(&self, timeout: Duration) -> Result<Option<char>>;

    /// Ring all `candidates` in parallel, first answer wins.
    async fn bridge(&self, candidates: &[String], timeout: Duration) -> Result<BridgeOutcome>;

    /// Run a switch application and return its textual result
    async fn execute(&self, app: &str, args: &str) -> Result<String>;

    /// Hang up the leg with `cause`
    async fn hangup(&self, cause: HangupCause);
}

/// Sleep for `duration` unless the leg hangs up first.
///
/// Returns `false` when the hangup token fired.
pub async fn sleep_unless_hangup(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
