use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::service::QueueService;
use super::status::{DisconnectReason, QueueStatusCode, StatusReaction};
use crate::channel::sleep_unless_hangup;
use crate::config::QueueConfig;
use crate::error::Result;
use crate::ivr::CollectControl;
use crate::session::{CallSession, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollerState {
    Joining,
    Waiting,
    Reassessing,
    Leaving,
}

/// A call's stay in an external queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueMembership {
    pub call_id: SessionId,
    pub caller: String,
    pub landing: String,
    pub group: String,
    pub joined_at: DateTime<Utc>,
    /// Last status code received
    pub status: Option<QueueStatusCode>,
    pub disconnect_reason: Option<DisconnectReason>,
    /// Successful status polls
    pub polls: u32,
}

impl QueueMembership {
    pub fn new(call_id: SessionId, caller: &str, landing: &str, group: &str) -> Self {
        Self {
            call_id,
            caller: caller.to_string(),
            landing: landing.to_string(),
            group: group.to_string(),
            joined_at: Utc::now(),
            status: None,
            disconnect_reason: None,
            polls: 0,
        }
    }
}

/// How the poller finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueExit {
    /// Left the queue without being connected
    Left(DisconnectReason),
    /// The status table asked for a direct bridge
    Bridge(QueueStatusCode),
    /// The caller hung up while waiting
    SessionGone,
    /// The queue service refused or never answered the join
    JoinFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueRun {
    pub exit: QueueExit,
    pub membership: QueueMembership,
    pub trace: Vec<PollerState>,
    pub reprompts: u32,
    /// Whether a leave notification was sent (its delivery is best-effort)
    pub leave_sent: bool,
}

/// Holds a call in an external queue with a sleep-then-poll loop
///
/// Liveness is checked before every poll and the sleep itself ends as soon
/// as the leg hangs up. A failed status poll is not retried: the call leaves
/// with `serviceError`. Exactly one leave notification follows a successful
/// join, whatever the exit.
#[derive(Clone)]
pub struct QueuePoller {
    service: Arc<dyn QueueService>,
    interval: Duration,
    max_wait: Duration,
    still_waiting_prompt: String,
}

impl QueuePoller {
    pub fn new(service: Arc<dyn QueueService>, interval: Duration, max_wait: Duration) -> Self {
        Self {
            service,
            interval,
            max_wait,
            still_waiting_prompt: QueueConfig::default().still_waiting_prompt,
        }
    }

    pub fn from_config(service: Arc<dyn QueueService>, config: &QueueConfig) -> Self {
        Self {
            service,
            interval: Duration::from_millis(config.poll_interval_ms),
            max_wait: Duration::from_secs(config.max_wait_secs),
            still_waiting_prompt: config.still_waiting_prompt.clone(),
        }
    }

    pub fn with_still_waiting_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.still_waiting_prompt = prompt.into();
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run(&self, session: &CallSession, group: &str, landing: &str) -> Result<QueueRun> {
        let mut membership = QueueMembership::new(session.id().clone(), session.caller(), landing, group);
        let mut trace = vec![PollerState::Joining];

        session.ensure_ready()?;
        if let Err(e) = self.service.join(&membership).await {
            warn!(session_id = %session.id(), group, error = %e, "queue join failed");
            return Ok(QueueRun {
                exit: QueueExit::JoinFailed,
                membership,
                trace,
                reprompts: 0,
                leave_sent: false,
            });
        }
        info!(session_id = %session.id(), group, landing, "joined queue");

        let token = session.hangup_token();
        let started = Instant::now();
        let mut reprompts = 0;

        let (exit, reason) = loop {
            trace.push(PollerState::Waiting);
            if !sleep_unless_hangup(&token, self.interval).await || !session.is_ready() {
                break (QueueExit::SessionGone, DisconnectReason::CallAbandoned);
            }
            if started.elapsed() >= self.max_wait {
                break (
                    QueueExit::Left(DisconnectReason::NoLoggedInOrTimeout),
                    DisconnectReason::NoLoggedInOrTimeout,
                );
            }

            trace.push(PollerState::Reassessing);
            let polled = tokio::select! {
                _ = token.cancelled() => None,
                result = self.service.status(&membership.call_id) => Some(result),
            };
            let code = match polled {
                None => break (QueueExit::SessionGone, DisconnectReason::CallAbandoned),
                Some(Ok(code)) => code,
                Some(Err(e)) if e.is_session_gone() => {
                    break (QueueExit::SessionGone, DisconnectReason::CallAbandoned)
                }
                Some(Err(e)) => {
                    warn!(session_id = %session.id(), error = %e, "queue status poll failed, leaving queue");
                    break (
                        QueueExit::Left(DisconnectReason::ServiceError),
                        DisconnectReason::ServiceError,
                    );
                }
            };
            membership.status = Some(code);
            membership.polls += 1;
            debug!(session_id = %session.id(), status = %code, "queue status");

            match code.reaction() {
                StatusReaction::Continue => {}
                StatusReaction::Reprompt => {
                    reprompts += 1;
                    let mut ignore = |_: char| CollectControl::Continue;
                    match session
                        .channel()
                        .stream_file(&self.still_waiting_prompt, &mut ignore)
                        .await
                    {
                        Err(e) if e.is_session_gone() => {
                            break (QueueExit::SessionGone, DisconnectReason::CallAbandoned)
                        }
                        Err(e) => warn!(session_id = %session.id(), error = %e, "still-waiting prompt failed"),
                        Ok(_) => {}
                    }
                }
                StatusReaction::Leave(reason) => break (QueueExit::Left(reason), reason),
                StatusReaction::DirectBridge => break (QueueExit::Bridge(code), DisconnectReason::Connected),
            }
        };

        trace.push(PollerState::Leaving);
        membership.disconnect_reason = Some(reason);
        if let Err(e) = self.service.leave(&membership.call_id, reason).await {
            warn!(session_id = %session.id(), reason = %reason, error = %e, "queue leave notification failed");
        }
        info!(session_id = %session.id(), group, reason = %reason, polls = membership.polls, "left queue");

        Ok(QueueRun {
            exit,
            membership,
            trace,
            reprompts,
            leave_sent: true,
        })
    }
}

impl std::fmt::Debug for QueuePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuePoller")
            .field("interval", &self.interval)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}
