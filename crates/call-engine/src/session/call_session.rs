use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::{CallState, HangupCause, InboundCall, SessionId};
use crate::channel::CallChannel;
use crate::error::{CallFlowError, Result};

/// Variables that carry the original call identity and can never be overwritten
const PROTECTED_VARIABLES: &[&str] = &["caller_id_number", "destination_number"];

/// Hook run once when the session enters HangingUp
pub type HangupHook = Box<dyn FnOnce(&CallSession) + Send + Sync>;

/// Bridge relation to the other leg. Holds only its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLeg {
    pub session_id: SessionId,
    pub target: String,
}

/// One recorded lifecycle change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub state: CallState,
    pub at: DateTime<Utc>,
}

/// A call leg as seen by the routing engine
///
/// Owns the session variables, the lifecycle state and the hangup hooks.
/// The caller and destination captured at creation are immutable; only
/// derived fields such as `effective_caller_id_number` may change.
pub struct CallSession {
    id: SessionId,
    caller: String,
    caller_name: Option<String>,
    destination: String,
    /// Extension routing currently runs for; changes on transfer
    dialed: String,
    domain: String,
    context: String,
    state: CallState,
    variables: HashMap<String, String>,
    peer: Option<PeerLeg>,
    hooks: Vec<HangupHook>,
    hangup_cause: Option<HangupCause>,
    history: Vec<StateChange>,
    channel: Arc<dyn CallChannel>,
    created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(call: InboundCall, default_context: &str, channel: Arc<dyn CallChannel>) -> Self {
        let now = Utc::now();
        let context = call
            .context
            .clone()
            .unwrap_or_else(|| default_context.to_string());

        let mut variables = call.variables;
        for key in PROTECTED_VARIABLES {
            variables.remove(*key);
        }

        Self {
            id: SessionId::new(),
            caller: call.caller_id_number,
            caller_name: call.caller_id_name,
            dialed: call.destination.clone(),
            destination: call.destination,
            domain: call.domain,
            context,
            state: CallState::Created,
            variables,
            peer: None,
            hooks: Vec::new(),
            hangup_cause: None,
            history: vec![StateChange {
                state: CallState::Created,
                at: now,
            }],
            channel,
            created_at: now,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn caller_name(&self) -> Option<&str> {
        self.caller_name.as_deref()
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Dialplan context routing currently runs in
    pub fn context(&self) -> &str {
        &self.context
    }

    pub(crate) fn set_context(&mut self, context: impl Into<String>) {
        self.context = context.into();
    }

    /// Original destination, or the extension of the latest transfer
    pub fn dialed(&self) -> &str {
        &self.dialed
    }

    pub(crate) fn set_dialed(&mut self, extension: impl Into<String>) {
        self.dialed = extension.into();
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn peer(&self) -> Option<&PeerLeg> {
        self.peer.as_ref()
    }

    pub fn hangup_cause(&self) -> Option<HangupCause> {
        self.hangup_cause
    }

    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn channel(&self) -> &Arc<dyn CallChannel> {
        &self.channel
    }

    pub fn hangup_token(&self) -> CancellationToken {
        self.channel.hangup_token()
    }

    /// Look up a variable. The identity names resolve to the originals.
    pub fn variable(&self, key: &str) -> Option<&str> {
        match key {
            "caller_id_number" => Some(&self.caller),
            "caller_id_name" => self.caller_name.as_deref(),
            "destination_number" => Some(&self.destination),
            "dialed_extension" => Some(&self.dialed),
            "domain_name" => Some(&self.domain),
            _ => self.variables.get(key).map(String::as_str),
        }
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if PROTECTED_VARIABLES.contains(&key.as_str()) {
            return Err(CallFlowError::invalid_input(format!(
                "variable '{}' holds the original call identity and is read-only",
                key
            )));
        }
        if self.state == CallState::Destroyed {
            return Err(CallFlowError::session_gone(self.id.to_string()));
        }
        self.variables.insert(key, value.into());
        Ok(())
    }

    /// Boolean view of a variable (`true`/`yes`/`on`/`1`)
    pub fn variable_flag(&self, key: &str) -> Option<bool> {
        self.variable(key).map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "on" | "1"
            )
        })
    }

    /// The `session.ready()` guard: not hanging up and the leg is still up.
    pub fn is_ready(&self) -> bool {
        !self.state.is_terminal() && self.channel.is_ready()
    }

    pub fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CallFlowError::session_gone(self.id.to_string()))
        }
    }

    pub fn transition(&mut self, next: CallState) -> Result<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(CallFlowError::InvalidTransition {
                session: self.id.to_string(),
                from: self.state,
                to: next,
            });
        }
        debug!(session_id = %self.id, from = %self.state, to = %next, "session state change");
        self.state = next;
        self.history.push(StateChange {
            state: next,
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn mark_ringing(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.transition(CallState::Ringing)
    }

    /// Answered is entered once; a second answer is a no-op.
    pub fn mark_answered(&mut self) -> Result<()> {
        self.ensure_ready()?;
        match self.state {
            CallState::Answered | CallState::Bridged => Ok(()),
            _ => self.transition(CallState::Answered),
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self.state, CallState::Answered | CallState::Bridged)
    }

    pub fn mark_bridged(&mut self, peer: PeerLeg) -> Result<()> {
        self.ensure_ready()?;
        self.transition(CallState::Bridged)?;
        self.peer = Some(peer);
        Ok(())
    }

    /// The bridged conversation ended and the call stays up.
    pub fn end_bridge(&mut self) -> Result<()> {
        self.peer = None;
        if self.state == CallState::Bridged {
            self.transition(CallState::Answered)?;
        }
        Ok(())
    }

    /// Hooks run in registration order, exactly once.
    pub fn register_hangup_hook(&mut self, hook: HangupHook) -> Result<()> {
        if self.state.is_terminal() {
            return Err(CallFlowError::session_gone(self.id.to_string()));
        }
        self.hooks.push(hook);
        Ok(())
    }

    /// Enter HangingUp and run the hangup hooks.
    ///
    /// Returns `false` if the session was already hanging up; hooks never
    /// run twice. The leg itself is hung up only if it is still up.
    pub async fn begin_hangup(&mut self, cause: HangupCause) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        // Non-terminal states always allow HangingUp
        self.state = CallState::HangingUp;
        self.history.push(StateChange {
            state: CallState::HangingUp,
            at: Utc::now(),
        });
        self.hangup_cause = Some(cause);
        self.variables
            .insert("hangup_cause".to_string(), cause.as_str().to_string());

        if self.channel.is_ready() {
            self.channel.hangup(cause).await;
        }

        let hooks = std::mem::take(&mut self.hooks);
        debug!(session_id = %self.id, hooks = hooks.len(), cause = %cause, "running hangup hooks");
        for hook in hooks {
            hook(self);
        }
        true
    }

    /// Release the peer reference and the variables.
    pub fn destroy(&mut self) -> Result<()> {
        if self.state != CallState::HangingUp {
            warn!(session_id = %self.id, state = %self.state, "destroy requested before hangup");
        }
        self.transition(CallState::Destroyed)?;
        self.peer = None;
        self.variables.clear();
        Ok(())
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("caller", &self.caller)
            .field("destination", &self.destination)
            .field("domain", &self.domain)
            .field("context", &self.context)
            .field("state", &self.state)
            .field("peer", &self.peer)
            .finish()
    }
}
