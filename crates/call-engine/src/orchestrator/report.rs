use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::action::{SequenceOutcome, SideEffectReport, TransferTarget};
use crate::session::{CallSession, HangupCause, SessionId, StateChange};

/// A routing decision taken during the call
#[derive(Debug, Clone, Serialize)]
pub struct MatchedRoute {
    pub context: String,
    pub destination: String,
    /// Rule name, or `external-trunk` for the gateway default
    pub route: String,
    /// Position of the rule in its context
    pub index: Option<usize>,
    pub captures: Vec<String>,
}

/// Everything that happened to one call, produced when it ends
#[derive(Debug, Clone, Serialize)]
pub struct CallReport {
    pub session_id: SessionId,
    pub caller: String,
    pub destination: String,
    pub domain: String,
    pub matched: Vec<MatchedRoute>,
    pub transfers: Vec<TransferTarget>,
    pub steps: Vec<SideEffectReport>,
    /// How the last action sequence ended; `None` when no route was found
    pub outcome: Option<SequenceOutcome>,
    pub hangup_cause: Option<HangupCause>,
    pub history: Vec<StateChange>,
    /// Variables as they were just before the session was destroyed
    pub variables: BTreeMap<String, String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl CallReport {
    pub(crate) fn start(session: &CallSession) -> Self {
        Self {
            session_id: session.id().clone(),
            caller: session.caller().to_string(),
            destination: session.destination().to_string(),
            domain: session.domain().to_string(),
            matched: Vec::new(),
            transfers: Vec::new(),
            steps: Vec::new(),
            outcome: None,
            hangup_cause: None,
            history: Vec::new(),
            variables: BTreeMap::new(),
            error: None,
            started_at: session.created_at(),
            ended_at: session.created_at(),
        }
    }

    /// Copy the final session state, before its variables are released.
    pub(crate) fn capture(&mut self, session: &CallSession) {
        self.hangup_cause = session.hangup_cause();
        self.variables = session
            .variables()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
    }

    pub(crate) fn finish(&mut self, session: &CallSession) {
        self.history = session.history().to_vec();
        self.ended_at = Utc::now();
    }

    /// Names of the rules matched, in order
    pub fn routes(&self) -> Vec<&str> {
        self.matched.iter().map(|m| m.route.as_str()).collect()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}
