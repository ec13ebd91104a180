use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::types::{CallState, SessionId};

/// Snapshot of a call that is currently being handled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveCall {
    pub session_id: SessionId,
    pub caller: String,
    pub destination: String,
    pub domain: String,
    pub state: CallState,
    pub started_at: DateTime<Utc>,
}

/// Registry of active calls shared by all call tasks
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    calls: Arc<DashMap<SessionId, ActiveCall>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, call: ActiveCall) {
        self.calls.insert(call.session_id.clone(), call);
    }

    pub fn update_state(&self, id: &SessionId, state: CallState) {
        if let Some(mut entry) = self.calls.get_mut(id) {
            entry.state = state;
        }
    }

    pub fn remove(&self, id: &SessionId) -> Option<ActiveCall> {
        self.calls.remove(id).map(|(_, call)| call)
    }

    pub fn get(&self, id: &SessionId) -> Option<ActiveCall> {
        self.calls.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// All active calls, oldest first
    pub fn snapshot(&self) -> Vec<ActiveCall> {
        let mut calls: Vec<ActiveCall> = self.calls.iter().map(|e| e.value().clone()).collect();
        calls.sort_by_key(|c| c.started_at);
        calls
    }
}
