use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier of one call leg
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("call-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a call session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallState {
    Created,
    Ringing,
    Answered,
    Bridged,
    HangingUp,
    Destroyed,
}

impl CallState {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: CallState) -> bool {
        use CallState::*;
        match (self, next) {
            (Created, Ringing | Answered | Bridged) => true,
            (Ringing, Answered | Bridged) => true,
            (Answered, Bridged) => true,
            // bridge ended with hangup_after_bridge disabled
            (Bridged, Answered) => true,
            (Created | Ringing | Answered | Bridged, HangingUp) => true,
            (HangingUp, Destroyed) => true,
            _ => false,
        }
    }

    /// HangingUp and Destroyed are past the point where actions may run.
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::HangingUp | CallState::Destroyed)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallState::Created => "created",
            CallState::Ringing => "ringing",
            CallState::Answered => "answered",
            CallState::Bridged => "bridged",
            CallState::HangingUp => "hanging_up",
            CallState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Hangup causes used by the engine, named as the switch names them
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HangupCause {
    #[default]
    NormalClearing,
    NoAnswer,
    UserBusy,
    UnallocatedNumber,
    NoRouteDestination,
    OriginatorCancel,
    CallRejected,
    NormalTemporaryFailure,
}

impl HangupCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            HangupCause::NormalClearing => "NORMAL_CLEARING",
            HangupCause::NoAnswer => "NO_ANSWER",
            HangupCause::UserBusy => "USER_BUSY",
            HangupCause::UnallocatedNumber => "UNALLOCATED_NUMBER",
            HangupCause::NoRouteDestination => "NO_ROUTE_DESTINATION",
            HangupCause::OriginatorCancel => "ORIGINATOR_CANCEL",
            HangupCause::CallRejected => "CALL_REJECTED",
            HangupCause::NormalTemporaryFailure => "NORMAL_TEMPORARY_FAILURE",
        }
    }

    /// Parse a switch cause name; unknown names map to `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let cause = match name.trim().to_ascii_uppercase().as_str() {
            "NORMAL_CLEARING" => HangupCause::NormalClearing,
            "NO_ANSWER" => HangupCause::NoAnswer,
            "USER_BUSY" => HangupCause::UserBusy,
            "UNALLOCATED_NUMBER" => HangupCause::UnallocatedNumber,
            "NO_ROUTE_DESTINATION" => HangupCause::NoRouteDestination,
            "ORIGINATOR_CANCEL" => HangupCause::OriginatorCancel,
            "CALL_REJECTED" => HangupCause::CallRejected,
            "NORMAL_TEMPORARY_FAILURE" => HangupCause::NormalTemporaryFailure,
            _ => return None,
        };
        Some(cause)
    }
}

impl std::fmt::Display for HangupCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound call event handed to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundCall {
    pub caller_id_number: String,
    #[serde(default)]
    pub caller_id_name: Option<String>,
    pub destination: String,
    pub domain: String,
    /// Dialplan context; the configured default context when absent
    #[serde(default)]
    pub context: Option<String>,
    /// Channel variables present on arrival
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl InboundCall {
    pub fn new(caller: impl Into<String>, destination: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            caller_id_number: caller.into(),
            caller_id_name: None,
            destination: destination.into(),
            domain: domain.into(),
            context: None,
            variables: HashMap::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_caller_name(mut self, name: impl Into<String>) -> Self {
        self.caller_id_name = Some(name.into());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        assert!(CallState::Created.can_transition_to(CallState::Ringing));
        assert!(CallState::Answered.can_transition_to(CallState::Bridged));
        assert!(CallState::Bridged.can_transition_to(CallState::Answered));
        assert!(CallState::Bridged.can_transition_to(CallState::HangingUp));
        assert!(CallState::HangingUp.can_transition_to(CallState::Destroyed));

        assert!(!CallState::Answered.can_transition_to(CallState::Ringing));
        assert!(!CallState::HangingUp.can_transition_to(CallState::Answered));
        assert!(!CallState::Destroyed.can_transition_to(CallState::HangingUp));
        assert!(!CallState::Created.can_transition_to(CallState::Destroyed));
    }

    #[test]
    fn hangup_cause_names() {
        assert_eq!(HangupCause::NoRouteDestination.as_str(), "NO_ROUTE_DESTINATION");
        assert_eq!(HangupCause::parse("user_busy"), Some(HangupCause::UserBusy));
        assert_eq!(HangupCause::parse("SOMETHING_ELSE"), None);

        let json = serde_json::to_string(&HangupCause::NoAnswer).unwrap();
        assert_eq!(json, "\"NO_ANSWER\"");
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("call-"));
    }
}
