use serde::{Deserialize, Serialize};

/// Status code reported by the queue service for a waiting call
///
/// Observed values are 0 to 9. Only the reaction table below gives them
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueStatusCode(pub u8);

/// What the poller does with a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusReaction {
    /// Keep waiting
    Continue,
    /// Play the "still waiting" prompt and keep waiting
    Reprompt,
    /// Leave the queue
    Leave(DisconnectReason),
    /// Stop waiting and bridge directly
    DirectBridge,
}

impl QueueStatusCode {
    /// Codes 0, 2, 3, 6, 7, 8, 9 continue; 4 leaves; 5 re-prompts.
    ///
    /// Everything else, code 1 included, falls to a direct bridge. Code 1
    /// has no documented meaning and is kept on that path as observed.
    pub fn reaction(self) -> StatusReaction {
        match self.0 {
            0 | 2 | 3 | 6 | 7 | 8 | 9 => StatusReaction::Continue,
            4 => StatusReaction::Leave(DisconnectReason::NoLoggedInOrTimeout),
            5 => StatusReaction::Reprompt,
            _ => StatusReaction::DirectBridge,
        }
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            4 => "no-agents",
            5 => "still-waiting",
            0 | 2 | 3 | 6..=9 => "waiting",
            _ => "undocumented",
        }
    }
}

impl std::fmt::Display for QueueStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

/// Reason reported with the leave notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectReason {
    NoLoggedInOrTimeout,
    CallAbandoned,
    Connected,
    ServiceError,
}

impl DisconnectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::NoLoggedInOrTimeout => "noLoggedInOrTimeout",
            DisconnectReason::CallAbandoned => "callAbandoned",
            DisconnectReason::Connected => "connected",
            DisconnectReason::ServiceError => "serviceError",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_table() {
        for code in [0, 2, 3, 6, 7, 8, 9] {
            assert_eq!(QueueStatusCode(code).reaction(), StatusReaction::Continue, "code {}", code);
        }
        assert_eq!(
            QueueStatusCode(4).reaction(),
            StatusReaction::Leave(DisconnectReason::NoLoggedInOrTimeout)
        );
        assert_eq!(QueueStatusCode(5).reaction(), StatusReaction::Reprompt);
        assert_eq!(QueueStatusCode(1).reaction(), StatusReaction::DirectBridge);
        assert_eq!(QueueStatusCode(42).reaction(), StatusReaction::DirectBridge);
    }

    #[test]
    fn reason_wire_names() {
        assert_eq!(DisconnectReason::CallAbandoned.as_str(), "callAbandoned");
        assert_eq!(
            serde_json::to_string(&DisconnectReason::NoLoggedInOrTimeout).unwrap(),
            "\"noLoggedInOrTimeout\""
        );
    }
}
