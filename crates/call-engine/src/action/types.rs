use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::external::HttpMethod;
use crate::session::HangupCause;

/// A call-control action as declared in the dialplan
///
/// String fields are templates, expanded against the session when the
/// action runs (see [`crate::routing::expand`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Answer,
    /// Early media / ringback before answer
    Ring,
    Playback {
        file: String,
        /// Played instead when `file` is unavailable; the configured
        /// not-available prompt when absent
        #[serde(default)]
        fallback: Option<String>,
    },
    SetVariable {
        key: String,
        value: String,
    },
    /// Dial string: `,` rings candidates in parallel, `|` separates failover groups
    Bridge {
        target: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Transfer {
        extension: String,
        #[serde(default = "default_dialplan")]
        dialplan: String,
        #[serde(default)]
        context: Option<String>,
    },
    CollectDigits(CollectSpec),
    Sleep {
        ms: u64,
    },
    ExternalCall(ExternalCallSpec),
    Hangup {
        #[serde(default)]
        cause: HangupCause,
    },
    /// Single-level IVR menu declared under `[menus.<name>]`
    Menu {
        name: String,
    },
    /// Multi-slot guided flow declared under `[wizards.<name>]`
    Wizard {
        name: String,
    },
    /// Dial-by-name through the directory
    DialByName {
        #[serde(default)]
        context: Option<String>,
    },
    /// Hold the call in an external queue
    Queue {
        group: String,
        /// Landing number reported to the queue service, the destination when absent
        #[serde(default)]
        landing: Option<String>,
        /// Dial string used when the queue service asks for a direct bridge;
        /// the switch `callcenter` application with the group when absent
        #[serde(default)]
        bridge: Option<String>,
    },
    Voicemail {
        mailbox: String,
    },
    Log {
        #[serde(default)]
        level: LogLevel,
        message: String,
    },
}

fn default_dialplan() -> String {
    "XML".to_string()
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Answer => "answer",
            Action::Ring => "ring",
            Action::Playback { .. } => "playback",
            Action::SetVariable { .. } => "set_variable",
            Action::Bridge { .. } => "bridge",
            Action::Transfer { .. } => "transfer",
            Action::CollectDigits(_) => "collect_digits",
            Action::Sleep { .. } => "sleep",
            Action::ExternalCall(_) => "external_call",
            Action::Hangup { .. } => "hangup",
            Action::Menu { .. } => "menu",
            Action::Wizard { .. } => "wizard",
            Action::DialByName { .. } => "dial_by_name",
            Action::Queue { .. } => "queue",
            Action::Voicemail { .. } => "voicemail",
            Action::Log { .. } => "log",
        }
    }

    /// Actions still allowed once the session is hanging up
    pub fn is_cleanup_safe(&self) -> bool {
        matches!(self, Action::Log { .. })
    }

    pub fn bridge(target: impl Into<String>) -> Self {
        Action::Bridge {
            target: target.into(),
            timeout_secs: None,
        }
    }

    pub fn playback(file: impl Into<String>) -> Self {
        Action::Playback {
            file: file.into(),
            fallback: None,
        }
    }

    pub fn transfer(extension: impl Into<String>) -> Self {
        Action::Transfer {
            extension: extension.into(),
            dialplan: default_dialplan(),
            context: None,
        }
    }

    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Action::SetVariable {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Prompt-and-collect parameters
///
/// Unset timeouts, terminators and attempt counts come from the `[ivr]`
/// configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectSpec {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub invalid_prompt: Option<String>,
    #[serde(default = "default_min_digits")]
    pub min_digits: usize,
    pub max_digits: usize,
    #[serde(default)]
    pub terminators: Option<String>,
    #[serde(default)]
    pub first_digit_timeout_ms: Option<u64>,
    #[serde(default)]
    pub inter_digit_timeout_ms: Option<u64>,
    #[serde(default)]
    pub absolute_timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Regex the collected digits must fully match
    #[serde(default)]
    pub validation: Option<String>,
    /// Session variable receiving the digits
    #[serde(default = "default_digits_variable")]
    pub variable: String,
    /// `"extension [dialplan [context]]"` applied when all attempts fail
    #[serde(default)]
    pub transfer_on_failure: Option<String>,
}

fn default_min_digits() -> usize {
    1
}

fn default_digits_variable() -> String {
    "digits".to_string()
}

impl CollectSpec {
    pub fn new(max_digits: usize) -> Self {
        Self {
            prompt: None,
            invalid_prompt: None,
            min_digits: default_min_digits(),
            max_digits,
            terminators: None,
            first_digit_timeout_ms: None,
            inter_digit_timeout_ms: None,
            absolute_timeout_ms: None,
            max_attempts: None,
            validation: None,
            variable: default_digits_variable(),
            transfer_on_failure: None,
        }
    }
}

/// Outbound request issued from the dialplan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCallSpec {
    #[serde(default)]
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Request timeout; `[external] request_timeout_ms` when absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Session variable receiving the result
    #[serde(default)]
    pub result_variable: Option<String>,
    /// JSON field holding the result; the whole trimmed body when absent
    #[serde(default)]
    pub result_field: Option<String>,
    /// Replaces the rest of the sequence on no-data, timeout or parse failure
    #[serde(default)]
    pub on_failure: Vec<Action>,
    /// Stop the sequence on failure when no `on_failure` route is declared
    #[serde(default)]
    pub abort_on_error: bool,
}

impl ExternalCallSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            params: BTreeMap::new(),
            timeout_ms: None,
            result_variable: None,
            result_field: None,
            on_failure: Vec::new(),
            abort_on_error: false,
        }
    }
}
