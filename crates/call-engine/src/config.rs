use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::action::Action;
use crate::directory::DirectoryRecord;
use crate::error::{CallFlowError, Result};
use crate::routing::{AnchoredPattern, RuleConfig};

/// Environment prefix for overrides, e.g. `CALLFLOW__GENERAL__DOMAIN`
pub const ENV_PREFIX: &str = "CALLFLOW";

/// Complete engine configuration
///
/// Every section has defaults, so an empty document is a valid (if
/// rule-less) configuration.
///
/// # Sections
///
/// - `general`: domain, default context, trunk gateway and transfer limits
/// - `ivr`: digit collection defaults and retry count
/// - `queue`: external queue service and polling cadence
/// - `external`: outbound HTTP client settings
/// - `prompts`: audio played on failure paths
/// - `logging`: log level and format for the `callflow` binary
/// - `dialplan`, `menus`, `wizards`, `directory`: routing content
///
/// # Examples
///
/// ```
/// use callflow_call_engine::config::CallFlowConfig;
///
/// let config = CallFlowConfig::from_toml_str(r#"
///     [general]
///     domain = "pbx.example.com"
///
///     [[dialplan.contexts.default]]
///     name = "extensions"
///     pattern = '^\d{4}$'
///     actions = [{ type = "bridge", target = "user/{d}@{domain}" }]
/// "#).unwrap();
///
/// assert_eq!(config.ivr.max_attempts, 3);
/// assert_eq!(config.queue.poll_interval_ms, 500);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallFlowConfig {
    pub general: GeneralConfig,
    pub ivr: IvrConfig,
    pub queue: QueueConfig,
    pub external: ExternalConfig,
    pub prompts: PromptConfig,
    pub logging: LogConfig,
    pub dialplan: DialplanConfig,
    pub menus: BTreeMap<String, MenuConfig>,
    pub wizards: BTreeMap<String, WizardConfig>,
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Domain used for `{domain}` when the call carries none
    pub domain: String,
    /// Context used when an inbound call does not name one
    pub default_context: String,
    /// Gateway prefix for unmatched E.164 destinations
    pub gateway: String,
    /// Destinations matching this pattern fall to the gateway when no rule matches
    pub external_number_pattern: String,
    pub bridge_timeout_secs: u64,
    pub hangup_after_bridge: bool,
    /// Transfers allowed per call before routing gives up
    pub max_transfers: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            domain: "callflow.local".to_string(),
            default_context: "default".to_string(),
            gateway: "sofia/gateway/default".to_string(),
            external_number_pattern: r"^\+?[1-9]\d{6,14}$".to_string(),
            bridge_timeout_secs: 30,
            hangup_after_bridge: true,
            max_transfers: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IvrConfig {
    /// Prompt/collect rounds before the failure action
    pub max_attempts: u32,
    pub first_digit_timeout_ms: u64,
    pub inter_digit_timeout_ms: u64,
    pub absolute_timeout_ms: u64,
    /// Any of these characters ends collection
    pub terminators: String,
    /// Menus without an explicit failure route transfer here
    pub operator_extension: Option<String>,
    /// Key accepting a confirmation round
    pub confirm_yes: String,
    /// Key rejecting a confirmation round
    pub confirm_no: String,
}

impl Default for IvrConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            first_digit_timeout_ms: 5000,
            inter_digit_timeout_ms: 3000,
            absolute_timeout_ms: 30000,
            terminators: "#".to_string(),
            operator_extension: None,
            confirm_yes: "1".to_string(),
            confirm_no: "2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Base URL of the queue service (`/join`, `/status`, `/leave` below it)
    pub base_url: String,
    pub poll_interval_ms: u64,
    /// Longest a caller is held before leaving with `noLoggedInOrTimeout`
    pub max_wait_secs: u64,
    pub still_waiting_prompt: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/queue".to_string(),
            poll_interval_ms: 500,
            max_wait_secs: 900,
            still_waiting_prompt: "ivr/still_waiting.wav".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub request_timeout_ms: u64,
    pub user_agent: String,
    /// Response bodies treated as "no data", compared case-insensitively
    pub no_data_sentinels: Vec<String>,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
            user_agent: format!("callflow/{}", env!("CARGO_PKG_VERSION")),
            no_data_sentinels: vec!["no data".into(), "nodata".into(), "null".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub not_available: String,
    pub invalid_entry: String,
    /// Played when a requested prompt file is missing
    pub fallback: String,
    pub goodbye: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            not_available: "ivr/not_available.wav".to_string(),
            invalid_entry: "ivr/invalid_entry.wav".to_string(),
            fallback: "ivr/not_available.wav".to_string(),
            goodbye: "ivr/goodbye.wav".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DialplanConfig {
    /// Context name to its rules, in declared order
    pub contexts: BTreeMap<String, Vec<RuleConfig>>,
}

/// Single-level IVR menu
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuConfig {
    pub prompt: String,
    #[serde(default)]
    pub invalid_prompt: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    pub entries: Vec<MenuEntry>,
    /// Run when every attempt failed; operator transfer or not-available + hangup when empty
    #[serde(default)]
    pub on_failure: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuEntry {
    /// DTMF key: `0-9`, `*`, `#` or `A-D`
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    pub actions: Vec<Action>,
}

/// Multi-slot guided flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    pub slots: Vec<SlotConfig>,
    #[serde(default)]
    pub on_complete: Vec<Action>,
    #[serde(default)]
    pub on_failure: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub invalid_prompt: Option<String>,
    #[serde(default = "default_slot_digits")]
    pub max_digits: usize,
    /// Pattern to canonical value, first match wins
    pub choices: Vec<ChoiceConfig>,
    /// Enables a yes/no confirmation round before the slot is accepted
    #[serde(default)]
    pub confirm_prompt: Option<String>,
}

fn default_slot_digits() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceConfig {
    pub pattern: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub prompt: String,
    /// Keypad digits collected for a name search
    pub search_digits: usize,
    pub records: Vec<DirectoryRecord>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            prompt: "ivr/dial_by_name.wav".to_string(),
            search_digits: 3,
            records: Vec::new(),
        }
    }
}

const DTMF_KEYS: &str = "0123456789*#ABCD";

fn is_dtmf_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if DTMF_KEYS.contains(c))
}

impl CallFlowConfig {
    /// Load from an optional file with `CALLFLOW__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = callflow_infra_common::load_settings(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(callflow_infra_common::from_toml_str(source)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.domain.is_empty() {
            return Err(CallFlowError::configuration("general.domain cannot be empty"));
        }
        if self.general.default_context.is_empty() {
            return Err(CallFlowError::configuration("general.default_context cannot be empty"));
        }
        AnchoredPattern::new(&self.general.external_number_pattern).map_err(|e| {
            CallFlowError::configuration(format!("general.external_number_pattern: {}", e))
        })?;
        if !self.dialplan.contexts.is_empty()
            && !self.dialplan.contexts.contains_key(&self.general.default_context)
        {
            return Err(CallFlowError::configuration(format!(
                "default context '{}' is not defined in dialplan.contexts",
                self.general.default_context
            )));
        }

        if self.ivr.max_attempts == 0 {
            return Err(CallFlowError::configuration("ivr.max_attempts must be greater than 0"));
        }
        if !is_dtmf_key(&self.ivr.confirm_yes) || !is_dtmf_key(&self.ivr.confirm_no) {
            return Err(CallFlowError::configuration(
                "ivr.confirm_yes and ivr.confirm_no must be DTMF symbols",
            ));
        }
        if self.ivr.confirm_yes == self.ivr.confirm_no {
            return Err(CallFlowError::configuration("ivr.confirm_yes and ivr.confirm_no must differ"));
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(CallFlowError::configuration("queue.poll_interval_ms must be greater than 0"));
        }
        if self.external.request_timeout_ms == 0 {
            return Err(CallFlowError::configuration(
                "external.request_timeout_ms must be greater than 0",
            ));
        }

        for (context, rules) in &self.dialplan.contexts {
            for rule in rules {
                AnchoredPattern::new(&rule.pattern).map_err(|e| {
                    CallFlowError::configuration(format!(
                        "context '{}', rule '{}': {}",
                        context, rule.name, e
                    ))
                })?;
                if let Some(caller) = &rule.caller {
                    AnchoredPattern::new(caller).map_err(|e| {
                        CallFlowError::configuration(format!(
                            "context '{}', rule '{}' caller: {}",
                            context, rule.name, e
                        ))
                    })?;
                }
            }
        }

        for (name, menu) in &self.menus {
            for entry in &menu.entries {
                if !is_dtmf_key(&entry.key) {
                    return Err(CallFlowError::configuration(format!(
                        "menu '{}': key '{}' is not a DTMF symbol",
                        name, entry.key
                    )));
                }
            }
        }

        for (name, wizard) in &self.wizards {
            if wizard.slots.is_empty() {
                return Err(CallFlowError::configuration(format!("wizard '{}' has no slots", name)));
            }
            for slot in &wizard.slots {
                if slot.choices.is_empty() {
                    return Err(CallFlowError::configuration(format!(
                        "wizard '{}', slot '{}' has no choices",
                        name, slot.name
                    )));
                }
                for choice in &slot.choices {
                    AnchoredPattern::new(&choice.pattern).map_err(|e| {
                        CallFlowError::configuration(format!(
                            "wizard '{}', slot '{}': {}",
                            name, slot.name, e
                        ))
                    })?;
                }
            }
        }

        Ok(())
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.general.bridge_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }

    pub fn max_queue_wait(&self) -> Duration {
        Duration::from_secs(self.queue.max_wait_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.external.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_behaviour() {
        let config = CallFlowConfig::default();
        assert_eq!(config.ivr.max_attempts, 3);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.general.default_context, "default");
        assert!(config.general.hangup_after_bridge);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_rule_pattern_with_rule_name() {
        let config = CallFlowConfig::from_toml_str(
            r#"
            [[dialplan.contexts.default]]
            name = "broken-rule"
            pattern = "(\\d"
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("broken-rule"));
    }

    #[test]
    fn rejects_missing_default_context() {
        let config = CallFlowConfig::from_toml_str(
            r#"
            [[dialplan.contexts.public]]
            name = "any"
            pattern = '\d+'
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_dtmf_menu_key() {
        let config = CallFlowConfig::from_toml_str(
            r#"
            [menus.main]
            prompt = "ivr/main.wav"
            entries = [{ key = "12", actions = [] }]
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not a DTMF symbol"));
    }

    #[test]
    fn rejects_zero_attempts_and_poll_interval() {
        let mut config = CallFlowConfig::default();
        config.ivr.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = CallFlowConfig::default();
        config.queue.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_wizard_slot_without_choices() {
        let config = CallFlowConfig::from_toml_str(
            r#"
            [wizards.order]
            slots = [{ name = "size", prompt = "ivr/size.wav", choices = [] }]
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
