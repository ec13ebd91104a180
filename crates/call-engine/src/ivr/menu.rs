use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use super::collect::CollectSettings;
use super::engine::{PromptCollectEngine, PromptOutcome, PromptSpec};
use crate::action::Action;
use crate::config::{CallFlowConfig, MenuConfig};
use crate::error::Result;
use crate::session::{CallSession, HangupCause};

/// Single-level menu: one key selects an action list
#[derive(Debug, Clone)]
pub struct IvrMenu {
    name: String,
    spec: PromptSpec,
    entries: BTreeMap<String, Vec<Action>>,
    on_failure: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MenuOutcome {
    Selected { key: String, actions: Vec<Action> },
    /// No valid key after every attempt
    Failed { actions: Vec<Action> },
}

impl IvrMenu {
    pub fn from_config(name: &str, menu: &MenuConfig, config: &CallFlowConfig) -> Self {
        // every key is a valid entry, so no terminator
        let mut settings = CollectSettings::new(1, 1, &config.ivr).with_terminators("");
        if let Some(ms) = menu.timeout_ms {
            settings = settings.with_first_digit_timeout(Duration::from_millis(ms));
        }

        let spec = PromptSpec::new(Some(menu.prompt.clone()), settings, &config.ivr)
            .with_invalid_prompt(Some(
                menu.invalid_prompt
                    .clone()
                    .unwrap_or_else(|| config.prompts.invalid_entry.clone()),
            ))
            .with_max_attempts(menu.max_attempts.unwrap_or(config.ivr.max_attempts));

        let entries = menu
            .entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.actions.clone()))
            .collect();

        let on_failure = if menu.on_failure.is_empty() {
            default_failure_actions(config)
        } else {
            menu.on_failure.clone()
        };

        Self {
            name: name.to_string(),
            spec,
            entries,
            on_failure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self, session: &CallSession) -> Result<MenuOutcome> {
        let run = PromptCollectEngine::run(session, &self.spec, |digits| {
            self.entries.get(digits).map(|actions| (digits.to_string(), actions.clone()))
        })
        .await?;

        match run.outcome {
            PromptOutcome::Confirmed {
                value: (key, actions),
                ..
            } => {
                info!(session_id = %session.id(), menu = %self.name, key = %key, "menu selection");
                Ok(MenuOutcome::Selected { key, actions })
            }
            PromptOutcome::Failed { .. } => {
                info!(session_id = %session.id(), menu = %self.name, attempts = run.attempts, "menu failed");
                Ok(MenuOutcome::Failed {
                    actions: self.on_failure.clone(),
                })
            }
        }
    }
}

/// Operator transfer when one is configured, otherwise not-available and hangup
pub fn default_failure_actions(config: &CallFlowConfig) -> Vec<Action> {
    match &config.ivr.operator_extension {
        Some(operator) => vec![Action::transfer(operator.clone())],
        None => vec![
            Action::playback(config.prompts.not_available.clone()),
            Action::Hangup {
                cause: HangupCause::NormalClearing,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MenuEntry;
    use crate::session::InboundCall;
    use crate::sim::SimulatedChannel;
    use std::sync::Arc;

    fn menu_config() -> MenuConfig {
        MenuConfig {
            prompt: "ivr/main_menu.wav".into(),
            invalid_prompt: None,
            max_attempts: None,
            timeout_ms: None,
            entries: vec![
                MenuEntry {
                    key: "1".into(),
                    label: Some("sales".into()),
                    actions: vec![Action::transfer("2000")],
                },
                MenuEntry {
                    key: "#".into(),
                    label: None,
                    actions: vec![Action::transfer("0")],
                },
            ],
            on_failure: vec![],
        }
    }

    fn session(channel: Arc<SimulatedChannel>) -> CallSession {
        CallSession::new(InboundCall::new("1000", "5000", "pbx.local"), "default", channel)
    }

    #[tokio::test(start_paused = true)]
    async fn selects_entry_by_key() {
        let channel = Arc::new(SimulatedChannel::new().with_digits("#"));
        let menu = IvrMenu::from_config("main", &menu_config(), &CallFlowConfig::default());
        let outcome = menu.run(&session(channel)).await.unwrap();
        assert_eq!(
            outcome,
            MenuOutcome::Selected {
                key: "#".into(),
                actions: vec![Action::transfer("0")]
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_defaults_to_operator() {
        let mut config = CallFlowConfig::default();
        config.ivr.operator_extension = Some("0".into());
        let channel = Arc::new(SimulatedChannel::new().with_digits("999"));
        let menu = IvrMenu::from_config("main", &menu_config(), &config);
        let outcome = menu.run(&session(channel.clone())).await.unwrap();
        assert_eq!(
            outcome,
            MenuOutcome::Failed {
                actions: vec![Action::transfer("0")]
            }
        );
        assert_eq!(channel.played_count(&config.prompts.invalid_entry), 3);
    }

    #[test]
    fn failure_without_operator_plays_not_available() {
        let config = CallFlowConfig::default();
        let actions = default_failure_actions(&config);
        assert_eq!(actions[0], Action::playback(config.prompts.not_available.clone()));
        assert!(matches!(actions[1], Action::Hangup { .. }));
    }
}
