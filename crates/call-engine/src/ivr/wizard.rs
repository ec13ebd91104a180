use tracing::{debug, info};

use super::collect::CollectSettings;
use super::engine::{ConfirmSpec, PromptCollectEngine, PromptOutcome, PromptSpec};
use crate::action::Action;
use crate::config::{CallFlowConfig, WizardConfig};
use crate::error::{CallFlowError, Result};
use crate::routing::PriorityTable;
use crate::session::CallSession;

/// One slot of a guided flow
///
/// Collected digits are mapped to a canonical value through a priority
/// table of patterns, first match wins.
#[derive(Debug, Clone)]
pub struct WizardSlot {
    pub name: String,
    spec: PromptSpec,
    choices: PriorityTable<String>,
}

impl WizardSlot {
    pub fn new(name: impl Into<String>, spec: PromptSpec, choices: PriorityTable<String>) -> Self {
        Self {
            name: name.into(),
            spec,
            choices,
        }
    }

    pub fn resolve(&self, digits: &str) -> Option<String> {
        self.choices.lookup(digits).cloned()
    }
}

/// Chain of independent prompt/collect slots
#[derive(Debug, Clone)]
pub struct Wizard {
    name: String,
    slots: Vec<WizardSlot>,
    on_complete: Vec<Action>,
    on_failure: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WizardOutcome {
    /// Every slot confirmed, values in slot order
    Completed {
        values: Vec<(String, String)>,
        actions: Vec<Action>,
    },
    /// A slot ran out of attempts
    Failed {
        slot: String,
        values: Vec<(String, String)>,
        actions: Vec<Action>,
    },
}

impl Wizard {
    pub fn from_config(name: &str, wizard: &WizardConfig, config: &CallFlowConfig) -> Result<Self> {
        let mut slots = Vec::with_capacity(wizard.slots.len());
        for slot in &wizard.slots {
            let mut choices = PriorityTable::new();
            for choice in &slot.choices {
                choices.push(&choice.pattern, choice.value.clone()).map_err(|e| {
                    CallFlowError::configuration(format!("wizard '{}', slot '{}': {}", name, slot.name, e))
                })?;
            }

            let settings = CollectSettings::new(1, slot.max_digits, &config.ivr);
            let spec = PromptSpec::new(Some(slot.prompt.clone()), settings, &config.ivr)
                .with_invalid_prompt(Some(
                    slot.invalid_prompt
                        .clone()
                        .unwrap_or_else(|| config.prompts.invalid_entry.clone()),
                ))
                .with_confirm(
                    slot.confirm_prompt
                        .as_ref()
                        .map(|prompt| ConfirmSpec::new(prompt.clone(), &config.ivr)),
                );

            slots.push(WizardSlot::new(slot.name.clone(), spec, choices));
        }

        let on_failure = if wizard.on_failure.is_empty() {
            super::menu::default_failure_actions(config)
        } else {
            wizard.on_failure.clone()
        };

        Ok(Self {
            name: name.to_string(),
            slots,
            on_complete: wizard.on_complete.clone(),
            on_failure,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session variable holding a slot's value
    pub fn variable_name(&self, slot: &str) -> String {
        format!("{}_{}", self.name, slot)
    }

    pub async fn run(&self, session: &CallSession) -> Result<WizardOutcome> {
        let mut values = Vec::with_capacity(self.slots.len());

        for slot in &self.slots {
            let run = PromptCollectEngine::run(session, &slot.spec, |digits| slot.resolve(digits)).await?;
            match run.outcome {
                PromptOutcome::Confirmed { value, .. } => {
                    debug!(session_id = %session.id(), wizard = %self.name, slot = %slot.name, value = %value, "slot confirmed");
                    values.push((slot.name.clone(), value));
                }
                PromptOutcome::Failed { .. } => {
                    info!(session_id = %session.id(), wizard = %self.name, slot = %slot.name, "slot failed");
                    return Ok(WizardOutcome::Failed {
                        slot: slot.name.clone(),
                        values,
                        actions: self.on_failure.clone(),
                    });
                }
            }
        }

        info!(session_id = %session.id(), wizard = %self.name, slots = values.len(), "wizard complete");
        Ok(WizardOutcome::Completed {
            values,
            actions: self.on_complete.clone(),
        })
    }
}
