use serde::Serialize;
use tracing::{debug, warn};

use super::collect::{collect_digits, CollectContext, CollectControl, CollectSettings};
use crate::config::IvrConfig;
use crate::error::Result;
use crate::session::CallSession;

/// States of one prompt/collect instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PromptState {
    Prompting,
    Collecting,
    Validating,
    Retrying,
    Confirmed,
    Failed,
}

/// Yes/no round run after a valid entry, before it counts as confirmed
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmSpec {
    pub prompt: String,
    pub yes: String,
    pub no: String,
}

impl ConfirmSpec {
    pub fn new(prompt: impl Into<String>, ivr: &IvrConfig) -> Self {
        Self {
            prompt: prompt.into(),
            yes: ivr.confirm_yes.clone(),
            no: ivr.confirm_no.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptSpec {
    pub prompt: Option<String>,
    /// Played after every failed round
    pub invalid_prompt: Option<String>,
    pub settings: CollectSettings,
    pub max_attempts: u32,
    pub confirm: Option<ConfirmSpec>,
}

impl PromptSpec {
    pub fn new(prompt: Option<String>, settings: CollectSettings, ivr: &IvrConfig) -> Self {
        Self {
            prompt,
            invalid_prompt: None,
            settings,
            max_attempts: ivr.max_attempts,
            confirm: None,
        }
    }

    pub fn with_invalid_prompt(mut self, prompt: Option<String>) -> Self {
        self.invalid_prompt = prompt;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_confirm(mut self, confirm: Option<ConfirmSpec>) -> Self {
        self.confirm = confirm;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptOutcome<T> {
    Confirmed {
        value: T,
        digits: String,
        terminator: Option<char>,
    },
    /// Every attempt failed; the caller applies its default action
    Failed {
        /// Last rejected input, empty when the caller never pressed anything
        last_input: String,
        timed_out: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptRun<T> {
    pub outcome: PromptOutcome<T>,
    /// Main prompt rounds played, confirmation rounds excluded
    pub attempts: u32,
    pub trace: Vec<PromptState>,
}

impl<T> PromptRun<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, PromptOutcome::Confirmed { .. })
    }
}

/// Drives the prompt, collect, validate, retry loop
///
/// ```text
/// Prompting ─▶ Collecting ─▶ Validating ─┬─▶ Confirmed
///     ▲                                  │
///     └──── (attempts < max) ◀─ Retrying ◀┘─▶ Failed (attempts == max)
/// ```
///
/// The same loop backs single-digit menus, `collect_digits` actions,
/// dial-by-name and every wizard slot.
pub struct PromptCollectEngine;

impl PromptCollectEngine {
    /// Run until `validate` accepts an entry or the attempts are used up.
    ///
    /// Fails only with `SessionGone`; missing prompt files are logged and
    /// the round continues without audio.
    pub async fn run<T, F>(session: &CallSession, spec: &PromptSpec, mut validate: F) -> Result<PromptRun<T>>
    where
        F: FnMut(&str) -> Option<T>,
    {
        let channel = session.channel().clone();
        let mut trace = Vec::new();
        let mut attempts = 0;

        loop {
            session.ensure_ready()?;
            attempts += 1;

            trace.push(PromptState::Prompting);
            let mut ctx = CollectContext::new(&spec.settings);
            if let Some(prompt) = &spec.prompt {
                let mut on_digit = |digit: char| ctx.push(digit);
                if let Err(e) = channel.stream_file(prompt, &mut on_digit).await {
                    if e.is_session_gone() {
                        return Err(e);
                    }
                    warn!(session_id = %session.id(), prompt = %prompt, error = %e, "prompt unavailable");
                }
            }

            trace.push(PromptState::Collecting);
            let collected = collect_digits(channel.as_ref(), ctx).await?;

            trace.push(PromptState::Validating);
            let accepted = if collected.digits.chars().count() >= spec.settings.min_digits {
                validate(&collected.digits)
            } else {
                None
            };
            debug!(
                session_id = %session.id(),
                attempt = attempts,
                digits = %collected.digits,
                accepted = accepted.is_some(),
                "prompt round"
            );

            if let Some(value) = accepted {
                let confirmed = match &spec.confirm {
                    Some(confirm) => Self::confirm(session, confirm, &spec.settings).await?,
                    None => true,
                };
                if confirmed {
                    trace.push(PromptState::Confirmed);
                    return Ok(PromptRun {
                        outcome: PromptOutcome::Confirmed {
                            value,
                            digits: collected.digits,
                            terminator: collected.terminator,
                        },
                        attempts,
                        trace,
                    });
                }
            }

            let timed_out = collected.digits.is_empty() && collected.stop.is_timeout();
            let last_input = collected.digits;

            trace.push(PromptState::Retrying);
            if let Some(invalid) = &spec.invalid_prompt {
                Self::play_quietly(session, invalid).await?;
            }

            if attempts >= spec.max_attempts {
                trace.push(PromptState::Failed);
                return Ok(PromptRun {
                    outcome: PromptOutcome::Failed {
                        last_input,
                        timed_out,
                    },
                    attempts,
                    trace,
                });
            }
        }
    }

    /// One yes/no round. Anything but the yes key, silence included, is a no.
    async fn confirm(session: &CallSession, confirm: &ConfirmSpec, settings: &CollectSettings) -> Result<bool> {
        session.ensure_ready()?;
        let confirm_settings = CollectSettings {
            min_digits: 1,
            max_digits: 1,
            terminators: String::new(),
            first_digit_timeout: settings.first_digit_timeout,
            inter_digit_timeout: settings.inter_digit_timeout,
            absolute_timeout: settings.absolute_timeout,
        };
        let mut ctx = CollectContext::new(&confirm_settings);
        let mut on_digit = |digit: char| ctx.push(digit);
        if let Err(e) = session.channel().stream_file(&confirm.prompt, &mut on_digit).await {
            if e.is_session_gone() {
                return Err(e);
            }
            warn!(session_id = %session.id(), prompt = %confirm.prompt, error = %e, "confirm prompt unavailable");
        }
        let answer = collect_digits(session.channel().as_ref(), ctx).await?;
        Ok(answer.digits == confirm.yes)
    }

    async fn play_quietly(session: &CallSession, file: &str) -> Result<()> {
        let mut ignore = |_: char| CollectControl::Continue;
        match session.channel().stream_file(file, &mut ignore).await {
            Err(e) if e.is_session_gone() => Err(e),
            Err(e) => {
                warn!(session_id = %session.id(), file, error = %e, "prompt unavailable");
                Ok(())
            }
            Ok(_) => Ok(()),
        }
    }
}
