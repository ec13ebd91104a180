use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::action::CollectSpec;
use crate::channel::CallChannel;
use crate::config::IvrConfig;
use crate::error::Result;

/// Per-digit decision of a collection callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectControl {
    Continue,
    Stop,
}

/// Limits for one digit collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectSettings {
    pub min_digits: usize,
    /// Never below `min_digits`
    pub max_digits: usize,
    /// Any of these characters ends collection and is not part of the value
    pub terminators: String,
    /// Wait for the first digit
    pub first_digit_timeout: Duration,
    /// Wait between subsequent digits
    pub inter_digit_timeout: Duration,
    /// Upper bound for the whole collection
    pub absolute_timeout: Duration,
}

impl CollectSettings {
    pub fn new(min_digits: usize, max_digits: usize, ivr: &IvrConfig) -> Self {
        let min_digits = min_digits.max(1);
        Self {
            min_digits,
            max_digits: max_digits.max(min_digits),
            terminators: ivr.terminators.clone(),
            first_digit_timeout: Duration::from_millis(ivr.first_digit_timeout_ms),
            inter_digit_timeout: Duration::from_millis(ivr.inter_digit_timeout_ms),
            absolute_timeout: Duration::from_millis(ivr.absolute_timeout_ms),
        }
    }

    /// Settings for a `collect_digits` action, unset fields from `[ivr]`
    pub fn from_spec(spec: &CollectSpec, ivr: &IvrConfig) -> Self {
        let mut settings = Self::new(spec.min_digits, spec.max_digits, ivr);
        if let Some(terminators) = &spec.terminators {
            settings.terminators = terminators.clone();
        }
        if let Some(ms) = spec.first_digit_timeout_ms {
            settings.first_digit_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = spec.inter_digit_timeout_ms {
            settings.inter_digit_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = spec.absolute_timeout_ms {
            settings.absolute_timeout = Duration::from_millis(ms);
        }
        settings
    }

    pub fn with_terminators(mut self, terminators: impl Into<String>) -> Self {
        self.terminators = terminators.into();
        self
    }

    pub fn with_first_digit_timeout(mut self, timeout: Duration) -> Self {
        self.first_digit_timeout = timeout;
        self
    }
}

/// Why a collection stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Terminator(char),
    MaxLength,
    /// The per-digit callback asked to stop
    Callback,
    /// First-digit or inter-digit timeout
    DigitTimeout,
    AbsoluteTimeout,
}

impl StopReason {
    pub fn is_timeout(self) -> bool {
        matches!(self, StopReason::DigitTimeout | StopReason::AbsoluteTimeout)
    }
}

type DigitPredicate<'a> = Box<dyn FnMut(&str, char) -> CollectControl + Send + 'a>;

/// Mutable state of one collection attempt
///
/// Created fresh for every attempt and dropped after it. Digits pressed
/// while a prompt plays are pushed into the same buffer as digits read
/// afterwards.
pub struct CollectContext<'a> {
    settings: &'a CollectSettings,
    buffer: String,
    stopped: Option<StopReason>,
    predicate: Option<DigitPredicate<'a>>,
}

impl<'a> CollectContext<'a> {
    pub fn new(settings: &'a CollectSettings) -> Self {
        Self {
            settings,
            buffer: String::new(),
            stopped: None,
            predicate: None,
        }
    }

    /// Extra per-digit check run after each digit is buffered
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: FnMut(&str, char) -> CollectControl + Send + 'a,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn push(&mut self, digit: char) -> CollectControl {
        if self.stopped.is_some() {
            return CollectControl::Stop;
        }
        if self.settings.terminators.contains(digit) {
            self.stopped = Some(StopReason::Terminator(digit));
            return CollectControl::Stop;
        }

        self.buffer.push(digit);
        if self.buffer.chars().count() >= self.settings.max_digits {
            self.stopped = Some(StopReason::MaxLength);
            return CollectControl::Stop;
        }
        if let Some(predicate) = self.predicate.as_mut() {
            if predicate(&self.buffer, digit) == CollectControl::Stop {
                self.stopped = Some(StopReason::Callback);
                return CollectControl::Stop;
            }
        }
        CollectControl::Continue
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    fn stop(&mut self, reason: StopReason) {
        if self.stopped.is_none() {
            self.stopped = Some(reason);
        }
    }

    fn finish(self) -> CollectResult {
        let stop = self.stopped.unwrap_or(StopReason::DigitTimeout);
        CollectResult {
            digits: self.buffer,
            terminator: match stop {
                StopReason::Terminator(c) => Some(c),
                _ => None,
            },
            stop,
        }
    }
}

/// Outcome of one collection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectResult {
    /// Collected digits, terminator excluded
    pub digits: String,
    pub terminator: Option<char>,
    pub stop: StopReason,
}

/// Read digits until the context stops or a timeout elapses.
///
/// Digits already pushed (during a prompt) count toward max length and
/// switch the wait to the inter-digit timeout.
pub async fn collect_digits(
    channel: &dyn CallChannel,
    mut ctx: CollectContext<'_>,
) -> Result<CollectResult> {
    let deadline = Instant::now() + ctx.settings.absolute_timeout;

    while !ctx.is_stopped() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            ctx.stop(StopReason::AbsoluteTimeout);
            break;
        }

        let per_digit = if ctx.buffer().is_empty() {
            ctx.settings.first_digit_timeout
        } else {
            ctx.settings.inter_digit_timeout
        };
        let wait = per_digit.min(remaining);

        match channel.read_digit(wait).await? {
            Some(digit) => {
                trace!(digit = %digit, "dtmf");
                ctx.push(digit);
            }
            None if wait < per_digit => ctx.stop(StopReason::AbsoluteTimeout),
            None => ctx.stop(StopReason::DigitTimeout),
        }
    }

    Ok(ctx.finish())
}
