//! Scripted in-memory call leg.
//!
//! Used by the test suites and by `callflow simulate`. DTMF arrives from a
//! script of digits, pauses and a remote hangup; everything the engine asks
//! the switch to do is recorded for inspection.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::channel::{BridgeOutcome, CallChannel, PlaybackOutcome};
use crate::error::{CallFlowError, Result};
use crate::ivr::CollectControl;
use crate::session::{HangupCause, SessionId};

#[derive(Debug, Clone)]
enum ScriptEvent {
    Digit(char),
    Pause(Duration),
    Hangup,
}

#[derive(Debug, Default)]
struct Recorder {
    answered: u32,
    rings: u32,
    plays: Vec<String>,
    bridges: Vec<Vec<String>>,
    executes: Vec<(String, String)>,
    hangups: Vec<HangupCause>,
}

#[derive(Debug)]
pub struct SimulatedChannel {
    token: CancellationToken,
    script: Mutex<VecDeque<ScriptEvent>>,
    during: Mutex<Vec<(String, String)>>,
    answering: HashSet<String>,
    missing: HashSet<String>,
    ring_time: Duration,
    recorder: Mutex<Recorder>,
}

impl Default for SimulatedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChannel {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            script: Mutex::new(VecDeque::new()),
            during: Mutex::new(Vec::new()),
            answering: HashSet::new(),
            missing: HashSet::new(),
            ring_time: Duration::ZERO,
            recorder: Mutex::new(Recorder::default()),
        }
    }

    /// Queue DTMF digits read after prompts
    pub fn with_digits(self, digits: &str) -> Self {
        self.script
            .lock()
            .extend(digits.chars().map(ScriptEvent::Digit));
        self
    }

    /// Silence before the next scripted event
    pub fn with_pause(self, pause: Duration) -> Self {
        self.script.lock().push_back(ScriptEvent::Pause(pause));
        self
    }

    /// The caller hangs up once the script reaches this point
    pub fn with_hangup(self) -> Self {
        self.script.lock().push_back(ScriptEvent::Hangup);
        self
    }

    /// Digits pressed while `file` plays, delivered on its first playback
    pub fn press_during(self, file: &str, digits: &str) -> Self {
        self.during.lock().push((file.to_string(), digits.to_string()));
        self
    }

    /// Bridge candidate that answers
    pub fn answering(mut self, target: &str) -> Self {
        self.answering.insert(target.to_string());
        self
    }

    /// Prompt file the switch cannot find
    pub fn missing_file(mut self, file: &str) -> Self {
        self.missing.insert(file.to_string());
        self
    }

    /// Time an unanswered bridge rings before it fails
    pub fn with_ring_time(mut self, ring_time: Duration) -> Self {
        self.ring_time = ring_time;
        self
    }

    /// The caller hangs up now
    pub fn remote_hangup(&self) {
        self.token.cancel();
    }

    pub fn answered(&self) -> bool {
        self.recorder.lock().answered > 0
    }

    pub fn rings(&self) -> u32 {
        self.recorder.lock().rings
    }

    pub fn plays(&self) -> Vec<String> {
        self.recorder.lock().plays.clone()
    }

    pub fn played_count(&self, file: &str) -> usize {
        self.recorder.lock().plays.iter().filter(|p| *p == file).count()
    }

    /// Candidate lists passed to each bridge attempt
    pub fn bridges(&self) -> Vec<Vec<String>> {
        self.recorder.lock().bridges.clone()
    }

    pub fn executes(&self) -> Vec<(String, String)> {
        self.recorder.lock().executes.clone()
    }

    /// Causes of local hangups, remote hangups excluded
    pub fn hangups(&self) -> Vec<HangupCause> {
        self.recorder.lock().hangups.clone()
    }

    /// Scripted digits not read yet
    pub fn pending_digits(&self) -> String {
        self.script
            .lock()
            .iter()
            .filter_map(|event| match event {
                ScriptEvent::Digit(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    fn gone(&self) -> CallFlowError {
        CallFlowError::session_gone("simulated channel")
    }

    async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.token.cancelled() => Err(self.gone()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[async_trait]
impl CallChannel for SimulatedChannel {
    async fn answer(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(self.gone());
        }
        self.recorder.lock().answered += 1;
        Ok(())
    }

    async fn ring(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(self.gone());
        }
        self.recorder.lock().rings += 1;
        Ok(())
    }

    fn hangup_token(&self) -> CancellationToken {
        self.token.clone()
    }

    async fn stream_file(
        &self,
        path: &str,
        on_digit: &mut (dyn FnMut(char) -> CollectControl + Send),
    ) -> Result<PlaybackOutcome> {
        if self.token.is_cancelled() {
            return Err(self.gone());
        }
        if self.missing.contains(path) {
            return Err(CallFlowError::action_transient(
                "playback",
                format!("file not found: {}", path),
            ));
        }
        self.recorder.lock().plays.push(path.to_string());

        let pressed = {
            let mut during = self.during.lock();
            during
                .iter()
                .position(|(file, _)| file == path)
                .map(|i| during.remove(i).1)
        };
        if let Some(digits) = pressed {
            for digit in digits.chars() {
                if on_digit(digit) == CollectControl::Stop {
                    return Ok(PlaybackOutcome::Interrupted);
                }
            }
        }
        Ok(PlaybackOutcome::Completed)
    }

    async fn read_digit(&self, timeout: Duration) -> Result<Option<char>> {
        let mut remaining = timeout;
        loop {
            if self.token.is_cancelled() {
                return Err(self.gone());
            }
            let next = self.script.lock().pop_front();
            match next {
                Some(ScriptEvent::Digit(digit)) => return Ok(Some(digit)),
                Some(ScriptEvent::Pause(pause)) if pause >= remaining => {
                    let left = pause - remaining;
                    if !left.is_zero() {
                        self.script.lock().push_front(ScriptEvent::Pause(left));
                    }
                    self.pause(remaining).await?;
                    return Ok(None);
                }
                Some(ScriptEvent::Pause(pause)) => {
                    self.pause(pause).await?;
                    remaining -= pause;
                }
                Some(ScriptEvent::Hangup) => {
                    self.token.cancel();
                    return Err(self.gone());
                }
                None => {
                    self.pause(remaining).await?;
                    return Ok(None);
                }
            }
        }
    }

    async fn bridge(&self, candidates: &[String], timeout: Duration) -> Result<BridgeOutcome> {
        if self.token.is_cancelled() {
            return Err(self.gone());
        }
        self.recorder.lock().bridges.push(candidates.to_vec());

        if let Some(target) = candidates.iter().find(|c| self.answering.contains(*c)) {
            return Ok(BridgeOutcome::Answered {
                target: target.clone(),
                peer: SessionId::new(),
            });
        }
        self.pause(self.ring_time.min(timeout)).await?;
        Ok(BridgeOutcome::Failed {
            cause: HangupCause::NoAnswer,
        })
    }

    async fn execute(&self, app: &str, args: &str) -> Result<String> {
        if self.token.is_cancelled() {
            return Err(self.gone());
        }
        self.recorder
            .lock()
            .executes
            .push((app.to_string(), args.to_string()));
        Ok("+OK".to_string())
    }

    async fn hangup(&self, cause: HangupCause) {
        self.recorder.lock().hangups.push(cause);
        self.token.cancel();
    }
}
