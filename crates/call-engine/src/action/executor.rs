use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::dial::DialString;
use super::types::{Action, CollectSpec, ExternalCallSpec, LogLevel};
use crate::channel::{sleep_unless_hangup, BridgeOutcome, CallChannel};
use crate::config::CallFlowConfig;
use crate::directory::{resolve_by_name, Directory, StaticDirectory};
use crate::error::{CallFlowError, Result};
use crate::external::{ExternalServiceClient, HttpTransport, LookupClient, LookupOutcome};
use crate::ivr::menu::default_failure_actions;
use crate::ivr::{
    CollectControl, CollectSettings, IvrMenu, MenuOutcome, PromptCollectEngine, PromptOutcome,
    PromptSpec, Wizard, WizardOutcome,
};
use crate::queue::{HttpQueueService, QueueExit, QueuePoller, QueueService};
use crate::routing::{expand, AnchoredPattern};
use crate::session::{CallSession, HangupCause, PeerLeg};

/// Where a transfer re-enters routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferTarget {
    pub extension: String,
    pub dialplan: String,
    /// The session's current context when absent
    pub context: Option<String>,
}

impl TransferTarget {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            dialplan: "XML".to_string(),
            context: None,
        }
    }

    /// Parse `"extension [dialplan [context]]"`
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split_whitespace();
        let extension = parts.next()?;
        Some(Self {
            extension: extension.to_string(),
            dialplan: parts.next().unwrap_or("XML").to_string(),
            context: parts.next().map(str::to_string),
        })
    }

    /// Routed by this engine rather than handed to the switch
    pub fn is_local(&self) -> bool {
        self.dialplan.eq_ignore_ascii_case("xml")
    }
}

/// What the sequence does after an action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum Flow {
    Next,
    /// The action hung the call up
    Hangup,
    /// Re-route, ending this sequence
    Transfer(TransferTarget),
    /// The switch took the call over
    HandedOff,
    /// Stop here; the call ends on the failure prompt
    Abort,
    /// Run these before the rest of the sequence
    Insert { actions: Vec<Action> },
    /// Run these instead of the rest of the sequence
    Replace { actions: Vec<Action> },
}

/// Record of one executed action
#[derive(Debug, Clone, Serialize)]
pub struct SideEffectReport {
    pub action: &'static str,
    pub succeeded: bool,
    pub detail: String,
    pub flow: Flow,
}

impl SideEffectReport {
    fn ok(action: &Action, detail: impl Into<String>, flow: Flow) -> Self {
        Self {
            action: action.name(),
            succeeded: true,
            detail: detail.into(),
            flow,
        }
    }

    fn failed(action: &Action, err: &CallFlowError) -> Self {
        Self {
            action: action.name(),
            succeeded: false,
            detail: err.to_string(),
            flow: Flow::Next,
        }
    }
}

/// How an action sequence ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "end", rename_all = "snake_case")]
pub enum SequenceOutcome {
    /// Ran out of actions with the call still up; `failed` when the last
    /// action failed (typically a bridge nobody answered)
    Completed { failed: bool },
    Transfer(TransferTarget),
    HungUp,
    HandedOff,
    Aborted,
    /// The leg hung up; the remaining actions were skipped
    SessionGone,
}

/// Runs call-control actions against a session, one at a time
///
/// Each action checks that the session is still usable before it touches
/// the switch. Failures that have a declared fallback never escape
/// [`run_sequence`](Self::run_sequence): they are logged and the sequence
/// falls through to the next action.
pub struct ActionExecutor {
    config: Arc<CallFlowConfig>,
    lookup: LookupClient,
    queue: QueuePoller,
    directory: Arc<dyn Directory>,
    menus: HashMap<String, IvrMenu>,
    wizards: HashMap<String, Wizard>,
}

impl ActionExecutor {
    pub fn new(config: Arc<CallFlowConfig>, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let client = ExternalServiceClient::new(transport, config.request_timeout());
        let lookup = LookupClient::new(client.clone(), config.external.no_data_sentinels.clone());
        let queue_service = Arc::new(HttpQueueService::new(client, config.queue.base_url.clone()));
        let queue = QueuePoller::from_config(queue_service, &config.queue);
        let directory = Arc::new(StaticDirectory::new(config.directory.records.clone()));

        let menus = config
            .menus
            .iter()
            .map(|(name, menu)| (name.clone(), IvrMenu::from_config(name, menu, &config)))
            .collect();
        let mut wizards = HashMap::new();
        for (name, wizard) in &config.wizards {
            wizards.insert(name.clone(), Wizard::from_config(name, wizard, &config)?);
        }

        Ok(Self {
            config,
            lookup,
            queue,
            directory,
            menus,
            wizards,
        })
    }

    pub fn with_queue_service(mut self, service: Arc<dyn QueueService>) -> Self {
        self.queue = QueuePoller::from_config(service, &self.config.queue);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn config(&self) -> &CallFlowConfig {
        &self.config
    }

    /// Run `actions` in order until one ends the sequence.
    ///
    /// Every report, failed actions included, is appended to `steps`. Only
    /// internal errors are returned; session loss is an outcome.
    pub async fn run_sequence(
        &self,
        session: &mut CallSession,
        actions: &[Action],
        captures: &[String],
        steps: &mut Vec<SideEffectReport>,
    ) -> Result<SequenceOutcome> {
        let mut pending: VecDeque<Action> = actions.iter().cloned().collect();
        let mut failed = false;

        while let Some(action) = pending.pop_front() {
            if !action.is_cleanup_safe() && !session.is_ready() {
                debug!(session_id = %session.id(), skipped = pending.len() + 1, "session gone, skipping remaining actions");
                return Ok(SequenceOutcome::SessionGone);
            }

            match self.execute(session, &action, captures).await {
                Ok(report) => {
                    failed = false;
                    let flow = report.flow.clone();
                    steps.push(report);
                    match flow {
                        Flow::Next => {}
                        Flow::Hangup => return Ok(SequenceOutcome::HungUp),
                        Flow::HandedOff => return Ok(SequenceOutcome::HandedOff),
                        Flow::Abort => return Ok(SequenceOutcome::Aborted),
                        Flow::Transfer(target) => return Ok(SequenceOutcome::Transfer(target)),
                        Flow::Insert { actions } => {
                            for inserted in actions.into_iter().rev() {
                                pending.push_front(inserted);
                            }
                        }
                        Flow::Replace { actions } => pending = actions.into(),
                    }
                }
                Err(e) if e.is_session_gone() => {
                    debug!(session_id = %session.id(), action = action.name(), "session gone during action");
                    return Ok(SequenceOutcome::SessionGone);
                }
                Err(e @ (CallFlowError::Internal(_) | CallFlowError::InvalidTransition { .. })) => {
                    error!(session_id = %session.id(), action = action.name(), error = %e, "action sequence failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(session_id = %session.id(), action = action.name(), error = %e, "action failed, continuing");
                    failed = true;
                    steps.push(SideEffectReport::failed(&action, &e));
                }
            }
        }

        Ok(SequenceOutcome::Completed { failed })
    }

    /// Execute one action.
    ///
    /// `captures` are the matched rule's pattern groups, used by `$1`..`$9`.
    pub async fn execute(
        &self,
        session: &mut CallSession,
        action: &Action,
        captures: &[String],
    ) -> Result<SideEffectReport> {
        if !action.is_cleanup_safe() {
            session.ensure_ready()?;
        }
        debug!(session_id = %session.id(), action = action.name(), "executing action");
        let channel = session.channel().clone();

        match action {
            Action::Answer => {
                if !session.is_answered() {
                    channel.answer().await?;
                }
                session.mark_answered()?;
                Ok(SideEffectReport::ok(action, "answered", Flow::Next))
            }

            Action::Ring => {
                if session.is_answered() {
                    return Ok(SideEffectReport::ok(action, "already answered", Flow::Next));
                }
                channel.ring().await?;
                session.mark_ringing()?;
                Ok(SideEffectReport::ok(action, "ringing", Flow::Next))
            }

            Action::Playback { file, fallback } => {
                let file = expand(file, &*session, captures);
                let fallback = fallback.as_deref().map(|f| expand(f, &*session, captures));
                let detail = self.playback(session, channel.as_ref(), &file, fallback).await?;
                Ok(SideEffectReport::ok(action, detail, Flow::Next))
            }

            Action::SetVariable { key, value } => {
                let key = expand(key, &*session, captures);
                let value = expand(value, &*session, captures);
                trace!(session_id = %session.id(), %key, %value, "set variable");
                session.set_variable(key.clone(), value.clone())?;
                Ok(SideEffectReport::ok(action, format!("{}={}", key, value), Flow::Next))
            }

            Action::Bridge { target, timeout_secs } => {
                let dial = expand(target, &*session, captures);
                let timeout = timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.config.bridge_timeout());
                let flow = self.bridge(session, channel.as_ref(), &dial, timeout).await?;
                Ok(SideEffectReport::ok(action, format!("bridged via '{}'", dial), flow))
            }

            Action::Transfer { extension, dialplan, context } => {
                let target = TransferTarget {
                    extension: expand(extension, &*session, captures),
                    dialplan: expand(dialplan, &*session, captures),
                    context: context.as_deref().map(|c| expand(c, &*session, captures)),
                };
                self.transfer(session, channel.as_ref(), target)
                    .await
                    .map(|(detail, flow)| SideEffectReport::ok(action, detail, flow))
            }

            Action::CollectDigits(spec) => {
                let (detail, flow) = self.collect(session, spec, captures).await?;
                Ok(SideEffectReport::ok(action, detail, flow))
            }

            Action::Sleep { ms } => {
                if !sleep_unless_hangup(&session.hangup_token(), Duration::from_millis(*ms)).await {
                    return Err(CallFlowError::session_gone(session.id().to_string()));
                }
                Ok(SideEffectReport::ok(action, format!("slept {}ms", ms), Flow::Next))
            }

            Action::ExternalCall(spec) => {
                let (detail, flow) = self.external_call(session, spec, captures).await?;
                Ok(SideEffectReport::ok(action, detail, flow))
            }

            Action::Hangup { cause } => {
                session.begin_hangup(*cause).await;
                Ok(SideEffectReport::ok(action, cause.as_str(), Flow::Hangup))
            }

            Action::Menu { name } => {
                let menu = self
                    .menus
                    .get(name)
                    .ok_or_else(|| CallFlowError::not_found(format!("menu '{}'", name)))?;
                match menu.run(&*session).await? {
                    MenuOutcome::Selected { key, actions } => {
                        session.set_variable(format!("{}_selection", name), key.clone())?;
                        Ok(SideEffectReport::ok(action, format!("selected '{}'", key), Flow::Insert { actions }))
                    }
                    MenuOutcome::Failed { actions } => {
                        Ok(SideEffectReport::ok(action, "no valid selection", Flow::Replace { actions }))
                    }
                }
            }

            Action::Wizard { name } => {
                let wizard = self
                    .wizards
                    .get(name)
                    .ok_or_else(|| CallFlowError::not_found(format!("wizard '{}'", name)))?;
                match wizard.run(&*session).await? {
                    WizardOutcome::Completed { values, actions } => {
                        for (slot, value) in &values {
                            session.set_variable(wizard.variable_name(slot), value.clone())?;
                        }
                        Ok(SideEffectReport::ok(
                            action,
                            format!("{} slots confirmed", values.len()),
                            Flow::Insert { actions },
                        ))
                    }
                    WizardOutcome::Failed { slot, values, actions } => {
                        for (done, value) in &values {
                            session.set_variable(wizard.variable_name(done), value.clone())?;
                        }
                        Ok(SideEffectReport::ok(
                            action,
                            format!("slot '{}' failed", slot),
                            Flow::Replace { actions },
                        ))
                    }
                }
            }

            Action::DialByName { context } => {
                let context = context.as_deref().map(|c| expand(c, &*session, captures));
                let (detail, flow) = self.dial_by_name(session, context).await?;
                Ok(SideEffectReport::ok(action, detail, flow))
            }

            Action::Queue { group, landing, bridge } => {
                let group = expand(group, &*session, captures);
                let landing = landing
                    .as_deref()
                    .map(|l| expand(l, &*session, captures))
                    .unwrap_or_else(|| session.destination().to_string());
                let bridge = bridge.as_deref().map(|b| expand(b, &*session, captures));
                let (detail, flow) = self
                    .hold_in_queue(session, channel.as_ref(), &group, &landing, bridge)
                    .await?;
                Ok(SideEffectReport::ok(action, detail, flow))
            }

            Action::Voicemail { mailbox } => {
                let mailbox = expand(mailbox, &*session, captures);
                let args = format!("default {} {}", session.domain(), mailbox);
                channel.execute("voicemail", &args).await?;
                Ok(SideEffectReport::ok(action, format!("voicemail {}", mailbox), Flow::Next))
            }

            Action::Log { level, message } => {
                let message = expand(message, &*session, captures);
                let id = session.id();
                match level {
                    LogLevel::Error => error!(session_id = %id, "{}", message),
                    LogLevel::Warn => warn!(session_id = %id, "{}", message),
                    LogLevel::Info => info!(session_id = %id, "{}", message),
                    LogLevel::Debug => debug!(session_id = %id, "{}", message),
                    LogLevel::Trace => trace!(session_id = %id, "{}", message),
                }
                Ok(SideEffectReport::ok(action, message, Flow::Next))
            }
        }
    }

    /// Play `file`, or the fallback prompt when it cannot be played.
    async fn playback(
        &self,
        session: &CallSession,
        channel: &dyn CallChannel,
        file: &str,
        fallback: Option<String>,
    ) -> Result<String> {
        let mut ignore = |_: char| CollectControl::Continue;
        match channel.stream_file(file, &mut ignore).await {
            Ok(_) => return Ok(format!("played {}", file)),
            Err(e) if e.is_session_gone() => return Err(e),
            Err(e) => warn!(session_id = %session.id(), file, error = %e, "playback failed, using fallback prompt"),
        }

        let fallback = fallback.unwrap_or_else(|| self.config.prompts.fallback.clone());
        channel.stream_file(&fallback, &mut ignore).await?;
        Ok(format!("played fallback {}", fallback))
    }

    /// Try each failover group; any candidate of a group answering is success.
    async fn bridge(
        &self,
        session: &mut CallSession,
        channel: &dyn CallChannel,
        dial: &str,
        timeout: Duration,
    ) -> Result<Flow> {
        let dial_string = DialString::parse(dial);
        if dial_string.is_empty() {
            session.set_variable("bridge_result", "failed")?;
            return Err(CallFlowError::action_terminal("bridge", "empty dial string"));
        }

        let mut last_cause = HangupCause::NoAnswer;
        for group in dial_string.groups() {
            session.ensure_ready()?;
            debug!(session_id = %session.id(), candidates = ?group, "bridging");
            match channel.bridge(group, timeout).await? {
                BridgeOutcome::Answered { target, peer } => {
                    info!(session_id = %session.id(), %target, peer = %peer, "bridge answered");
                    session.set_variable("bridge_result", "answered")?;
                    session.set_variable("originate_disposition", "SUCCESS")?;
                    session.set_variable("bridged_to", target.clone())?;
                    session.mark_bridged(PeerLeg {
                        session_id: peer,
                        target,
                    })?;
                    return self.after_bridge(session).await;
                }
                BridgeOutcome::Failed { cause } => {
                    debug!(session_id = %session.id(), cause = %cause, "bridge group failed");
                    last_cause = cause;
                }
            }
        }

        session.set_variable("bridge_result", "failed")?;
        session.set_variable("originate_disposition", last_cause.as_str())?;
        info!(session_id = %session.id(), dial, cause = %last_cause, "no bridge candidate answered");
        Err(CallFlowError::action_terminal(
            "bridge",
            format!("no candidate answered ({})", last_cause),
        ))
    }

    /// The bridged conversation is over: hang up, or go back to Answered
    /// when `hangup_after_bridge` is off.
    async fn after_bridge(&self, session: &mut CallSession) -> Result<Flow> {
        let hangup = session
            .variable_flag("hangup_after_bridge")
            .unwrap_or(self.config.general.hangup_after_bridge);
        if hangup {
            session.begin_hangup(HangupCause::NormalClearing).await;
            Ok(Flow::Hangup)
        } else {
            session.end_bridge()?;
            Ok(Flow::Next)
        }
    }

    async fn transfer(
        &self,
        session: &mut CallSession,
        channel: &dyn CallChannel,
        target: TransferTarget,
    ) -> Result<(String, Flow)> {
        if target.extension.is_empty() {
            return Err(CallFlowError::action_terminal("transfer", "empty extension"));
        }
        if target.is_local() {
            return Ok((format!("transfer to {}", target.extension), Flow::Transfer(target)));
        }

        // Other dialplans belong to the switch
        let mut args = format!("{} {}", target.extension, target.dialplan);
        if let Some(context) = &target.context {
            args.push(' ');
            args.push_str(context);
        }
        channel.execute("transfer", &args).await?;
        info!(session_id = %session.id(), %args, "call handed to switch dialplan");
        Ok((format!("transfer {}", args), Flow::HandedOff))
    }

    async fn collect(
        &self,
        session: &mut CallSession,
        spec: &CollectSpec,
        captures: &[String],
    ) -> Result<(String, Flow)> {
        let ivr = &self.config.ivr;
        let validation = spec
            .validation
            .as_deref()
            .map(AnchoredPattern::new)
            .transpose()?;

        let prompt_spec = PromptSpec::new(
            spec.prompt.as_deref().map(|p| expand(p, &*session, captures)),
            CollectSettings::from_spec(spec, ivr),
            ivr,
        )
        .with_invalid_prompt(spec.invalid_prompt.as_deref().map(|p| expand(p, &*session, captures)))
        .with_max_attempts(spec.max_attempts.unwrap_or(ivr.max_attempts));

        let run = PromptCollectEngine::run(&*session, &prompt_spec, |digits| match &validation {
            Some(pattern) if !pattern.is_match(digits) => None,
            _ => Some(digits.to_string()),
        })
        .await?;

        match run.outcome {
            PromptOutcome::Confirmed { value, terminator, .. } => {
                session.set_variable(spec.variable.clone(), value.clone())?;
                session.set_variable("read_result", "success")?;
                session.set_variable(
                    "read_terminator_used",
                    terminator.map(String::from).unwrap_or_default(),
                )?;
                Ok((format!("collected '{}'", value), Flow::Next))
            }
            PromptOutcome::Failed { last_input, timed_out } => {
                session.set_variable(spec.variable.clone(), "")?;
                session.set_variable("read_result", if timed_out { "timeout" } else { "failure" })?;
                session.set_variable(format!("{}_invalid", spec.variable), last_input)?;
                let detail = format!("no valid input after {} attempts", run.attempts);

                match spec.transfer_on_failure.as_deref().map(|t| expand(t, &*session, captures)) {
                    Some(target) => match TransferTarget::parse(&target) {
                        Some(target) => Ok((detail, Flow::Transfer(target))),
                        None => Err(CallFlowError::configuration(format!(
                            "transfer_on_failure '{}' names no extension",
                            target
                        ))),
                    },
                    None => Ok((detail, Flow::Next)),
                }
            }
        }
    }

    async fn external_call(
        &self,
        session: &mut CallSession,
        spec: &ExternalCallSpec,
        captures: &[String],
    ) -> Result<(String, Flow)> {
        let mut request = self
            .lookup
            .client()
            .request(spec.method, expand(&spec.url, &*session, captures));
        if let Some(ms) = spec.timeout_ms {
            request.timeout = Duration::from_millis(ms);
        }
        for (key, value) in &spec.params {
            request = request.param(key.clone(), expand(value, &*session, captures));
        }

        let token = session.hangup_token();
        let id = session.id().to_string();
        let outcome = self
            .lookup
            .resolve(request, spec.result_field.as_deref(), &token, &id)
            .await?;

        let failure = match outcome {
            LookupOutcome::Found(value) => {
                session.set_variable("external_result", "found")?;
                if let Some(variable) = &spec.result_variable {
                    session.set_variable(variable.clone(), value.clone())?;
                }
                return Ok((format!("found '{}'", value), Flow::Next));
            }
            LookupOutcome::NoData => {
                session.set_variable("external_result", "no_data")?;
                "no data".to_string()
            }
            LookupOutcome::Failed(e) => {
                session.set_variable("external_result", "failed")?;
                e.to_string()
            }
        };

        if !spec.on_failure.is_empty() {
            info!(session_id = %session.id(), url = %spec.url, reason = %failure, "external call fell back");
            Ok((
                format!("fallback route ({})", failure),
                Flow::Replace {
                    actions: spec.on_failure.clone(),
                },
            ))
        } else if spec.abort_on_error {
            Ok((format!("aborted ({})", failure), Flow::Abort))
        } else {
            Ok((failure, Flow::Next))
        }
    }

    async fn dial_by_name(
        &self,
        session: &mut CallSession,
        context: Option<String>,
    ) -> Result<(String, Flow)> {
        let directory = &self.config.directory;
        let settings = CollectSettings::new(1, directory.search_digits, &self.config.ivr);
        let spec = PromptSpec::new(Some(directory.prompt.clone()), settings, &self.config.ivr)
            .with_invalid_prompt(Some(self.config.prompts.invalid_entry.clone()));

        let lookup = self.directory.as_ref();
        let id = session.id().clone();
        let run = PromptCollectEngine::run(&*session, &spec, |digits| {
            resolve_by_name(lookup, digits).unwrap_or_else(|e| {
                warn!(session_id = %id, error = %e, "directory lookup failed");
                None
            })
        })
        .await?;

        match run.outcome {
            PromptOutcome::Confirmed { value: record, .. } => {
                session.set_variable("directory_match", record.extension.clone())?;
                let target = TransferTarget {
                    extension: record.extension.clone(),
                    dialplan: "XML".to_string(),
                    context,
                };
                Ok((
                    format!("{} {} at {}", record.first_name, record.last_name, record.extension),
                    Flow::Transfer(target),
                ))
            }
            PromptOutcome::Failed { .. } => Ok((
                "no unique directory match".to_string(),
                Flow::Replace {
                    actions: default_failure_actions(&self.config),
                },
            )),
        }
    }

    async fn hold_in_queue(
        &self,
        session: &mut CallSession,
        channel: &dyn CallChannel,
        group: &str,
        landing: &str,
        bridge: Option<String>,
    ) -> Result<(String, Flow)> {
        let run = self.queue.run(&*session, group, landing).await?;
        session.set_variable("queue_polls", run.membership.polls.to_string())?;

        match run.exit {
            QueueExit::SessionGone => Err(CallFlowError::session_gone(session.id().to_string())),
            QueueExit::JoinFailed => {
                session.set_variable("queue_result", "join_failed")?;
                Ok(("queue join failed".to_string(), Flow::Next))
            }
            QueueExit::Left(reason) => {
                session.set_variable("queue_result", reason.as_str())?;
                Ok((format!("left queue: {}", reason), Flow::Next))
            }
            QueueExit::Bridge(code) => {
                session.set_variable("queue_result", "bridge")?;
                match bridge {
                    Some(target) => Ok((
                        format!("status {} requested direct bridge", code),
                        Flow::Insert {
                            actions: vec![Action::Bridge {
                                target,
                                timeout_secs: None,
                            }],
                        },
                    )),
                    None => {
                        channel.execute("callcenter", group).await?;
                        Ok((format!("status {} handed to callcenter {}", code, group), Flow::Next))
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("menus", &self.menus.keys().collect::<Vec<_>>())
            .field("wizards", &self.wizards.keys().collect::<Vec<_>>())
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ServiceRequest, ServiceResponse};
    use crate::session::{CallState, InboundCall};
    use crate::sim::SimulatedChannel;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl HttpTransport for Fixed {
        async fn send(&self, _request: &ServiceRequest) -> Result<ServiceResponse> {
            Ok(ServiceResponse {
                status: 200,
                body: self.0.to_string(),
            })
        }
    }

    fn executor_with(config: CallFlowConfig, body: &'static str) -> ActionExecutor {
        ActionExecutor::new(Arc::new(config), Arc::new(Fixed(body))).unwrap()
    }

    fn executor() -> ActionExecutor {
        executor_with(CallFlowConfig::default(), "no data")
    }

    fn session(channel: Arc<SimulatedChannel>, destination: &str) -> CallSession {
        CallSession::new(
            InboundCall::new("1000", destination, "pbx.local"),
            "default",
            channel,
        )
    }

    async fn run(
        executor: &ActionExecutor,
        session: &mut CallSession,
        actions: &[Action],
    ) -> (SequenceOutcome, Vec<SideEffectReport>) {
        let mut steps = Vec::new();
        let outcome = executor
            .run_sequence(session, actions, &[], &mut steps)
            .await
            .unwrap();
        (outcome, steps)
    }

    #[tokio::test]
    async fn failed_bridge_falls_through_to_next_action() {
        let channel = Arc::new(SimulatedChannel::new());
        let mut session = session(channel.clone(), "1234");
        let executor = executor();

        let (outcome, steps) = run(
            &executor,
            &mut session,
            &[
                Action::bridge("user/{d}@{domain}"),
                Action::playback("ivr/not_available.wav"),
            ],
        )
        .await;

        assert_eq!(outcome, SequenceOutcome::Completed { failed: false });
        assert_eq!(channel.bridges(), vec![vec!["user/1234@pbx.local".to_string()]]);
        assert_eq!(channel.played_count("ivr/not_available.wav"), 1);
        assert!(!steps[0].succeeded);
        assert_eq!(session.variable("bridge_result"), Some("failed"));
        assert_eq!(session.variable("originate_disposition"), Some("NO_ANSWER"));
    }

    #[tokio::test]
    async fn parallel_candidates_then_failover_group() {
        let channel = Arc::new(SimulatedChannel::new().answering("user/2000@pbx.local"));
        let mut session = session(channel.clone(), "1234");

        let (outcome, _) = run(
            &executor(),
            &mut session,
            &[Action::bridge("user/1000@pbx.local,user/1001@pbx.local|user/2000@pbx.local")],
        )
        .await;

        assert_eq!(outcome, SequenceOutcome::HungUp);
        assert_eq!(channel.bridges().len(), 2);
        assert_eq!(channel.bridges()[0].len(), 2);
        assert_eq!(session.variable("bridged_to"), Some("user/2000@pbx.local"));
        assert_eq!(channel.hangups(), vec![HangupCause::NormalClearing]);
    }

    #[tokio::test]
    async fn bridge_without_hangup_after_returns_to_answered() {
        let channel = Arc::new(SimulatedChannel::new().answering("user/1234@pbx.local"));
        let mut session = session(channel.clone(), "1234");
        let (outcome, _) = run(
            &executor(),
            &mut session,
            &[
                Action::set("hangup_after_bridge", "false"),
                Action::bridge("user/1234@pbx.local"),
                Action::playback("ivr/goodbye.wav"),
            ],
        )
        .await;

        assert_eq!(outcome, SequenceOutcome::Completed { failed: false });
        assert_eq!(session.state(), CallState::Answered);
        assert!(session.peer().is_none());
        assert_eq!(channel.played_count("ivr/goodbye.wav"), 1);
    }

    #[tokio::test]
    async fn missing_prompt_plays_fallback() {
        let channel = Arc::new(SimulatedChannel::new().missing_file("ivr/welcome.wav"));
        let mut session = session(channel.clone(), "1234");
        let (_, steps) = run(&executor(), &mut session, &[Action::playback("ivr/welcome.wav")]).await;

        assert_eq!(channel.plays(), vec!["ivr/not_available.wav".to_string()]);
        assert!(steps[0].detail.contains("fallback"));
    }

    #[tokio::test]
    async fn transfer_ends_the_sequence() {
        let channel = Arc::new(SimulatedChannel::new());
        let mut session = session(channel.clone(), "0");
        let (outcome, _) = run(
            &executor(),
            &mut session,
            &[Action::transfer("1000"), Action::playback("ivr/never.wav")],
        )
        .await;

        assert_eq!(outcome, SequenceOutcome::Transfer(TransferTarget::new("1000")));
        assert_eq!(channel.played_count("ivr/never.wav"), 0);
    }

    #[tokio::test]
    async fn protected_variable_is_refused_but_sequence_continues() {
        let channel = Arc::new(SimulatedChannel::new());
        let mut session = session(channel.clone(), "1234");
        let (outcome, steps) = run(
            &executor(),
            &mut session,
            &[
                Action::set("caller_id_number", "666"),
                Action::set("effective_caller_id_number", "555"),
            ],
        )
        .await;

        assert_eq!(outcome, SequenceOutcome::Completed { failed: false });
        assert!(!steps[0].succeeded);
        assert_eq!(session.caller(), "1000");
        assert_eq!(session.variable("effective_caller_id_number"), Some("555"));
    }

    #[tokio::test]
    async fn external_no_data_replaces_rest_of_sequence() {
        let channel = Arc::new(SimulatedChannel::new());
        let mut session = session(channel.clone(), "+46851758284");
        let mut lookup = ExternalCallSpec::get("http://lookup.invalid/did");
        lookup.result_variable = Some("internal_ext".into());
        lookup.on_failure = vec![Action::bridge("sofia/gateway/default/{d}")];

        let (_, _) = run(
            &executor(),
            &mut session,
            &[
                Action::ExternalCall(lookup),
                Action::bridge("user/${internal_ext}@{domain}"),
            ],
        )
        .await;

        assert_eq!(session.variable("external_result"), Some("no_data"));
        assert_eq!(
            channel.bridges(),
            vec![vec!["sofia/gateway/default/+46851758284".to_string()]]
        );
    }

    #[tokio::test]
    async fn external_found_sets_result_variable() {
        let channel = Arc::new(SimulatedChannel::new().answering("user/1001@pbx.local"));
        let mut session = session(channel.clone(), "+46851758284");
        let mut lookup = ExternalCallSpec::get("http://lookup.invalid/did");
        lookup.result_variable = Some("internal_ext".into());

        let (outcome, _) = run(
            &executor_with(CallFlowConfig::default(), "1001\n"),
            &mut session,
            &[
                Action::ExternalCall(lookup),
                Action::bridge("user/${internal_ext}@{domain}"),
            ],
        )
        .await;

        assert_eq!(outcome, SequenceOutcome::HungUp);
        assert_eq!(channel.bridges(), vec![vec!["user/1001@pbx.local".to_string()]]);
    }

    #[tokio::test]
    async fn abort_on_error_stops_the_sequence() {
        let channel = Arc::new(SimulatedChannel::new());
        let mut session = session(channel.clone(), "1234");
        let mut lookup = ExternalCallSpec::get("http://lookup.invalid/did");
        lookup.abort_on_error = true;
        let (outcome, _) = run(
            &executor(),
            &mut session,
            &[Action::ExternalCall(lookup), Action::playback("ivr/never.wav")],
        )
        .await;
        assert_eq!(outcome, SequenceOutcome::Aborted);
        assert!(channel.plays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn collect_failure_sets_read_variables_and_transfers() {
        let channel = Arc::new(SimulatedChannel::new().with_digits("9#9#9#"));
        let mut session = session(channel.clone(), "5000");
        let mut spec = CollectSpec::new(4);
        spec.validation = Some(r"\d{4}".into());
        spec.variable = "pin".into();
        spec.transfer_on_failure = Some("0 XML operator".into());

        let (outcome, _) = run(&executor(), &mut session, &[Action::CollectDigits(spec)]).await;

        assert_eq!(
            outcome,
            SequenceOutcome::Transfer(TransferTarget {
                extension: "0".into(),
                dialplan: "XML".into(),
                context: Some("operator".into()),
            })
        );
        assert_eq!(session.variable("read_result"), Some("failure"));
        assert_eq!(session.variable("pin_invalid"), Some("9"));
    }

    #[tokio::test(start_paused = true)]
    async fn collect_success_records_terminator() {
        let channel = Arc::new(SimulatedChannel::new().with_digits("4321#"));
        let mut session = session(channel.clone(), "5000");
        let mut spec = CollectSpec::new(8);
        spec.variable = "account".into();
        run(&executor(), &mut session, &[Action::CollectDigits(spec)]).await;

        assert_eq!(session.variable("account"), Some("4321"));
        assert_eq!(session.variable("read_result"), Some("success"));
        assert_eq!(session.variable("read_terminator_used"), Some("#"));
    }

    #[tokio::test]
    async fn hangup_skips_everything_but_logging() {
        let channel = Arc::new(SimulatedChannel::new());
        let mut session = session(channel.clone(), "1234");
        let (outcome, steps) = run(
            &executor(),
            &mut session,
            &[
                Action::Hangup { cause: HangupCause::UserBusy },
                Action::playback("ivr/never.wav"),
            ],
        )
        .await;
        assert_eq!(outcome, SequenceOutcome::HungUp);
        assert_eq!(steps.len(), 1);

        let report = executor()
            .execute(
                &mut session,
                &Action::Log {
                    level: LogLevel::Info,
                    message: "cleanup for {d}".into(),
                },
                &[],
            )
            .await
            .unwrap();
        assert_eq!(report.detail, "cleanup for 1234");
    }

    #[tokio::test]
    async fn remote_hangup_aborts_remaining_actions() {
        let channel = Arc::new(SimulatedChannel::new());
        let mut session = session(channel.clone(), "1234");
        channel.remote_hangup();
        let (outcome, steps) = run(&executor(), &mut session, &[Action::Answer, Action::playback("x.wav")]).await;
        assert_eq!(outcome, SequenceOutcome::SessionGone);
        assert!(steps.is_empty());
        assert!(!channel.answered());
    }

    #[tokio::test(start_paused = true)]
    async fn menu_selection_runs_entry_actions_first() {
        let config = CallFlowConfig::from_toml_str(
            r#"
            [menus.main]
            prompt = "ivr/main.wav"
            entries = [{ key = "2", actions = [{ type = "set_variable", key = "dept", value = "support" }] }]
            "#,
        )
        .unwrap();
        let channel = Arc::new(SimulatedChannel::new().with_digits("2"));
        let mut session = session(channel.clone(), "1234");

        run(
            &executor_with(config, ""),
            &mut session,
            &[
                Action::Menu { name: "main".into() },
                Action::set("after", "${dept}"),
            ],
        )
        .await;

        assert_eq!(session.variable("main_selection"), Some("2"));
        assert_eq!(session.variable("after"), Some("support"));
    }

    #[test]
    fn parses_transfer_targets() {
        assert_eq!(TransferTarget::parse("1000"), Some(TransferTarget::new("1000")));
        let full = TransferTarget::parse("1000 XML public").unwrap();
        assert_eq!(full.context.as_deref(), Some("public"));
        assert!(TransferTarget::parse("   ").is_none());
        assert!(!TransferTarget::parse("1000 enum").unwrap().is_local());
    }
}
