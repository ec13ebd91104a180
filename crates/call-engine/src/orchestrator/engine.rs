use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, field, info, info_span, warn, Instrument, Span};

use super::report::{CallReport, MatchedRoute};
use crate::action::{Action, ActionExecutor, SequenceOutcome};
use crate::channel::CallChannel;
use crate::config::CallFlowConfig;
use crate::directory::Directory;
use crate::error::Result;
use crate::external::{HttpTransport, ReqwestTransport};
use crate::ivr::CollectControl;
use crate::queue::QueueService;
use crate::routing::{Dialplan, RouteDecision};
use crate::session::{ActiveCall, CallSession, HangupCause, InboundCall, SessionRegistry};

/// Hook run for every call when it starts hanging up
pub type EngineHook = Arc<dyn Fn(&CallSession) + Send + Sync>;

/// How routing finished for a call that is still up
enum Ending {
    /// Normal end of the dialplan
    Done,
    /// Play the not-available prompt, then hang up with the cause
    Failure(HangupCause),
    /// The session already ended or left the engine
    Ended,
}

/// Routes inbound calls and drives them to completion
///
/// One engine serves all calls; each call runs as its own task with its own
/// [`CallSession`]. The only state shared between calls is the
/// [`SessionRegistry`].
///
/// ```text
/// InboundCall ─▶ Dialplan::route ─▶ ActionExecutor::run_sequence ─┬─▶ hangup hooks ─▶ Destroyed
///                      ▲                                         │
///                      └────────────── transfer ◀────────────────┘
/// ```
pub struct CallFlowEngine {
    config: Arc<CallFlowConfig>,
    dialplan: Dialplan,
    executor: ActionExecutor,
    registry: SessionRegistry,
    hooks: Vec<EngineHook>,
}

impl CallFlowEngine {
    pub fn builder() -> CallFlowEngineBuilder {
        CallFlowEngineBuilder::new()
    }

    pub fn config(&self) -> &CallFlowConfig {
        &self.config
    }

    pub fn dialplan(&self) -> &Dialplan {
        &self.dialplan
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Run one call from the inbound event to Destroyed.
    ///
    /// Whatever happens, hangup hooks run exactly once and the call leaves
    /// the registry before this returns.
    pub async fn handle_call(&self, call: InboundCall, channel: Arc<dyn CallChannel>) -> Result<CallReport> {
        let mut session = CallSession::new(call, &self.config.general.default_context, channel);
        Span::current().record("session_id", field::display(session.id()));

        for hook in &self.hooks {
            let hook = Arc::clone(hook);
            session.register_hangup_hook(Box::new(move |s: &CallSession| hook(s)))?;
        }

        self.registry.insert(ActiveCall {
            session_id: session.id().clone(),
            caller: session.caller().to_string(),
            destination: session.destination().to_string(),
            domain: session.domain().to_string(),
            state: session.state(),
            started_at: session.created_at(),
        });
        info!(session_id = %session.id(), caller = session.caller(), destination = session.destination(), "inbound call");

        let mut report = CallReport::start(&session);
        let ending = match self.route(&mut session, &mut report).await {
            Ok(ending) => ending,
            Err(e) => {
                error!(session_id = %session.id(), error = %e, "call handling failed");
                report.error = Some(e.to_string());
                Ending::Failure(HangupCause::NormalTemporaryFailure)
            }
        };

        self.teardown(&mut session, ending).await;
        report.capture(&session);
        let destroyed = session.destroy();
        self.registry.remove(session.id());
        report.finish(&session);
        destroyed?;

        info!(
            session_id = %session.id(),
            cause = ?report.hangup_cause,
            steps = report.steps.len(),
            duration_ms = report.duration_ms(),
            "call finished"
        );
        Ok(report)
    }

    /// Run the call on its own task, inside a `call` span
    pub fn spawn_call(
        self: &Arc<Self>,
        call: InboundCall,
        channel: Arc<dyn CallChannel>,
    ) -> JoinHandle<Result<CallReport>> {
        let span = info_span!(
            "call",
            session_id = field::Empty,
            caller = %call.caller_id_number,
            destination = %call.destination,
        );
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.handle_call(call, channel).await }.instrument(span))
    }

    /// Route, run, and follow transfers until the call leaves the dialplan.
    async fn route(&self, session: &mut CallSession, report: &mut CallReport) -> Result<Ending> {
        let mut transfers = 0u32;

        loop {
            let context = session.context().to_string();
            let destination = session.dialed().to_string();

            let decision = match self.dialplan.route_call(&context, &destination, Some(session.caller())) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(session_id = %session.id(), error = %e, "routing failed");
                    return Ok(Ending::Failure(HangupCause::NoRouteDestination));
                }
            };

            let (actions, captures) = match decision {
                RouteDecision::Rule(m) => {
                    report.matched.push(MatchedRoute {
                        context: context.clone(),
                        destination: destination.clone(),
                        route: m.rule.name.clone(),
                        index: Some(m.index),
                        captures: m.captures.clone(),
                    });
                    (m.rule.actions.clone(), m.captures)
                }
                RouteDecision::ExternalTrunk { target } => {
                    report.matched.push(MatchedRoute {
                        context: context.clone(),
                        destination: destination.clone(),
                        route: "external-trunk".to_string(),
                        index: None,
                        captures: Vec::new(),
                    });
                    (vec![Action::bridge(target)], Vec::new())
                }
                RouteDecision::Reject => {
                    info!(session_id = %session.id(), %context, %destination, "no route");
                    return Ok(Ending::Failure(HangupCause::UnallocatedNumber));
                }
            };

            let outcome = self
                .executor
                .run_sequence(session, &actions, &captures, &mut report.steps)
                .await?;
            self.registry.update_state(session.id(), session.state());
            report.outcome = Some(outcome.clone());

            match outcome {
                SequenceOutcome::Transfer(target) => {
                    transfers += 1;
                    if transfers > self.config.general.max_transfers {
                        warn!(session_id = %session.id(), transfers, "transfer limit reached");
                        return Ok(Ending::Failure(HangupCause::NoRouteDestination));
                    }
                    info!(
                        session_id = %session.id(),
                        extension = %target.extension,
                        context = target.context.as_deref().unwrap_or(&context),
                        "transfer"
                    );
                    if let Some(next) = &target.context {
                        session.set_context(next.clone());
                    }
                    session.set_dialed(target.extension.clone());
                    report.transfers.push(target);
                }
                SequenceOutcome::Completed { failed: false } => return Ok(Ending::Done),
                SequenceOutcome::Completed { failed: true } | SequenceOutcome::Aborted => {
                    return Ok(Ending::Failure(HangupCause::NormalTemporaryFailure))
                }
                SequenceOutcome::HungUp | SequenceOutcome::HandedOff | SequenceOutcome::SessionGone => {
                    return Ok(Ending::Ended)
                }
            }
        }
    }

    /// Bring the session to HangingUp, with the failure prompt first when routing failed.
    async fn teardown(&self, session: &mut CallSession, ending: Ending) {
        let cause = match ending {
            Ending::Done => HangupCause::NormalClearing,
            Ending::Failure(cause) => {
                if session.is_ready() {
                    let mut ignore = |_: char| CollectControl::Continue;
                    let prompt = &self.config.prompts.not_available;
                    if let Err(e) = session.channel().stream_file(prompt, &mut ignore).await {
                        warn!(session_id = %session.id(), prompt = %prompt, error = %e, "failure prompt not played");
                    }
                }
                cause
            }
            Ending::Ended if session.is_answered() => HangupCause::NormalClearing,
            Ending::Ended => HangupCause::OriginatorCancel,
        };
        session.begin_hangup(cause).await;
    }
}

impl std::fmt::Debug for CallFlowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFlowEngine")
            .field("executor", &self.executor)
            .field("active_calls", &self.registry.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Builder for [`CallFlowEngine`]
pub struct CallFlowEngineBuilder {
    config: CallFlowConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    queue_service: Option<Arc<dyn QueueService>>,
    directory: Option<Arc<dyn Directory>>,
    registry: SessionRegistry,
    hooks: Vec<EngineHook>,
}

impl CallFlowEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: CallFlowConfig::default(),
            transport: None,
            queue_service: None,
            directory: None,
            registry: SessionRegistry::new(),
            hooks: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: CallFlowConfig) -> Self {
        self.config = config;
        self
    }

    /// HTTP transport for lookups and the queue service; `reqwest` when unset
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_queue_service(mut self, service: Arc<dyn QueueService>) -> Self {
        self.queue_service = Some(service);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Share a registry with other engines or an admin surface
    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Run `hook` on every call, before the call's own hooks
    pub fn on_hangup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CallSession) + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<CallFlowEngine> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config.external.user_agent)?),
        };
        let dialplan = Dialplan::from_config(&config)?;

        let mut executor = ActionExecutor::new(Arc::clone(&config), transport)?;
        if let Some(service) = self.queue_service {
            executor = executor.with_queue_service(service);
        }
        if let Some(directory) = self.directory {
            executor = executor.with_directory(directory);
        }

        info!(
            contexts = config.dialplan.contexts.len(),
            menus = config.menus.len(),
            wizards = config.wizards.len(),
            "call flow engine ready"
        );

        Ok(CallFlowEngine {
            config,
            dialplan,
            executor,
            registry: self.registry,
            hooks: self.hooks,
        })
    }
}

impl Default for CallFlowEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
