//! Routes inbound events to step handlers.
//!
//! For each event the driver:
//!
//! 1. locks the session (events of one chat never overlap),
//! 2. resolves the step: current step for text, callback data for buttons,
//!    callback step for timers (after claiming the ticket), command step for
//!    slash commands,
//! 3. runs the handler on a copy of the session,
//! 4. commits the copy and delivers replies only if the handler succeeded.
//!
//! A failed handler leaves the session exactly as it was; the user gets the
//! error's message instead of the handler's replies.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::{FlowError, RegistryError};
use crate::flow::{FlowContext, FlowId, Input, Services, Step, Transition};
use crate::registry::FlowRegistry;
use crate::session::{Scratch, Session, SessionId, SessionStore};
use crate::transport::{InboundEvent, Messenger, Reply};

/// Emitted when a handler ends its flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Termination {
    pub session: SessionId,
    pub flow: FlowId,
    /// The step whose handler ended the flow.
    pub step: Step,
    /// Scratch as it was when the flow ended.
    pub scratch: Scratch,
}

pub struct Driver {
    services: Services,
    registry: FlowRegistry,
    sessions: SessionStore,
    messenger: Arc<dyn Messenger>,
}

impl Driver {
    /// Driver over the built-in flows.
    pub fn new(services: Services, messenger: Arc<dyn Messenger>) -> Result<Self, RegistryError> {
        Ok(Self::with_registry(
            services,
            FlowRegistry::standard()?,
            messenger,
        ))
    }

    pub fn with_registry(
        services: Services,
        registry: FlowRegistry,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            services,
            registry,
            sessions: SessionStore::new(),
            messenger,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Process one event to completion.
    pub async fn handle(&self, event: InboundEvent) -> Option<Termination> {
        let slot = self.sessions.slot(event.session());
        let mut session = slot.lock().await;

        let kind = event.kind();
        let (step, input) = self.resolve(&session, event)?;
        let Some((flow, spec)) = self.registry.resolve(step, input.trigger()) else {
            warn!(
                session = %session.id,
                step = %step,
                event = kind,
                "no handler for event, dropped"
            );
            return None;
        };
        let flow = Arc::clone(flow);
        let declared = spec.next;

        info!(session = %session.id, step = %step, event = kind, "dispatching");

        let mut working = session.clone();
        let (result, replies) = {
            let mut ctx = FlowContext::new(&mut working, &self.services, input);
            let result = flow.handle(step, &mut ctx).await;
            (result, ctx.into_replies())
        };

        match result {
            Ok(transition) => {
                if let Transition::Next(to) = transition {
                    if to != step && !declared.contains(&to) {
                        warn!(from = %step, to = %to, "transition not declared in flow table");
                    }
                }
                let termination = commit(&mut session, working, step, flow.id(), transition, &self.services);
                self.deliver(&session.id, &replies).await;
                termination
            }
            Err(err) => {
                report(&session, step, &err);
                self.deliver(&session.id, &[Reply::text(err.user_message())])
                    .await;
                None
            }
        }
    }

    fn resolve(&self, session: &Session, event: InboundEvent) -> Option<(Step, Input)> {
        match event {
            InboundEvent::UserText { text, .. } => {
                if session.is_idle() {
                    info!(session = %session.id, "text outside of any flow, dropped");
                    return None;
                }
                Some((session.current_step, Input::Text(text)))
            }
            InboundEvent::ButtonPress { data, .. } => match data.parse::<Step>() {
                Ok(step) => Some((step, Input::Button)),
                Err(_) => {
                    warn!(session = %session.id, data = %data, "unknown callback data, dropped");
                    None
                }
            },
            InboundEvent::TimerFired(fired) => {
                if !self.services.scheduler.acknowledge(&fired.ticket) {
                    warn!(
                        session = %session.id,
                        kind = %fired.ticket.key.kind,
                        "stale timer dropped"
                    );
                    return None;
                }
                Some((fired.callback_step, Input::Timer(fired.payload)))
            }
            InboundEvent::Command { command, .. } => Some((command.step(), Input::Command(command))),
        }
    }

    async fn deliver(&self, session: &SessionId, replies: &[Reply]) {
        for reply in replies {
            if let Err(err) = self.messenger.send(session, reply).await {
                error!(session = %session, error = %err, "reply delivery failed");
            }
        }
    }
}

fn commit(
    session: &mut Session,
    working: Session,
    step: Step,
    flow: FlowId,
    transition: Transition,
    services: &Services,
) -> Option<Termination> {
    *session = working;
    session.updated_at = services.clock.now();
    match transition {
        Transition::Next(next) => {
            session.current_step = next;
            None
        }
        Transition::Stay => None,
        Transition::End => {
            let scratch = session.reset();
            info!(session = %session.id, flow = %flow, step = %step, "flow finished");
            Some(Termination {
                session: session.id.clone(),
                flow,
                step,
                scratch,
            })
        }
    }
}

fn report(session: &Session, step: Step, err: &FlowError) {
    if err.is_reprompt() {
        info!(session = %session.id, step = %step, "input rejected, reprompting");
    } else {
        error!(session = %session.id, step = %step, error = %err, "handler failed");
    }
}
