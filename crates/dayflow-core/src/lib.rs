//! # Dayflow Core Library
//!
//! Conversation state machine and reminder scheduler behind the Dayflow chat
//! assistant. A chat transport feeds inbound events into the [`Driver`], which
//! resolves the session's current step, runs the matching flow handler and
//! commits the next step. The [`Scheduler`] re-enters the driver at wall-clock
//! times (block start/end alerts, morning planning, nightly review).
//!
//! ## Architecture
//!
//! - **Clock**: one process-wide timezone and working-day window
//! - **Scheduler**: keyed one-shot and daily jobs with replace semantics
//! - **Flows**: morning, block, night, task/event creation, shared edit round trip
//! - **Driver**: per-session sequential dispatch with atomic step commits
//! - **Gateways**: calendar provider and user directory contracts plus HTTP adapters
//!
//! ## Key Components
//!
//! - [`Driver`]: inbound event dispatch
//! - [`Scheduler`]: timer source
//! - [`FlowRegistry`]: step table validated at startup
//! - [`Config`]: TOML configuration

pub mod calendar;
pub mod clock;
pub mod directory;
pub mod driver;
pub mod error;
pub mod flow;
pub mod flows;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod transport;

pub use calendar::{
    render_schedule, CalendarEvent, CalendarGateway, EventQuery, GoogleCalendar, NewEvent, NO_EVENTS,
};
pub use clock::{Clock, DayWindow, ManualClock, SystemClock, TimeRange};
pub use directory::{HttpUserDirectory, TaskRecord, UserDirectory, UserRecord};
pub use driver::{Driver, Termination};
pub use error::{
    ConfigError, CoreError, DeliveryError, FlowError, GatewayError, RegistryError, SchedulerError,
    FALLBACK_MESSAGE,
};
pub use flow::{Flow, FlowContext, FlowId, Input, Services, Step, StepSpec, Transition, Trigger};
pub use registry::FlowRegistry;
pub use runtime::{Collaborators, Runtime};
pub use scheduler::{
    FireAt, JobHandle, JobKey, JobKind, JobName, JobTicket, ScheduledJob, Scheduler, TimerFired,
};
pub use session::{Scratch, Session, SessionId, SessionStore};
pub use storage::Config;
pub use transport::{Button, ButtonAction, Command, InboundEvent, Messenger, Reply};
