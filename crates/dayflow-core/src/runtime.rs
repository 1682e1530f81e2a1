//! Wires the scheduler, driver and adapters together.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::calendar::{CalendarGateway, GoogleCalendar};
use crate::clock::{Clock, DayWindow, SystemClock};
use crate::directory::{HttpUserDirectory, UserDirectory};
use crate::driver::{Driver, Termination};
use crate::error::{CoreError, RegistryError};
use crate::flow::Services;
use crate::scheduler::{Scheduler, TimerFired};
use crate::storage::Config;
use crate::transport::{InboundEvent, Messenger};

/// External collaborators the runtime is built from.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub calendar: Arc<dyn CalendarGateway>,
    pub directory: Arc<dyn UserDirectory>,
    pub messenger: Arc<dyn Messenger>,
}

/// Running assistant: a driver plus the task feeding it fired timers.
pub struct Runtime {
    driver: Arc<Driver>,
    pump: JoinHandle<()>,
}

impl Runtime {
    /// Build production adapters from `config`. Must be called inside a tokio runtime.
    pub fn from_config(config: &Config, messenger: Arc<dyn Messenger>) -> Result<Self, CoreError> {
        let window = config.day_window()?;
        let parts = Collaborators {
            clock: Arc::new(SystemClock),
            calendar: Arc::new(
                GoogleCalendar::new(&config.calendar).with_timezone(window.tz),
            ),
            directory: Arc::new(HttpUserDirectory::new(&config.directory)),
            messenger,
        };
        let lead = Duration::minutes(i64::from(config.day.block_alert_lead_minutes));
        let runtime = Self::start(window, lead, config.calendar.event_limit as usize, parts)?;
        info!(
            timezone = %window.tz,
            day_start = %window.start,
            day_end = %window.end,
            "runtime started"
        );
        Ok(runtime)
    }

    pub fn start(
        window: DayWindow,
        block_alert_lead: Duration,
        event_limit: usize,
        parts: Collaborators,
    ) -> Result<Self, RegistryError> {
        let (scheduler, fired) = Scheduler::new(Arc::clone(&parts.clock), window);
        let services = Services {
            clock: parts.clock,
            window,
            block_alert_lead,
            event_limit,
            calendar: parts.calendar,
            directory: parts.directory,
            scheduler,
        };
        let driver = Arc::new(Driver::new(services, parts.messenger)?);
        let pump = tokio::spawn(pump_timers(Arc::clone(&driver), fired));
        Ok(Self { driver, pump })
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.driver.services().scheduler
    }

    /// Handle one inbound event from the chat transport.
    pub async fn dispatch(&self, event: InboundEvent) -> Option<Termination> {
        self.driver.handle(event).await
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Each fired job runs on its own task; the per-session lock orders it
/// against user input for the same chat.
async fn pump_timers(driver: Arc<Driver>, mut fired: mpsc::UnboundedReceiver<TimerFired>) {
    while let Some(event) = fired.recv().await {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move {
            driver.handle(InboundEvent::TimerFired(event)).await;
        });
    }
}
