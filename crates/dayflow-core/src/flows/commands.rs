//! Slash commands that act on the session itself.

use async_trait::async_trait;
use indoc::indoc;

use crate::error::FlowError;
use crate::flow::{Flow, FlowContext, FlowId, Input, Step, StepSpec, Transition, Trigger};
use crate::scheduler::{JobKey, JobKind};
use crate::transport::Command;

const HELP: &str = indoc! {"
    Here's what I can do:
    /start - set up your daily morning and night check-ins
    /task - add a task with a deadline and duration
    /event - add an event to your calendar
    /cancel - stop whatever we're doing right now
    /help - show this message
"};

static STEPS: &[StepSpec] =
    &[StepSpec::new(Step::SessionCommand, &[Trigger::Command], &[]).entry().terminal()];

pub struct SessionFlow;

#[async_trait]
impl Flow for SessionFlow {
    fn id(&self) -> FlowId {
        FlowId::Session
    }

    fn steps(&self) -> &'static [StepSpec] {
        STEPS
    }

    async fn handle(&self, _step: Step, ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
        let Input::Command(command) = ctx.input.clone() else {
            return Err(FlowError::missing("command"));
        };

        match command {
            Command::Start => {
                start(ctx);
                Ok(Transition::End)
            }
            Command::Help => {
                ctx.say(HELP.trim_end());
                Ok(Transition::Stay)
            }
            Command::Cancel => {
                ctx.services.scheduler.cancel(&JobKey::singleton(
                    ctx.session_id().clone(),
                    JobKind::ReviewLater,
                ));
                ctx.say("Cancelled. Send /task or /event whenever you're ready.");
                Ok(Transition::End)
            }
            Command::Unknown(name) => {
                ctx.say(format!(
                    "Sorry, I don't know the command /{name}. Try /help."
                ));
                Ok(Transition::Stay)
            }
            Command::Task | Command::Event => {
                Err(FlowError::missing("creation command routed to session flow"))
            }
        }
    }
}

/// Arm the daily morning and night jobs. Running it again only replaces them.
fn start(ctx: &mut FlowContext<'_>) {
    let window = *ctx.window();
    let scheduler = &ctx.services.scheduler;
    let session = ctx.session_id().clone();

    scheduler.schedule_daily(
        JobKey::singleton(session.clone(), JobKind::MorningPlan),
        window.start,
        Step::MorningPlan,
    );
    scheduler.schedule_daily(
        JobKey::singleton(session, JobKind::NightReview),
        window.end,
        Step::NightReview,
    );

    ctx.say(format!(
        "Hi! I'll walk you through your day: a look at your schedule every morning at {}, \
         reminders around your blocks, and a review every night at {}.",
        window.start.format("%H:%M"),
        window.end.format("%H:%M")
    ));
    ctx.say("Use /task or /event to add things to your day, or /help to see everything I can do.");
}
