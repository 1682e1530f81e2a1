//! Morning look at today's schedule.

use async_trait::async_trait;

use super::block::sync_block_jobs;
use super::edit::{self, EditTarget};
use crate::calendar::render_schedule;
use crate::error::FlowError;
use crate::flow::{Flow, FlowContext, FlowId, Step, StepSpec, Transition, Trigger};
use crate::transport::Button;

static STEPS: &[StepSpec] = &[
    StepSpec::new(
        Step::MorningPlan,
        &[Trigger::Timer],
        &[Step::MorningAcknowledge, Step::MorningEdit],
    )
    .entry(),
    StepSpec::new(Step::MorningAcknowledge, &[Trigger::Button], &[]).terminal(),
    StepSpec::new(Step::MorningEdit, &[Trigger::Button], &[Step::MorningEditDone]),
    StepSpec::new(Step::MorningEditDone, &[Trigger::Button], &[]).terminal(),
];

pub struct MorningFlow;

#[async_trait]
impl Flow for MorningFlow {
    fn id(&self) -> FlowId {
        FlowId::Morning
    }

    fn steps(&self) -> &'static [StepSpec] {
        STEPS
    }

    async fn handle(&self, step: Step, ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
        match step {
            Step::MorningPlan => {
                let events = ctx.today_events().await?;
                let schedule = render_schedule(&events, ctx.window());
                ctx.ask(
                    format!("Good morning! Here's your schedule for today:\n\n{schedule}"),
                    vec![
                        Button::step("Ok!", Step::MorningAcknowledge),
                        Button::step("Edit", Step::MorningEdit),
                    ],
                );
                Ok(Transition::Next(Step::MorningPlan))
            }
            Step::MorningAcknowledge => {
                let events = ctx.today_events().await?;
                let alerts = sync_block_jobs(ctx, &events)?;
                if alerts > 0 {
                    ctx.say("Have a productive day! I'll give you a heads-up before each block.");
                } else {
                    ctx.say("Have a productive day!");
                }
                Ok(Transition::End)
            }
            Step::MorningEdit => {
                edit::prompt(ctx, Step::MorningEditDone);
                Ok(Transition::Next(Step::MorningEdit))
            }
            Step::MorningEditDone => {
                edit::confirm(ctx, EditTarget::Today).await?;
                Ok(Transition::End)
            }
            other => Err(FlowError::missing(format!("morning handler for {other}"))),
        }
    }
}
