//! Nightly review and planning for tomorrow.
//!
//! ```text
//! [timer] night_flow_review --Yes---> today's schedule, feeling -> favourite
//!                                     -> proud -> improve -> comment
//!                                     -> tomorrow's schedule
//!                           --Later-> night_flow_pick_time (HHMM) (end)
//!                           --Skip--> tomorrow's schedule
//! tomorrow's schedule --Ok!--> goodnight (end)
//!                     --Edit-> "Have you edited?" --Yes--> updated (end)
//! [timer] night_flow_new_review_time --Yes--> feeling ...
//!                                    --Skip-> tomorrow's schedule
//! ```

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::edit::{self, EditTarget};
use crate::calendar::render_schedule;
use crate::clock::parse_hhmm;
use crate::error::FlowError;
use crate::flow::{Flow, FlowContext, FlowId, Step, StepSpec, Transition, Trigger};
use crate::scheduler::{JobKey, JobKind};
use crate::transport::Button;

const REVIEW: &str = "review";

pub const PICK_TIME_PROMPT: &str =
    "Pick a time to review later (answer in 24h format e.g. 1800 for 6pm)";
const PICK_TIME_INVALID: &str =
    "Invalid Time! Please try again. (answer in 24h format e.g. 1800 for 6pm)";

/// Answers collected during the review, in the order they are asked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub feeling: String,
    pub favourite: String,
    pub proud: String,
    pub improve: String,
    pub comment: Option<String>,
}

static STEPS: &[StepSpec] = &[
    StepSpec::new(
        Step::NightReview,
        &[Trigger::Timer],
        &[Step::NightReviewYes, Step::NightReviewLater, Step::NightReviewSkip],
    )
    .entry(),
    StepSpec::new(Step::NightReviewYes, &[Trigger::Button], &[Step::NightFeeling]),
    StepSpec::new(Step::NightReviewLater, &[Trigger::Button], &[Step::NightPickTime]),
    StepSpec::new(Step::NightReviewSkip, &[Trigger::Button], &[Step::NightTomorrow]),
    StepSpec::new(Step::NightFeeling, &[Trigger::Text], &[Step::NightFavourite]),
    StepSpec::new(Step::NightFavourite, &[Trigger::Text], &[Step::NightProud]),
    StepSpec::new(Step::NightProud, &[Trigger::Text], &[Step::NightImprove]),
    StepSpec::new(
        Step::NightImprove,
        &[Trigger::Text],
        &[Step::NightComment, Step::NightCommentSkip],
    ),
    StepSpec::new(Step::NightComment, &[Trigger::Text], &[Step::NightTomorrow]),
    StepSpec::new(Step::NightCommentSkip, &[Trigger::Button], &[Step::NightTomorrow]),
    StepSpec::new(
        Step::NightTomorrow,
        &[],
        &[Step::NightTomorrowConfirm, Step::NightTomorrowEdit],
    ),
    StepSpec::new(Step::NightTomorrowConfirm, &[Trigger::Button], &[]).terminal(),
    StepSpec::new(
        Step::NightTomorrowEdit,
        &[Trigger::Button],
        &[Step::NightTomorrowUpdated],
    ),
    StepSpec::new(Step::NightTomorrowUpdated, &[Trigger::Button], &[]).terminal(),
    StepSpec::new(Step::NightPickTime, &[Trigger::Text], &[Step::NightNewReviewTime]).terminal(),
    StepSpec::new(
        Step::NightNewReviewTime,
        &[Trigger::Timer],
        &[Step::NightNewReviewYes, Step::NightNewReviewSkip],
    ),
    StepSpec::new(Step::NightNewReviewYes, &[Trigger::Button], &[Step::NightFeeling]),
    StepSpec::new(Step::NightNewReviewSkip, &[Trigger::Button], &[Step::NightTomorrow]),
];

pub struct NightFlow;

#[async_trait]
impl Flow for NightFlow {
    fn id(&self) -> FlowId {
        FlowId::Night
    }

    fn steps(&self) -> &'static [StepSpec] {
        STEPS
    }

    async fn handle(&self, step: Step, ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
        match step {
            Step::NightReview => {
                review_prompt(ctx);
                Ok(Transition::Next(Step::NightReview))
            }
            Step::NightReviewYes | Step::NightNewReviewYes => {
                let next = start_review(ctx).await?;
                cancel_review_later(ctx);
                Ok(next)
            }
            Step::NightReviewLater => {
                ctx.say(PICK_TIME_PROMPT);
                Ok(Transition::Next(Step::NightPickTime))
            }
            Step::NightReviewSkip | Step::NightNewReviewSkip => {
                ctx.say("Alright, let's get straight to planning for tomorrow then!");
                let next = plan_tomorrow(ctx).await?;
                cancel_review_later(ctx);
                Ok(next)
            }
            Step::NightFeeling => {
                record(ctx, |r, answer| r.feeling = answer)?;
                ctx.say("What was your favourite part of the day?");
                Ok(Transition::Next(Step::NightFavourite))
            }
            Step::NightFavourite => {
                record(ctx, |r, answer| r.favourite = answer)?;
                ctx.say("What are you proud of yourself for today?");
                Ok(Transition::Next(Step::NightProud))
            }
            Step::NightProud => {
                record(ctx, |r, answer| r.proud = answer)?;
                ctx.say("What was one thing you can improve on?");
                Ok(Transition::Next(Step::NightImprove))
            }
            Step::NightImprove => {
                record(ctx, |r, answer| r.improve = answer)?;
                ctx.ask(
                    "Anything else you want to record for today?",
                    vec![Button::step("Skip", Step::NightCommentSkip)],
                );
                Ok(Transition::Next(Step::NightComment))
            }
            Step::NightComment => {
                record(ctx, |r, answer| r.comment = Some(answer))?;
                finish_review(ctx).await
            }
            Step::NightCommentSkip => finish_review(ctx).await,
            Step::NightTomorrowConfirm => {
                ctx.say("You did a great job today!");
                ctx.say("Time to rest!");
                ctx.say("Good night!");
                Ok(Transition::End)
            }
            Step::NightTomorrowEdit => {
                edit::prompt(ctx, Step::NightTomorrowUpdated);
                Ok(Transition::Next(Step::NightTomorrowEdit))
            }
            Step::NightTomorrowUpdated => {
                edit::confirm(ctx, EditTarget::Tomorrow).await?;
                ctx.say("Goodnight!");
                Ok(Transition::End)
            }
            Step::NightPickTime => pick_time(ctx),
            Step::NightNewReviewTime => {
                ctx.ask(
                    "It is time to review your day!",
                    vec![
                        Button::step("Yes", Step::NightNewReviewYes),
                        Button::step("Skip", Step::NightNewReviewSkip),
                    ],
                );
                Ok(Transition::Next(Step::NightNewReviewTime))
            }
            other => Err(FlowError::missing(format!("night handler for {other}"))),
        }
    }
}

/// The end-of-day question that opens the review.
pub(crate) fn review_prompt(ctx: &mut FlowContext<'_>) {
    ctx.ask(
        "That's the end of your work day! Would you like to review now?",
        vec![
            Button::step("Yes", Step::NightReviewYes),
            Button::step("Later", Step::NightReviewLater),
            Button::step("Skip", Step::NightReviewSkip),
        ],
    );
}

/// Parse a `HHMM` answer to the pick-a-time question.
pub fn parse_pick_time(text: &str) -> Result<NaiveTime, FlowError> {
    parse_hhmm(text).ok_or_else(|| FlowError::invalid_input(PICK_TIME_INVALID))
}

async fn start_review(ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
    let events = ctx.today_events().await?;
    let schedule = render_schedule(&events, ctx.window());
    ctx.put(REVIEW, &Review::default())?;
    ctx.say(format!("Today you:\n{schedule}"));
    ctx.say("How are you feeling?");
    Ok(Transition::Next(Step::NightFeeling))
}

fn record(
    ctx: &mut FlowContext<'_>,
    apply: impl FnOnce(&mut Review, String),
) -> Result<(), FlowError> {
    let answer = ctx.text()?.to_string();
    let mut review: Review = ctx.session.scratch.get(REVIEW)?.unwrap_or_default();
    apply(&mut review, answer);
    ctx.put(REVIEW, &review)
}

async fn finish_review(ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
    // TODO: persist the review once the backend exposes an endpoint for it.
    ctx.say("Recorded!");
    ctx.say("Good job on taking the time to reflect about your day!");
    plan_tomorrow(ctx).await
}

async fn plan_tomorrow(ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
    let events = ctx.tomorrow_events().await?;
    let schedule = render_schedule(&events, ctx.window());
    ctx.say("Now, let's plan your day for tomorrow...");
    ctx.say("Here's your schedule for tomorrow");
    ctx.ask(
        schedule,
        vec![
            Button::step("Ok!", Step::NightTomorrowConfirm),
            Button::step("Edit", Step::NightTomorrowEdit),
        ],
    );
    Ok(Transition::Next(Step::NightTomorrow))
}

fn pick_time(ctx: &mut FlowContext<'_>) -> Result<Transition, FlowError> {
    let time = parse_pick_time(ctx.text()?)?;
    let fire_at = ctx.window().next_occurrence(ctx.now(), time);
    ctx.services.scheduler.schedule_once(
        JobKey::singleton(ctx.session_id().clone(), JobKind::ReviewLater),
        fire_at,
        Step::NightNewReviewTime,
        serde_json::Value::Null,
    )?;
    let text = format!(
        "Got it! I'll remind you at {}.",
        ctx.window().local_hhmm(fire_at)
    );
    ctx.say(text);
    Ok(Transition::End)
}

fn cancel_review_later(ctx: &FlowContext<'_>) {
    ctx.services.scheduler.cancel(&JobKey::singleton(
        ctx.session_id().clone(),
        JobKind::ReviewLater,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_time_accepts_hhmm() {
        assert_eq!(
            parse_pick_time("1800").unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap()
        );
    }

    #[test]
    fn pick_time_rejects_with_reprompt() {
        for bad in ["2500", "abcd", "6pm"] {
            let err = parse_pick_time(bad).unwrap_err();
            assert!(err.is_reprompt());
            assert_eq!(err.user_message(), PICK_TIME_INVALID);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn non_four_digit_answers_reprompt(text in "\\PC*") {
                prop_assume!(!(text.trim().len() == 4 && text.trim().bytes().all(|b| b.is_ascii_digit())));
                let err = parse_pick_time(&text).unwrap_err();
                prop_assert!(err.is_reprompt());
            }

            #[test]
            fn padded_answers_are_trimmed(h in 0u32..24, m in 0u32..60) {
                let text = format!("  {h:02}{m:02}\n");
                prop_assert_eq!(parse_pick_time(&text).ok(), NaiveTime::from_hms_opt(h, m, 0));
            }
        }
    }
}
