//! Edit-then-confirm round trip through the calendar editor.
//!
//! prompt -> editor link -> "Have you edited?" -> re-fetch -> confirm.

use crate::calendar::{render_schedule, CalendarEvent};
use crate::error::FlowError;
use crate::flow::{FlowContext, Step};
use crate::transport::Button;

use super::block::sync_block_jobs;

/// Which day's schedule is being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Today,
    Tomorrow,
}

/// Offer the editor link; `confirm` is the step the "Yes" button selects.
pub fn prompt(ctx: &mut FlowContext<'_>, confirm: Step) {
    let link = ctx.editor_link();
    ctx.ask(
        "Have you edited?",
        vec![
            Button::step("Yes", confirm),
            Button::link("Click me to go to Google Calendar", link),
        ],
    );
}

/// Re-read the edited day and show it.
///
/// Today's edits also regenerate block alerts.
pub async fn confirm(
    ctx: &mut FlowContext<'_>,
    target: EditTarget,
) -> Result<Vec<CalendarEvent>, FlowError> {
    let events = match target {
        EditTarget::Today => {
            let events = ctx.today_events().await?;
            sync_block_jobs(ctx, &events)?;
            events
        }
        EditTarget::Tomorrow => ctx.tomorrow_events().await?,
    };

    let schedule = render_schedule(&events, ctx.window());
    match target {
        EditTarget::Today => ctx.say(format!("Updated your schedule!\n\n{schedule}")),
        EditTarget::Tomorrow => ctx.say(format!(
            "This is how your day tomorrow will look like then!\n\n{schedule}"
        )),
    }
    Ok(events)
}
