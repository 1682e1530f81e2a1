//! The concrete conversation flows.

mod block;
mod commands;
mod creation;
mod edit;
mod morning;
mod night;

pub use block::{sync_block_jobs, BlockFlow, BlockPayload};
pub use commands::SessionFlow;
pub use creation::{EventDraft, EventFlow, TaskDraft, TaskFlow};
pub use edit::EditTarget;
pub use morning::MorningFlow;
pub use night::{parse_pick_time, NightFlow, Review, PICK_TIME_PROMPT};

use std::sync::Arc;

use crate::flow::Flow;

/// Every built-in flow.
pub fn all() -> Vec<Arc<dyn Flow>> {
    vec![
        Arc::new(SessionFlow),
        Arc::new(MorningFlow),
        Arc::new(BlockFlow),
        Arc::new(NightFlow),
        Arc::new(TaskFlow),
        Arc::new(EventFlow),
    ]
}
