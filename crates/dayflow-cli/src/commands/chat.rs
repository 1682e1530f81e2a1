use std::sync::Arc;

use clap::Args;
use dayflow_core::{Config, InboundEvent, Runtime, SessionId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::terminal::{LineInput, TerminalMessenger};

#[derive(Args)]
pub struct ChatArgs {
    /// Chat id used for calendar and task lookups
    #[arg(long, default_value = "local")]
    session: String,
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?.with_env_overrides();
    let messenger = Arc::new(TerminalMessenger::default());
    let runtime = Runtime::from_config(&config, messenger.clone())?;
    let session = SessionId::new(args.session);

    println!("Connected as {session}. Send /start to begin, /help for commands, Ctrl-D to quit.");
    println!("Press a button by sending its number, e.g. #1.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let event = match messenger.interpret(&line) {
            LineInput::Empty => continue,
            LineInput::Message(text) => InboundEvent::from_message(session.clone(), &text),
            LineInput::Press(data) => InboundEvent::ButtonPress {
                session: session.clone(),
                data,
            },
            LineInput::Link(url) => {
                println!("open: {url}");
                continue;
            }
            LineInput::NoSuchButton(n) => {
                println!("no button #{n}");
                continue;
            }
        };
        if let Some(done) = runtime.dispatch(event).await {
            debug!(flow = %done.flow, step = %done.step, "flow finished");
        }
    }
    Ok(())
}
