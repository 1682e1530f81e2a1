//! Chat transport over stdin/stdout.

use std::sync::Mutex;

use async_trait::async_trait;
use dayflow_core::{Button, ButtonAction, DeliveryError, Messenger, Reply, SessionId};

/// What a line typed by the user means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineInput {
    Empty,
    /// Free text or a slash command.
    Message(String),
    /// Callback data of a numbered button.
    Press(String),
    Link(String),
    NoSuchButton(usize),
}

/// Prints replies and remembers the most recent buttons so `#N` can press them.
#[derive(Default)]
pub struct TerminalMessenger {
    buttons: Mutex<Vec<Button>>,
}

impl TerminalMessenger {
    pub fn interpret(&self, line: &str) -> LineInput {
        let line = line.trim();
        if line.is_empty() {
            return LineInput::Empty;
        }
        let Some(n) = line.strip_prefix('#').and_then(|n| n.parse::<usize>().ok()) else {
            return LineInput::Message(line.to_string());
        };
        let buttons = self.buttons.lock().unwrap_or_else(|e| e.into_inner());
        match n.checked_sub(1).and_then(|i| buttons.get(i)) {
            Some(Button {
                action: ButtonAction::Callback(data),
                ..
            }) => LineInput::Press(data.clone()),
            Some(Button {
                action: ButtonAction::Url(url),
                ..
            }) => LineInput::Link(url.clone()),
            None => LineInput::NoSuchButton(n),
        }
    }

    fn render(reply: &Reply) -> String {
        let mut out = reply.text.clone();
        for (i, button) in reply.buttons.iter().enumerate() {
            out.push_str(&format!("\n  [{}] {}", i + 1, button.label));
        }
        out
    }
}

#[async_trait]
impl Messenger for TerminalMessenger {
    async fn send(&self, _session: &SessionId, reply: &Reply) -> Result<(), DeliveryError> {
        println!("{}\n", Self::render(reply));
        if !reply.buttons.is_empty() {
            *self.buttons.lock().unwrap_or_else(|e| e.into_inner()) = reply.buttons.clone();
        }
        Ok(())
    }
}
