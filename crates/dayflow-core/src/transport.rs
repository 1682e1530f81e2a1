//! Chat transport boundary: inbound events and outbound replies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;
use crate::flow::Step;
use crate::scheduler::TimerFired;
use crate::session::SessionId;

/// What a button does when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    /// Sends its data back as a button press.
    Callback(String),
    /// Opens a link; never reaches the driver.
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    /// Button selecting `step` when pressed.
    pub fn step(label: impl Into<String>, step: Step) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(step.as_str().to_string()),
        }
    }

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// One outbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(text: impl Into<String>, buttons: Vec<Button>) -> Self {
        Self {
            text: text.into(),
            buttons,
        }
    }
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, session: &SessionId, reply: &Reply) -> Result<(), DeliveryError>;
}

/// Slash commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
    Task,
    Event,
    Unknown(String),
}

impl Command {
    /// Parse `/name`, `/name@bot` or `/name args`. `None` for non-commands.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let word = rest.split_whitespace().next().unwrap_or_default();
        let name = word.split('@').next().unwrap_or_default().to_ascii_lowercase();
        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "cancel" => Command::Cancel,
            "task" => Command::Task,
            "event" => Command::Event,
            _ => Command::Unknown(name),
        })
    }

    /// Step the command enters.
    pub fn step(&self) -> Step {
        match self {
            Command::Task => Step::TaskCommand,
            Command::Event => Step::EventCommand,
            _ => Step::SessionCommand,
        }
    }
}

/// Anything that can drive a session forward.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    UserText { session: SessionId, text: String },
    ButtonPress { session: SessionId, data: String },
    TimerFired(TimerFired),
    Command { session: SessionId, command: Command },
}

impl InboundEvent {
    /// Classify a raw chat message as a command or free text.
    pub fn from_message(session: SessionId, text: &str) -> Self {
        match Command::parse(text) {
            Some(command) => InboundEvent::Command { session, command },
            None => InboundEvent::UserText {
                session,
                text: text.to_string(),
            },
        }
    }

    pub fn session(&self) -> &SessionId {
        match self {
            InboundEvent::UserText { session, .. }
            | InboundEvent::ButtonPress { session, .. }
            | InboundEvent::Command { session, .. } => session,
            InboundEvent::TimerFired(fired) => &fired.session,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::UserText { .. } => "text",
            InboundEvent::ButtonPress { .. } => "button",
            InboundEvent::TimerFired(_) => "timer",
            InboundEvent::Command { .. } => "command",
        }
    }
}
