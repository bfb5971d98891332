//! Messages the engine asks a transport to deliver.

use serde::{Deserialize, Serialize};

use crate::profile::{PhotoRef, UserId};

/// One message to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient: UserId,
    /// Message text, or the caption when `photo` is set.
    pub text: String,
    pub keyboard: Option<Keyboard>,
    pub photo: Option<PhotoRef>,
    /// Inline button rows.
    pub inline_buttons: Vec<Vec<InlineButton>>,
}

impl OutboundMessage {
    pub fn text(recipient: UserId, text: impl Into<String>) -> Self {
        Self {
            recipient,
            text: text.into(),
            keyboard: None,
            photo: None,
            inline_buttons: Vec::new(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn with_photo(mut self, photo: PhotoRef) -> Self {
        self.photo = Some(photo);
        self
    }

    pub fn with_inline_buttons(mut self, rows: Vec<Vec<InlineButton>>) -> Self {
        self.inline_buttons = rows;
        self
    }

    /// Tokens of every inline button, row-major.
    pub fn tokens(&self) -> Vec<&str> {
        self.inline_buttons
            .iter()
            .flatten()
            .map(|b| b.token.as_str())
            .collect()
    }
}

/// Reply keyboard shown in place of the text input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Keyboard {
    Choices {
        rows: Vec<Vec<KeyboardButton>>,
        /// Hide the keyboard after one press.
        one_time: bool,
    },
    /// Remove any keyboard currently shown.
    Remove,
}

impl Keyboard {
    /// Labels of every button, row-major.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            Self::Choices { rows, .. } => rows
                .iter()
                .flatten()
                .map(|b| b.label.as_str())
                .collect(),
            Self::Remove => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardButton {
    pub label: String,
    /// Pressing the button shares the user's location.
    pub request_location: bool,
}

impl KeyboardButton {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            request_location: false,
        }
    }

    pub fn location(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            request_location: true,
        }
    }
}

/// Button attached to a message; pressing it sends `token` back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub token: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, token: impl ToString) -> Self {
        Self {
            label: label.into(),
            token: token.to_string(),
        }
    }
}
