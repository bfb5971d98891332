//! Inbound events and their classification into typed input.
//!
//! Transports hand the engine an [`InboundEvent`]. The engine resolves it
//! once into an [`Input`], so menu labels, slash commands and button tokens
//! are never string-matched inside the state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::profile::{Location, PhotoRef, UserId};
use crate::store::SwipeAction;

/// One event from a chat transport, as delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A slash command, without the slash (`"start"`, `"cancel"`).
    Command { name: String },
    Text { text: String },
    Location { latitude: f64, longitude: f64 },
    /// An uploaded photo, by transport reference.
    Photo { reference: String },
    /// An inline button press carrying its opaque token.
    ButtonPress { token: String },
}

impl InboundEvent {
    pub fn command(name: impl Into<String>) -> Self {
        Self::Command { name: name.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn location(latitude: f64, longitude: f64) -> Self {
        Self::Location {
            latitude,
            longitude,
        }
    }

    pub fn photo(reference: impl Into<String>) -> Self {
        Self::Photo {
            reference: reference.into(),
        }
    }

    pub fn button(token: impl Into<String>) -> Self {
        Self::ButtonPress {
            token: token.into(),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Text { .. } => "text",
            Self::Location { .. } => "location",
            Self::Photo { .. } => "photo",
            Self::ButtonPress { .. } => "button",
        }
    }
}

/// The user who sent an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    /// Display name, when the transport knows one.
    pub display_name: Option<String>,
}

impl Sender {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Main-menu choices. Chosen with the reply keyboard or a `menu_*` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    FindMatch,
    ViewProfile,
    EditProfile,
}

impl MenuChoice {
    pub const ALL: [MenuChoice; 3] = [
        MenuChoice::FindMatch,
        MenuChoice::ViewProfile,
        MenuChoice::EditProfile,
    ];

    /// Reply-keyboard label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FindMatch => "Cari Pasangan 💘",
            Self::ViewProfile => "Profil Saya 👤",
            Self::EditProfile => "Edit Profil 📝",
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Self::FindMatch => "find",
            Self::ViewProfile => "profile",
            Self::EditProfile => "edit",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::ALL.into_iter().find(|c| c.label() == text)
    }
}

/// Edit-menu choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditChoice {
    Description,
    Hobby,
    Cancel,
}

impl EditChoice {
    fn action(&self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Hobby => "hobby",
            Self::Cancel => "cancel",
        }
    }
}

/// Decoded inline-button token.
///
/// Wire form is `<namespace>_<action>` or `<namespace>_<action>_<id>`:
/// `match_like_<id>`, `match_dislike_<id>`, `edit_description`,
/// `edit_hobby`, `edit_cancel`, `menu_find`, `menu_profile`, `menu_edit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonToken {
    Swipe { action: SwipeAction, target: UserId },
    Edit(EditChoice),
    Menu(MenuChoice),
}

impl FromStr for ButtonToken {
    type Err = TokenError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let malformed = || TokenError::Malformed(token.to_string());
        let mut parts = token.splitn(3, '_');
        let namespace = parts.next().ok_or_else(malformed)?;
        let action = parts.next().ok_or_else(malformed)?;
        let id = parts.next();

        match (namespace, id) {
            ("match", Some(id)) => {
                let action = action.parse::<SwipeAction>().map_err(|_| malformed())?;
                // Reject signs, whitespace and anything i64 can't hold.
                if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed());
                }
                let target = id.parse::<i64>().map_err(|_| malformed())?;
                Ok(Self::Swipe {
                    action,
                    target: UserId(target),
                })
            }
            ("edit", None) => match action {
                "description" => Ok(Self::Edit(EditChoice::Description)),
                "hobby" => Ok(Self::Edit(EditChoice::Hobby)),
                "cancel" => Ok(Self::Edit(EditChoice::Cancel)),
                _ => Err(malformed()),
            },
            ("menu", None) => MenuChoice::ALL
                .into_iter()
                .find(|c| c.action() == action)
                .map(Self::Menu)
                .ok_or_else(malformed),
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for ButtonToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Swipe { action, target } => write!(f, "match_{action}_{target}"),
            Self::Edit(choice) => write!(f, "edit_{}", choice.action()),
            Self::Menu(choice) => write!(f, "menu_{}", choice.action()),
        }
    }
}

/// An inbound event resolved against the bot's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Start,
    Cancel,
    UnknownCommand(String),
    Menu(MenuChoice),
    Text(String),
    Location(Location),
    Photo(PhotoRef),
    Swipe { action: SwipeAction, target: UserId },
    Edit(EditChoice),
    /// A button token or payload that could not be decoded.
    Malformed(TokenError),
}

impl Input {
    pub fn classify(event: &InboundEvent) -> Self {
        match event {
            InboundEvent::Command { name } => {
                // Telegram appends "@botname" in group chats.
                let name = name.split('@').next().unwrap_or_default();
                match name.trim().to_ascii_lowercase().as_str() {
                    "start" => Self::Start,
                    "cancel" => Self::Cancel,
                    other => Self::UnknownCommand(other.to_string()),
                }
            }
            InboundEvent::Text { text } => match MenuChoice::from_label(text) {
                Some(choice) => Self::Menu(choice),
                None => Self::Text(text.clone()),
            },
            InboundEvent::Location {
                latitude,
                longitude,
            } => match Location::new(*latitude, *longitude) {
                Some(location) => Self::Location(location),
                None => Self::Malformed(TokenError::Malformed(format!(
                    "location {latitude},{longitude}"
                ))),
            },
            InboundEvent::Photo { reference } => match PhotoRef::new(reference.clone()) {
                Some(photo) => Self::Photo(photo),
                None => Self::Malformed(TokenError::Malformed("empty photo reference".into())),
            },
            InboundEvent::ButtonPress { token } => match token.parse::<ButtonToken>() {
                Ok(ButtonToken::Swipe { action, target }) => Self::Swipe { action, target },
                Ok(ButtonToken::Edit(choice)) => Self::Edit(choice),
                Ok(ButtonToken::Menu(choice)) => Self::Menu(choice),
                Err(e) => Self::Malformed(e),
            },
        }
    }

    /// Free text carried by the input. A menu label counts as text, so
    /// states that expect free text still accept it verbatim.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Menu(choice) => Some(choice.label()),
            _ => None,
        }
    }
}
