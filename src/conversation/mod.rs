//! Conversation engine: sessions, input classification, prompts and the
//! state machine tying them to the stores.

pub mod engine;
pub mod input;
pub mod outbound;
pub mod prompts;
pub mod session;
pub mod state;

pub use engine::ConversationEngine;
pub use input::{ButtonToken, EditChoice, InboundEvent, Input, MenuChoice, Sender};
pub use outbound::{InlineButton, Keyboard, KeyboardButton, OutboundMessage};
pub use session::{Session, SessionManager};
pub use state::{ConversationState, Mode};
