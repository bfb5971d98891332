//! Matchbot, a conversational matchmaking bot engine.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod matching;
pub mod profile;
pub mod store;
pub mod sync;
