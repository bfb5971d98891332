//! CLI channel — stdin/stdout REPL for local testing.
//!
//! Every line is sent as the currently simulated user:
//!
//! ```text
//! /start              command
//! !loc -6.2 106.8     shared location
//! !photo abc123       uploaded photo reference
//! !btn match_like_2   inline button press
//! !as 2               switch simulated user
//! anything else       plain text
//! ```

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream};
use crate::conversation::{InboundEvent, Keyboard, OutboundMessage};
use crate::error::ChannelError;
use crate::profile::UserId;

/// One parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum CliLine {
    Event(InboundEvent),
    SwitchUser(UserId),
    Invalid(String),
}

/// Parse a non-empty, trimmed REPL line.
pub fn parse_line(line: &str) -> CliLine {
    if let Some(command) = line.strip_prefix('/') {
        let name = command.split_whitespace().next().unwrap_or_default();
        return CliLine::Event(InboundEvent::command(name));
    }

    let Some(directive) = line.strip_prefix('!') else {
        return CliLine::Event(InboundEvent::text(line));
    };
    let mut parts = directive.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("loc"), Some(lat), Some(lon)) => match (lat.parse(), lon.parse()) {
            (Ok(lat), Ok(lon)) => CliLine::Event(InboundEvent::location(lat, lon)),
            _ => CliLine::Invalid("usage: !loc <lat> <lon>".into()),
        },
        (Some("photo"), Some(reference), None) => {
            CliLine::Event(InboundEvent::photo(reference))
        }
        (Some("btn"), Some(token), None) => CliLine::Event(InboundEvent::button(token)),
        (Some("as"), Some(id), None) => match id.parse::<UserId>() {
            Ok(user_id) => CliLine::SwitchUser(user_id),
            Err(_) => CliLine::Invalid("usage: !as <user_id>".into()),
        },
        _ => CliLine::Invalid(format!("unknown directive: !{directive}")),
    }
}

/// Render an outbound message for the terminal.
pub fn render(message: &OutboundMessage) -> String {
    let mut out = format!("[→ {}]", message.recipient);
    if let Some(photo) = &message.photo {
        out.push_str(&format!(" [foto: {photo}]"));
    }
    out.push('\n');
    out.push_str(&message.text);

    for row in &message.inline_buttons {
        let buttons: Vec<String> = row
            .iter()
            .map(|b| format!("[{}] !btn {}", b.label, b.token))
            .collect();
        out.push_str(&format!("\n  {}", buttons.join("   ")));
    }
    match &message.keyboard {
        Some(Keyboard::Choices { rows, .. }) => {
            for row in rows {
                let labels: Vec<String> = row
                    .iter()
                    .map(|b| {
                        if b.request_location {
                            format!("({}: !loc <lat> <lon>)", b.label)
                        } else {
                            format!("({})", b.label)
                        }
                    })
                    .collect();
                out.push_str(&format!("\n  {}", labels.join(" ")));
            }
        }
        Some(Keyboard::Remove) | None => {}
    }
    out
}

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    initial_user: UserId,
}

impl CliChannel {
    pub fn new(initial_user: UserId) -> Self {
        Self { initial_user }
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut current = self.initial_user;

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("[{current}]> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            eprint!("[{current}]> ");
                            continue;
                        }
                        match parse_line(line) {
                            CliLine::Event(event) => {
                                let msg = IncomingMessage::new("cli", current, event)
                                    .with_user_name(format!("user{current}"));
                                if tx.send(msg).is_err() {
                                    break;
                                }
                            }
                            CliLine::SwitchUser(user_id) => {
                                current = user_id;
                                eprint!("[{current}]> ");
                            }
                            CliLine::Invalid(reason) => {
                                eprintln!("{reason}");
                                eprint!("[{current}]> ");
                            }
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        println!("\n{}\n", render(message));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
