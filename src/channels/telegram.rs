//! Telegram channel — long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API implementation: messages (commands, text,
//! locations, photos) and callback queries come in through `getUpdates`,
//! replies go out through `sendMessage` / `sendPhoto` with `reply_markup`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{Channel, IncomingMessage, MessageStream};
use crate::conversation::{InboundEvent, Keyboard, OutboundMessage};
use crate::error::ChannelError;
use crate::profile::UserId;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Maximum caption length for sendPhoto.
const TELEGRAM_MAX_CAPTION_LENGTH: usize = 1024;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API channel over long polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Check if a username is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        check_user_allowed(&self.allowed_users, [username])
    }

    async fn call(&self, method: &str, body: &Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} returned {status}: {err}"),
            });
        }
        Ok(())
    }

    /// Send a text message, splitting anything over Telegram's 4096 char
    /// limit. The keyboard rides on the last chunk.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last {
                if let Some(markup) = markup {
                    body["reply_markup"] = markup.clone();
                }
            }
            self.call("sendMessage", &body).await?;
        }
        Ok(())
    }

    /// Send a photo by `file_id`. Captions over the limit go out as a
    /// follow-up text message instead.
    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: &str,
        markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let fits = caption.chars().count() <= TELEGRAM_MAX_CAPTION_LENGTH;
        let mut body = json!({
            "chat_id": chat_id,
            "photo": file_id,
        });
        if fits {
            body["caption"] = Value::String(caption.to_string());
            if let Some(markup) = markup {
                body["reply_markup"] = markup.clone();
            }
        }
        self.call("sendPhoto", &body).await?;

        if !fits {
            self.send_text(chat_id, caption, markup).await?;
        }
        tracing::debug!(chat_id, "Telegram photo sent");
        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update) else {
                        continue;
                    };

                    let username = incoming
                        .metadata
                        .get("username")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    let user_id = incoming.user_id.to_string();
                    if !check_user_allowed(&allowed_users, [username.as_str(), user_id.as_str()]) {
                        tracing::warn!(
                            "Telegram: ignoring update from unauthorized user: \
                             username={username}, user_id={user_id}"
                        );
                        continue;
                    }

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        // Private chats share the user's id.
        let chat_id = message.recipient.0;
        let markup = reply_markup(message);

        match &message.photo {
            Some(photo) => {
                self.send_photo(chat_id, photo.as_str(), &message.text, markup.as_ref())
                    .await
            }
            None => self.send_text(chat_id, &message.text, markup.as_ref()).await,
        }
    }

    async fn acknowledge(&self, message: &IncomingMessage) -> Result<(), ChannelError> {
        let Some(query_id) = message
            .metadata
            .get("callback_query_id")
            .and_then(Value::as_str)
        else {
            return Ok(());
        };
        self.call(
            "answerCallbackQuery",
            &json!({ "callback_query_id": query_id }),
        )
        .await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!("{API_BASE}/bot{}/{method}", token.expose_secret())
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Convert one `getUpdates` entry into an inbound message.
///
/// Returns `None` for update kinds the bot doesn't handle (stickers,
/// edited messages, channel posts, ...).
fn parse_update(update: &Value) -> Option<IncomingMessage> {
    if let Some(query) = update.get("callback_query") {
        let from = query.get("from")?;
        let user_id = from.get("id").and_then(Value::as_i64)?;
        let data = query.get("data").and_then(Value::as_str)?;
        let query_id = query.get("id").and_then(Value::as_str).unwrap_or_default();

        let mut incoming = IncomingMessage::new(
            "telegram",
            UserId(user_id),
            InboundEvent::button(data),
        )
        .with_metadata(json!({
            "callback_query_id": query_id,
            "username": from.get("username").and_then(Value::as_str),
        }));
        if let Some(name) = from.get("first_name").and_then(Value::as_str) {
            incoming = incoming.with_user_name(name);
        }
        return Some(incoming);
    }

    let message = update.get("message")?;
    let from = message.get("from")?;
    let user_id = from.get("id").and_then(Value::as_i64)?;

    let event = if let Some(text) = message.get("text").and_then(Value::as_str) {
        match text.strip_prefix('/') {
            Some(command) => {
                InboundEvent::command(command.split_whitespace().next().unwrap_or_default())
            }
            None => InboundEvent::text(text),
        }
    } else if let Some(location) = message.get("location") {
        let latitude = location.get("latitude").and_then(Value::as_f64)?;
        let longitude = location.get("longitude").and_then(Value::as_f64)?;
        InboundEvent::location(latitude, longitude)
    } else if let Some(sizes) = message.get("photo").and_then(Value::as_array) {
        // Sizes are ordered smallest first; keep the largest.
        let file_id = sizes.last()?.get("file_id").and_then(Value::as_str)?;
        InboundEvent::photo(file_id)
    } else {
        return None;
    };

    let mut incoming = IncomingMessage::new("telegram", UserId(user_id), event).with_metadata(
        json!({
            "chat_id": message.get("chat").and_then(|c| c.get("id")).and_then(Value::as_i64),
            "username": from.get("username").and_then(Value::as_str),
        }),
    );
    if let Some(name) = from.get("first_name").and_then(Value::as_str) {
        incoming = incoming.with_user_name(name);
    }
    Some(incoming)
}

/// Build `reply_markup` for a message. Inline buttons win over a reply
/// keyboard since Telegram accepts only one markup per message.
fn reply_markup(message: &OutboundMessage) -> Option<Value> {
    if !message.inline_buttons.is_empty() {
        let rows: Vec<Vec<Value>> = message
            .inline_buttons
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| json!({ "text": b.label, "callback_data": b.token }))
                    .collect()
            })
            .collect();
        return Some(json!({ "inline_keyboard": rows }));
    }

    match message.keyboard.as_ref()? {
        Keyboard::Choices { rows, one_time } => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| {
                            if b.request_location {
                                json!({ "text": b.label, "request_location": true })
                            } else {
                                json!({ "text": b.label })
                            }
                        })
                        .collect()
                })
                .collect();
            Some(json!({
                "keyboard": rows,
                "one_time_keyboard": one_time,
                "resize_keyboard": true,
            }))
        }
        Keyboard::Remove => Some(json!({ "remove_keyboard": true })),
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Never cut inside a multi-byte character.
        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{InlineButton, KeyboardButton};
    use crate::profile::PhotoRef;

    fn channel(allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new(
            SecretString::from("123:ABC".to_string()),
            allowed.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn api_url_embeds_token() {
        assert_eq!(
            channel(&[]).api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn allowlist_matches_whole_username_or_id() {
        assert!(channel(&["*"]).is_user_allowed("anyone"));
        assert!(!channel(&[]).is_user_allowed("anyone"));

        let ch = channel(&["sari", "42"]);
        assert!(ch.is_user_allowed("sari"));
        assert!(!ch.is_user_allowed("sari_bot"));
        assert!(!ch.is_user_allowed("rosari"));

        // Users without a username are matched by numeric id.
        assert!(check_user_allowed(&["42".to_string()], ["unknown", "42"]));
        assert!(!check_user_allowed(&["sari".to_string()], ["unknown", "42"]));
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parses_command_message() {
        let update = json!({
            "update_id": 1,
            "message": {
                "from": { "id": 42, "first_name": "Sari", "username": "sari" },
                "chat": { "id": 42 },
                "text": "/start payload"
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.user_id, UserId(42));
        assert_eq!(msg.user_name.as_deref(), Some("Sari"));
        assert_eq!(msg.event, InboundEvent::command("start"));
        assert_eq!(msg.metadata["username"], "sari");
    }

    #[test]
    fn parses_text_location_and_photo() {
        let text = json!({ "message": { "from": { "id": 1 }, "text": "Baca" } });
        assert_eq!(parse_update(&text).unwrap().event, InboundEvent::text("Baca"));

        let location = json!({
            "message": {
                "from": { "id": 1 },
                "location": { "latitude": 1.0, "longitude": 2.0 }
            }
        });
        assert_eq!(
            parse_update(&location).unwrap().event,
            InboundEvent::location(1.0, 2.0)
        );

        let photo = json!({
            "message": {
                "from": { "id": 1 },
                "photo": [
                    { "file_id": "small", "width": 90 },
                    { "file_id": "large", "width": 1280 }
                ]
            }
        });
        assert_eq!(parse_update(&photo).unwrap().event, InboundEvent::photo("large"));
    }

    #[test]
    fn parses_callback_query() {
        let update = json!({
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 7, "first_name": "Budi" },
                "data": "match_like_42"
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.user_id, UserId(7));
        assert_eq!(msg.event, InboundEvent::button("match_like_42"));
        assert_eq!(msg.metadata["callback_query_id"], "cb-1");
    }

    #[test]
    fn ignores_unhandled_updates() {
        let sticker = json!({ "message": { "from": { "id": 1 }, "sticker": {} } });
        assert!(parse_update(&sticker).is_none());
        let edited = json!({ "edited_message": { "from": { "id": 1 }, "text": "x" } });
        assert!(parse_update(&edited).is_none());
    }

    // ── Reply markup ────────────────────────────────────────────────

    #[test]
    fn inline_buttons_become_inline_keyboard() {
        let msg = OutboundMessage::text(UserId(1), "x")
            .with_photo(PhotoRef::new("p").unwrap())
            .with_inline_buttons(vec![vec![
                InlineButton::new("❌ Tidak Suka", "match_dislike_2"),
                InlineButton::new("❤️ Suka", "match_like_2"),
            ]]);
        let markup = reply_markup(&msg).unwrap();
        assert_eq!(markup["inline_keyboard"][0][1]["callback_data"], "match_like_2");
    }

    #[test]
    fn reply_keyboard_and_removal() {
        let msg = OutboundMessage::text(UserId(1), "x").with_keyboard(Keyboard::Choices {
            rows: vec![vec![KeyboardButton::location("Bagikan Lokasi Saat Ini")]],
            one_time: true,
        });
        let markup = reply_markup(&msg).unwrap();
        assert_eq!(markup["keyboard"][0][0]["request_location"], true);
        assert_eq!(markup["one_time_keyboard"], true);

        let remove = OutboundMessage::text(UserId(1), "x").with_keyboard(Keyboard::Remove);
        assert_eq!(reply_markup(&remove).unwrap()["remove_keyboard"], true);

        assert!(reply_markup(&OutboundMessage::text(UserId(1), "x")).is_none());
    }

    // ── Message splitting ───────────────────────────────────────────

    #[test]
    fn split_short_message_unchanged() {
        assert_eq!(split_message("hello", 4096), vec!["hello"]);
    }

    #[test]
    fn split_prefers_newlines() {
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = split_message(&text, 40);
        assert_eq!(chunks, vec!["a".repeat(30), "b".repeat(30)]);
    }

    #[test]
    fn split_hard_cuts_without_whitespace() {
        let chunks = split_message(&"x".repeat(100), 40);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 40));
    }

    #[test]
    fn split_respects_char_boundaries() {
        let text = "❤".repeat(50); // 3 bytes each
        let chunks = split_message(&text, 40);
        assert!(chunks.iter().all(|c| c.len() <= 40));
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn send_with_bogus_token_fails() {
        let ch = channel(&["*"]);
        let result = ch.send(&OutboundMessage::text(UserId(1), "halo")).await;
        assert!(matches!(result, Err(ChannelError::SendFailed { .. })));
    }
}
