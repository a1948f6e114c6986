//! Telegram channel: long-polls the Bot API for messages and button presses.
//!
//! Every update is decoded into a `UserAction` here, once. Prompts go back
//! as text with an inline keyboard, or as a photo by URL for gallery items.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{ActionStream, Channel, IncomingAction};
use crate::error::ChannelError;
use crate::order::{ConversationId, PhotoRef, Prompt, Selection, Submitter, UserAction};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Maximum caption length for sendPhoto.
const TELEGRAM_MAX_CAPTION_LENGTH: usize = 1024;

/// Telegram rejects callback data longer than this many bytes.
const TELEGRAM_MAX_CALLBACK_DATA: usize = 64;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram channel, connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

/// A decoded update plus what must be acknowledged back to Telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUpdate {
    pub action: IncomingAction,
    /// Set for button presses; the query has to be answered to stop the
    /// client's loading spinner.
    pub callback_query_id: Option<String>,
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
        format!(
            "{TELEGRAM_API_BASE}/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Check if a username or id is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        check_user_allowed(&self.allowed_users, [username])
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages; the keyboard goes on the last chunk.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { reply_markup } else { None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        reply_markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup.clone();
        }

        let mut markdown_body = body.clone();
        markdown_body["parse_mode"] = Value::String("Markdown".into());

        let markdown_resp = self.post("sendMessage", &markdown_body).await?;
        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_resp = self.post("sendMessage", &body).await?;
        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(send_failed(format!(
                "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
            )));
        }

        Ok(())
    }

    /// Send a photo by URL (Telegram downloads it).
    async fn send_photo_by_url(
        &self,
        chat_id: &str,
        url: &str,
        caption: Option<&str>,
        reply_markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "photo": url
        });
        if let Some(cap) = caption {
            body["caption"] = Value::String(cap.to_string());
        }
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup.clone();
        }

        let resp = self.post("sendPhoto", &body).await?;
        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(send_failed(format!("sendPhoto by URL failed: {err}")));
        }

        tracing::debug!(chat_id, url, "Telegram photo (URL) sent");
        Ok(())
    }

    async fn post(&self, method: &str, body: &Value) -> Result<reqwest::Response, ChannelError> {
        self.client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<ActionStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let updates_url = self.api_url("getUpdates");
        let answer_url = self.api_url("answerCallbackQuery");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&updates_url).json(&body).send().await {
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
                    let description = api_error_description(&data);
                    tracing::warn!("Telegram getUpdates returned no result: {description}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if let Some(query_id) = &parsed.callback_query_id {
                        let ack = serde_json::json!({ "callback_query_id": query_id });
                        if let Err(e) = client.post(&answer_url).json(&ack).send().await {
                            tracing::debug!("answerCallbackQuery failed: {e}");
                        }
                    }

                    if tx.send(parsed.action).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|action| (action, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        conversation: &ConversationId,
        prompt: &Prompt,
    ) -> Result<(), ChannelError> {
        let chat_id = conversation.as_str();
        let keyboard = inline_keyboard(prompt);

        match &prompt.image_url {
            Some(url) if prompt.text.chars().count() <= TELEGRAM_MAX_CAPTION_LENGTH => {
                self.send_photo_by_url(chat_id, url, Some(&prompt.text), keyboard.as_ref())
                    .await
            }
            Some(url) => {
                self.send_photo_by_url(chat_id, url, None, None).await?;
                self.send_message(chat_id, &prompt.text, keyboard.as_ref())
                    .await
            }
            None => {
                self.send_message(chat_id, &prompt.text, keyboard.as_ref())
                    .await
            }
        }
    }

    async fn notify(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        self.send_message(chat_id, text, None).await
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

// ── Update decoding ─────────────────────────────────────────────────

/// Decode one `getUpdates` entry. Returns `None` for updates that carry
/// nothing actionable or come from a user outside the allow-list.
pub fn parse_update(update: &Value, allowed_users: &[String]) -> Option<ParsedUpdate> {
    if let Some(query) = update.get("callback_query") {
        let from = query.get("from")?;
        let chat_id = query
            .get("message")
            .and_then(|m| m.get("chat"))
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)?;
        let submitter = allowed_submitter(from, allowed_users)?;
        let data = query.get("data").and_then(Value::as_str).unwrap_or_default();
        let callback_query_id = query.get("id").and_then(Value::as_str).map(String::from);

        return Some(ParsedUpdate {
            action: IncomingAction::new(
                "telegram",
                chat_id.to_string(),
                submitter,
                UserAction::Select(Selection::from_tag(data)),
            ),
            callback_query_id,
        });
    }

    let message = update.get("message")?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;
    let submitter = allowed_submitter(message.get("from")?, allowed_users)?;

    Some(ParsedUpdate {
        action: IncomingAction::new(
            "telegram",
            chat_id.to_string(),
            submitter,
            message_action(message),
        ),
        callback_query_id: None,
    })
}

fn message_action(message: &Value) -> UserAction {
    if let Some(photo) = largest_photo(message) {
        return UserAction::Image(photo);
    }

    if let Some(document) = message.get("document") {
        let is_image = document
            .get("mime_type")
            .and_then(Value::as_str)
            .is_some_and(|m| m.starts_with("image/"));
        if let (true, Some(file_id)) = (is_image, document.get("file_id").and_then(Value::as_str))
        {
            let mut photo = PhotoRef::new(file_id);
            photo.file_name = document
                .get("file_name")
                .and_then(Value::as_str)
                .map(String::from);
            return UserAction::Image(photo);
        }
        return UserAction::Unsupported("document".into());
    }

    if let Some(text) = message.get("text").and_then(Value::as_str) {
        if is_start_command(text) {
            return UserAction::Start;
        }
        return UserAction::Text(text.to_string());
    }

    let kind = ["sticker", "voice", "video", "audio", "location", "contact"]
        .into_iter()
        .find(|k| message.get(*k).is_some())
        .unwrap_or("unknown");
    UserAction::Unsupported(kind.to_string())
}

/// Telegram sends every size of a photo; keep the biggest.
fn largest_photo(message: &Value) -> Option<PhotoRef> {
    message
        .get("photo")?
        .as_array()?
        .iter()
        .max_by_key(|p| {
            let w = p.get("width").and_then(Value::as_i64).unwrap_or(0);
            let h = p.get("height").and_then(Value::as_i64).unwrap_or(0);
            w * h
        })
        .and_then(|p| p.get("file_id"))
        .and_then(Value::as_str)
        .map(PhotoRef::new)
}

/// `/start`, `/start@SomeBot` and `/start <payload>` all restart the order.
fn is_start_command(text: &str) -> bool {
    let command = text.trim().split_whitespace().next().unwrap_or_default();
    command == "/start" || command.starts_with("/start@")
}

fn allowed_submitter(from: &Value, allowed_users: &[String]) -> Option<Submitter> {
    let username = from.get("username").and_then(Value::as_str);
    let user_id = from.get("id").and_then(Value::as_i64).map(|id| id.to_string());

    // Check allowlist against both username and numeric ID
    let identities = username.into_iter().chain(user_id.as_deref());
    if !check_user_allowed(allowed_users, identities) {
        tracing::warn!(
            "Telegram: ignoring update from unauthorized user: username={}, user_id={}",
            username.unwrap_or("unknown"),
            user_id.as_deref().unwrap_or("unknown")
        );
        return None;
    }

    let display_name = match (
        from.get("first_name").and_then(Value::as_str),
        from.get("last_name").and_then(Value::as_str),
    ) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first.to_string(),
        _ => username.unwrap_or("unknown").to_string(),
    };
    let id = user_id
        .or_else(|| username.map(String::from))
        .unwrap_or_else(|| "unknown".into());

    Some(Submitter::new(id, display_name))
}

// ── Helpers ─────────────────────────────────────────────────────────

/// One button per row, callback data = selection tag.
fn inline_keyboard(prompt: &Prompt) -> Option<Value> {
    if prompt.options.is_empty() {
        return None;
    }

    let rows: Vec<Value> = prompt
        .options
        .iter()
        .map(|option| {
            let tag = option.tag();
            if tag.len() > TELEGRAM_MAX_CALLBACK_DATA {
                tracing::warn!(
                    tag = %tag,
                    "Callback data exceeds {TELEGRAM_MAX_CALLBACK_DATA} bytes; Telegram will reject it"
                );
            }
            serde_json::json!([{ "text": option.label, "callback_data": tag }])
        })
        .collect();

    Some(serde_json::json!({ "inline_keyboard": rows }))
}

/// The `description` Telegram attaches to a failed Bot API call.
fn api_error_description(data: &Value) -> &str {
    data.get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason,
    }
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

        // Never cut inside a multi-byte character
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
