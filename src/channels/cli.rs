//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Lines are read as actions: `/start`, `#<tag>` to press an option,
//! `photo <ref>` to attach an image, anything else is text.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{ActionStream, Channel, IncomingAction};
use crate::error::ChannelError;
use crate::order::{ConversationId, PhotoRef, Prompt, Selection, Submitter, UserAction};

const CLI_CONVERSATION: &str = "cli";

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<ActionStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprintln!("Type /start to begin, #<tag> to pick an option, photo <ref> to attach.");
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(action) = parse_cli_line(&line) else {
                            eprint!("> ");
                            continue;
                        };
                        let incoming = IncomingAction::new(
                            "cli",
                            CLI_CONVERSATION,
                            Submitter::new("local-user", "Local user"),
                            action,
                        );
                        if tx.send(incoming).is_err() {
                            break;
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
            rx.recv().await.map(|action| (action, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _conversation: &ConversationId,
        prompt: &Prompt,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", render_prompt(prompt));
        eprint!("> ");
        Ok(())
    }

    async fn notify(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        eprintln!("[notify {chat_id}]\n{text}");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Turn one input line into an action. Blank lines yield `None`.
pub fn parse_cli_line(line: &str) -> Option<UserAction> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line == "/start" {
        return Some(UserAction::Start);
    }
    if let Some(tag) = line.strip_prefix('#') {
        return Some(UserAction::Select(Selection::from_tag(tag.trim())));
    }
    if let Some(reference) = line.strip_prefix("photo ") {
        let reference = reference.trim();
        if !reference.is_empty() {
            return Some(UserAction::Image(PhotoRef::new(reference)));
        }
    }
    Some(UserAction::Text(line.to_string()))
}

fn render_prompt(prompt: &Prompt) -> String {
    let mut out = String::new();
    if let Some(url) = &prompt.image_url {
        out.push_str(&format!("[image] {url}\n"));
    }
    out.push_str(&prompt.text);
    for option in &prompt.options {
        out.push_str(&format!("\n  #{}  {}", option.tag(), option.label));
    }
    out
}
