//! OrderBot: feeds channel actions through the state machine.
//!
//! Actions for different conversations run concurrently; actions for the
//! same conversation are serialized so a draft is never edited by two turns
//! at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::assets::AssetPager;
use crate::catalog::Catalog;
use crate::channels::{Channel, IncomingAction};
use crate::config::BotConfig;
use crate::error::Error;
use crate::order::prompts;
use crate::order::{
    ConversationId, ConversationState, OrderSink, OrderStateMachine, Prompt, SubmittedOrder,
};
use crate::store::ConversationStore;

/// Shared components the bot is built from.
pub struct BotDeps {
    pub store: Arc<dyn ConversationStore>,
    pub sink: Arc<dyn OrderSink>,
    pub pager: Arc<AssetPager>,
    pub catalog: Arc<Catalog>,
}

/// The running order bot. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct OrderBot {
    inner: Arc<BotInner>,
}

struct BotInner {
    config: BotConfig,
    store: Arc<dyn ConversationStore>,
    machine: OrderStateMachine,
    channel: Arc<dyn Channel>,
    locks: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl OrderBot {
    pub fn new(config: BotConfig, deps: BotDeps, channel: Arc<dyn Channel>) -> Self {
        let machine =
            OrderStateMachine::new(deps.catalog, deps.pager, deps.sink, config.flow.clone());
        Self {
            inner: Arc::new(BotInner {
                config,
                store: deps.store,
                machine,
                channel,
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run until the channel stream ends or Ctrl+C.
    pub async fn run(self) -> Result<(), Error> {
        let mut actions = self.inner.channel.start().await?;

        // Spawn idle conversation pruning
        let store = self.inner.store.clone();
        let idle_timeout = self.inner.config.idle_timeout;
        let prune_interval = self.inner.config.prune_interval.max(Duration::from_secs(1));
        let pruning_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(prune_interval);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                prune_idle(store.as_ref(), idle_timeout).await;
            }
        });

        tracing::info!(
            "{} ready and listening on {}",
            self.inner.config.name,
            self.inner.channel.name()
        );

        loop {
            let incoming = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                next = actions.next() => {
                    match next {
                        Some(a) => a,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            let bot = self.clone();
            tokio::spawn(async move {
                if let Err(e) = bot.handle_action(incoming).await {
                    tracing::error!("Error handling action: {e}");
                }
            });
        }

        tracing::info!("Order bot shutting down...");
        pruning_handle.abort();
        self.inner.channel.shutdown().await?;

        Ok(())
    }

    /// Handle one inbound action end to end and return the prompts sent.
    ///
    /// Waits for any earlier action of the same conversation to finish.
    pub async fn handle_action(&self, incoming: IncomingAction) -> Result<Vec<Prompt>, Error> {
        let span = tracing::info_span!(
            "conversation",
            conversation = %incoming.conversation,
            channel = %incoming.channel,
        );

        let id = incoming.conversation.clone();
        let lock = self.conversation_lock(&id).await;
        let result = {
            let _guard = lock.lock().await;
            self.process(incoming).instrument(span).await
        };
        self.release_lock(&id, lock).await;
        result
    }

    async fn process(&self, incoming: IncomingAction) -> Result<Vec<Prompt>, Error> {
        let inner = &self.inner;
        let id = &incoming.conversation;

        let mut state = match inner.store.load(id).await {
            Ok(Some(state)) => state,
            Ok(None) => ConversationState::new(),
            Err(e) => {
                tracing::error!("Failed to load conversation: {e}");
                let apology = prompts::state_not_saved();
                self.send(id, &apology).await;
                return Err(e.into());
            }
        };

        let outcome = inner
            .machine
            .handle(&mut state, incoming.action, &incoming.submitter)
            .await;
        state.touch();

        let mut outgoing = outcome.prompts;
        let persisted = if state.step.is_terminal() {
            match inner.store.delete(id).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    // The stored row still holds the pre-submit step.
                    tracing::warn!(
                        "Failed to delete finished conversation, closing it instead: {e}"
                    );
                    inner.store.save(id, &state).await
                }
            }
        } else {
            inner.store.save(id, &state).await
        };
        if let Err(e) = persisted {
            tracing::error!(step = %state.step, "Failed to persist conversation: {e}");
            outgoing.push(prompts::state_not_saved());
        }

        for prompt in &outgoing {
            self.send(id, prompt).await;
        }

        if let Some(order) = &outcome.submitted {
            self.notify_admin(order).await;
        }

        Ok(outgoing)
    }

    async fn send(&self, id: &ConversationId, prompt: &Prompt) {
        if let Err(e) = self.inner.channel.respond(id, prompt).await {
            tracing::warn!("Failed to send prompt: {e}");
        }
    }

    async fn notify_admin(&self, order: &SubmittedOrder) {
        let Some(chat_id) = &self.inner.config.admin_chat_id else {
            return;
        };
        let text = prompts::admin_notification(order);
        match self.inner.channel.notify(chat_id, &text).await {
            Ok(()) => tracing::debug!(order_number = %order.order_number, "Admin notified"),
            Err(e) => tracing::warn!(
                order_number = %order.order_number,
                "Failed to notify admin: {e}"
            ),
        }
    }

    async fn conversation_lock(&self, id: &ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks.entry(id.clone()).or_default().clone()
    }

    /// Drop the map entry once no other task holds or waits on it.
    async fn release_lock(&self, id: &ConversationId, lock: Arc<Mutex<()>>) {
        let mut locks = self.inner.locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    /// Number of conversations with an action in flight.
    pub async fn active_conversations(&self) -> usize {
        self.inner.locks.lock().await.len()
    }
}

async fn prune_idle(store: &dyn ConversationStore, idle_timeout: Duration) {
    match store.prune_idle(idle_timeout).await {
        Ok(0) => {}
        Ok(pruned) => tracing::info!(pruned, "Pruned idle conversations"),
        Err(e) => tracing::warn!("Failed to prune idle conversations: {e}"),
    }
}
