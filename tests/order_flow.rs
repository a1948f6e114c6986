//! End-to-end conversations through `OrderBot` with a recording channel,
//! a static asset lister and in-memory stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use memorial_order_bot::assets::{AssetCategory, AssetItem, AssetPager, StaticAssetLister};
use memorial_order_bot::bot::{BotDeps, OrderBot};
use memorial_order_bot::catalog::{Catalog, ProductMaterial};
use memorial_order_bot::channels::{ActionStream, Channel, IncomingAction};
use memorial_order_bot::config::BotConfig;
use memorial_order_bot::error::{ChannelError, DatabaseError};
use memorial_order_bot::order::{
    ConversationId, ConversationState, OrderStep, PhotoRef, PrintFormat, Prompt, Selection,
    Submitter, UserAction,
};
use memorial_order_bot::store::{ConversationStore, InMemoryConversationStore, InMemoryOrderBook};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Records everything sent; optionally replays a script from `start`.
#[derive(Default)]
struct RecordingChannel {
    script: std::sync::Mutex<Vec<IncomingAction>>,
    sent: std::sync::Mutex<Vec<(ConversationId, Prompt)>>,
    notified: std::sync::Mutex<Vec<(String, String)>>,
    fail_notify: AtomicBool,
}

impl RecordingChannel {
    fn with_script(actions: Vec<IncomingAction>) -> Self {
        Self {
            script: std::sync::Mutex::new(actions),
            ..Default::default()
        }
    }

    fn sent_to(&self, id: &str) -> Vec<Prompt> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c.as_str() == id)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn notified(&self) -> Vec<(String, String)> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<ActionStream, ChannelError> {
        let actions = std::mem::take(&mut *self.script.lock().unwrap());
        Ok(Box::pin(futures::stream::iter(actions)))
    }

    async fn respond(&self, conversation: &ConversationId, prompt: &Prompt) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((conversation.clone(), prompt.clone()));
        Ok(())
    }

    async fn notify(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        if self.fail_notify.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "admin chat unreachable".into(),
            });
        }
        self.notified
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Wraps the in-memory store: can refuse writes or deletes, and tracks how many turns
/// of one conversation are between load and save at the same time.
#[derive(Default)]
struct InstrumentedStore {
    inner: InMemoryConversationStore,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InstrumentedStore {
    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConversationStore for InstrumentedStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, DatabaseError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.inner.load(id).await
    }

    async fn save(&self, id: &ConversationId, state: &ConversationState) -> Result<(), DatabaseError> {
        self.leave();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("disk full".into()));
        }
        self.inner.save(id, state).await
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, DatabaseError> {
        // Left to the save the bot falls back to.
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("database is locked".into()));
        }
        self.leave();
        self.inner.delete(id).await
    }

    async fn prune_idle(&self, max_idle: Duration) -> Result<usize, DatabaseError> {
        self.inner.prune_idle(max_idle).await
    }
}

struct Harness {
    bot: OrderBot,
    channel: Arc<RecordingChannel>,
    store: Arc<InstrumentedStore>,
    book: Arc<InMemoryOrderBook>,
}

fn items(prefix: &str, n: usize) -> Vec<AssetItem> {
    (1..=n)
        .map(|i| AssetItem::new(format!("{prefix}{i}"), format!("https://cdn.test/{prefix}{i}.png")))
        .collect()
}

fn harness_with(channel: RecordingChannel) -> Harness {
    let config = BotConfig {
        admin_chat_id: Some("admin-chat".into()),
        ..Default::default()
    };
    let lister = Arc::new(
        StaticAssetLister::new()
            .with(AssetCategory::Font, items("font", 5))
            .with(AssetCategory::Background, items("bg", 4)),
    );
    let pager = Arc::new(AssetPager::new(
        lister,
        config.flow.page_size,
        config.flow.external_timeout,
    ));
    let channel = Arc::new(channel);
    let store = Arc::new(InstrumentedStore::default());
    let book = Arc::new(InMemoryOrderBook::new());
    let deps = BotDeps {
        store: store.clone(),
        sink: book.clone(),
        pager,
        catalog: Arc::new(Catalog::new()),
    };
    Harness {
        bot: OrderBot::new(config, deps, channel.clone()),
        channel,
        store,
        book,
    }
}

fn harness() -> Harness {
    harness_with(RecordingChannel::default())
}

fn action(chat: &str, action: UserAction) -> IncomingAction {
    IncomingAction::new("recording", chat, Submitter::new("42", "Maria"), action)
}

fn select(chat: &str, selection: Selection) -> IncomingAction {
    action(chat, UserAction::Select(selection))
}

fn font(id: &str) -> Selection {
    Selection::Asset {
        category: AssetCategory::Font,
        id: id.into(),
    }
}

fn tags(prompts: &[Prompt]) -> Vec<String> {
    prompts
        .iter()
        .flat_map(|p| p.options.iter().map(|o| o.tag()))
        .collect()
}

impl Harness {
    async fn send(&self, incoming: IncomingAction) -> Vec<Prompt> {
        timeout(TEST_TIMEOUT, self.bot.handle_action(incoming))
            .await
            .expect("handle_action hung")
            .expect("handle_action failed")
    }

    async fn step(&self, chat: &str) -> Option<OrderStep> {
        self.store
            .inner
            .load(&ConversationId::from(chat))
            .await
            .unwrap()
            .map(|s| s.step)
    }
}

#[tokio::test]
async fn no_text_order_completes_and_notifies_admin() {
    let h = harness();
    let chat = "1001";

    let greeting = h.send(action(chat, UserAction::Start)).await;
    assert_eq!(greeting.len(), 2);
    assert!(tags(&greeting).contains(&"material:ceramic".to_string()));

    h.send(select(chat, Selection::Material(ProductMaterial::Ceramic))).await;
    h.send(select(chat, Selection::Size("13x18".into()))).await;
    let done = h
        .send(select(chat, Selection::Format(PrintFormat::PortraitWithoutText)))
        .await;

    let orders = h.book.orders().await;
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.retail_price, 1100);
    assert_eq!(order.submitter_name, "Maria");
    assert!(done.iter().any(|p| p.text.contains(&order.order_number)));

    // Completed conversations are not kept
    assert_eq!(h.step(chat).await, None);

    let notified = h.channel.notified();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].0, "admin-chat");
    assert!(notified[0].1.contains(&order.order_number));
    assert!(notified[0].1.contains("Ceramic"));

    // Everything returned was also sent, in order
    assert_eq!(h.channel.sent_to(chat).last(), done.last());
}

#[tokio::test]
async fn metal_oval_text_only_prices_and_guards_fonts() {
    let h = harness();
    let chat = "1002";

    h.send(select(chat, Selection::Material(ProductMaterial::MetalOval))).await;
    let format = h.send(select(chat, Selection::Size("18x24".into()))).await;
    assert!(format[0].text.contains("1400 ₽"));

    let fonts = h.send(select(chat, Selection::Format(PrintFormat::TextOnly))).await;
    assert_eq!(tags(&fonts), ["font:font1", "font:font2", "font:font3", "more:font"]);
    assert!(fonts.iter().take(3).all(|p| p.image_url.is_some()));

    let rejected = h.send(select(chat, font("font5"))).await;
    assert!(rejected[0].text.contains("from the ones shown"));
    assert_eq!(h.step(chat).await, Some(OrderStep::AwaitingFont));

    h.send(select(chat, font("font2"))).await;
    assert_eq!(h.step(chat).await, Some(OrderStep::AwaitingPersonalText));
}

#[tokio::test]
async fn out_of_range_size_keeps_asking() {
    let h = harness();
    let chat = "1003";

    h.send(select(chat, Selection::Material(ProductMaterial::Ceramic))).await;
    let reply = h.send(action(chat, UserAction::Text("99x99".into()))).await;

    assert!(reply[0].text.contains("99x99"));
    assert_eq!(h.step(chat).await, Some(OrderStep::AwaitingSize));
    let state = h
        .store
        .inner
        .load(&ConversationId::from(chat))
        .await
        .unwrap()
        .unwrap();
    assert!(state.draft.retail_price.is_none());
}

/// Turns that take a conversation from scratch to `AwaitingPhoto` on the
/// portrait-with-text path.
fn portrait_turns(chat: &str) -> Vec<IncomingAction> {
    vec![
        select(chat, Selection::Material(ProductMaterial::MetalRectangular)),
        select(chat, Selection::Size("20x30".into())),
        select(chat, Selection::Format(PrintFormat::PortraitWithText)),
        select(chat, font("font1")),
        action(chat, UserAction::Text("In loving memory".into())),
        select(
            chat,
            Selection::Asset {
                category: AssetCategory::Background,
                id: "bg3".into(),
            },
        ),
    ]
}

#[tokio::test]
async fn full_portrait_order_submits_once() {
    let h = harness();
    let chat = "1004";

    for a in portrait_turns(chat) {
        h.send(a).await;
    }
    assert_eq!(h.step(chat).await, Some(OrderStep::AwaitingPhoto));

    let confirm = h
        .send(action(chat, UserAction::Image(PhotoRef::new("photo-1"))))
        .await;
    assert_eq!(tags(&confirm), ["confirm"]);
    assert!(confirm[0].text.contains("In loving memory"));

    h.send(select(chat, Selection::Confirm)).await;
    // A second tap lands in a fresh conversation and places nothing
    h.send(select(chat, Selection::Confirm)).await;

    let orders = h.book.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].retail_price, 2250);
    assert_eq!(orders[0].background.as_deref(), Some("bg3"));
    assert_eq!(orders[0].photo, Some(PhotoRef::new("photo-1")));
}

#[tokio::test]
async fn failed_delete_after_submit_does_not_submit_twice() {
    let h = harness();
    let chat = "1009";

    for a in portrait_turns(chat) {
        h.send(a).await;
    }
    h.send(action(chat, UserAction::Image(PhotoRef::new("photo-9"))))
        .await;
    assert_eq!(h.step(chat).await, Some(OrderStep::AwaitingConfirmation));

    h.store.fail_deletes.store(true, Ordering::SeqCst);
    h.send(select(chat, Selection::Confirm)).await;
    assert_eq!(h.step(chat).await, Some(OrderStep::Completed));

    let restarted = h.send(select(chat, Selection::Confirm)).await;
    assert!(tags(&restarted).contains(&"material:ceramic".to_string()));
    assert_eq!(h.book.orders().await.len(), 1);
    assert_eq!(h.channel.notified().len(), 1);
}

#[tokio::test]
async fn custom_material_ends_the_conversation() {
    let h = harness();
    let chat = "1005";

    h.send(action(chat, UserAction::Start)).await;
    let reply = h
        .send(select(chat, Selection::Material(ProductMaterial::Custom)))
        .await;
    assert!(reply[0].text.contains("contact us"));
    assert_eq!(h.step(chat).await, None);
    assert!(h.book.orders().await.is_empty());
}

#[tokio::test]
async fn failed_save_apologizes() {
    let h = harness();
    h.store.fail_writes.store(true, Ordering::SeqCst);

    let reply = h.send(action("1006", UserAction::Start)).await;
    assert_eq!(reply.len(), 3);
    assert!(reply[2].text.contains("could not save"));
    assert_eq!(h.channel.sent_to("1006").len(), 3);
}

#[tokio::test]
async fn admin_notification_failure_does_not_reach_customer() {
    let h = harness();
    h.channel.fail_notify.store(true, Ordering::SeqCst);
    let chat = "1007";

    h.send(select(chat, Selection::Material(ProductMaterial::Ceramic))).await;
    h.send(select(chat, Selection::Size("9x12".into()))).await;
    let done = h
        .send(select(chat, Selection::Format(PrintFormat::PortraitWithoutText)))
        .await;

    assert_eq!(h.book.orders().await.len(), 1);
    assert!(done.iter().any(|p| p.text.contains("Thank you")));
}

#[tokio::test]
async fn conversations_do_not_share_drafts() {
    let h = harness();

    h.send(select("a", Selection::Material(ProductMaterial::Ceramic))).await;
    h.send(select("b", Selection::Material(ProductMaterial::MetalOval))).await;
    h.send(select("a", Selection::Size("13x18".into()))).await;

    assert_eq!(h.step("a").await, Some(OrderStep::AwaitingFormat));
    assert_eq!(h.step("b").await, Some(OrderStep::AwaitingSize));
}

#[tokio::test]
async fn turns_of_one_conversation_are_serialized() {
    let h = harness();
    let chat = "1008";

    let mut handles = Vec::new();
    for _ in 0..8 {
        let bot = h.bot.clone();
        handles.push(tokio::spawn(async move {
            bot.handle_action(action(chat, UserAction::Text("hello".into())))
                .await
        }));
    }
    for handle in handles {
        timeout(TEST_TIMEOUT, handle)
            .await
            .expect("turn hung")
            .unwrap()
            .unwrap();
    }

    assert_eq!(h.store.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(h.bot.active_conversations().await, 0);
    assert_eq!(h.channel.sent_to(chat).len(), 16);
}

#[tokio::test]
async fn run_drains_the_channel_stream() {
    let script = vec![
        action("2001", UserAction::Start),
        action("2002", UserAction::Start),
    ];
    let h = harness_with(RecordingChannel::with_script(script));

    timeout(TEST_TIMEOUT, h.bot.clone().run())
        .await
        .expect("run hung")
        .unwrap();

    // Handling happens on spawned tasks; give them a moment to finish.
    timeout(TEST_TIMEOUT, async {
        while h.channel.sent_to("2001").len() < 2 || h.channel.sent_to("2002").len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("actions were not handled");
}
