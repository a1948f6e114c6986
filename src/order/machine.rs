//! OrderStateMachine: validates each inbound action against the current
//! step, fills in the draft, and decides what comes next.
//!
//! Every step handler either succeeds (possibly moving to another step) or
//! returns a [`FlowError`] without having touched the conversation state.
//! The one exception is a failed submission, which leaves the draft in
//! AwaitingConfirmation.
//! The error is then turned into a notice plus a re-prompt, or, for catalog
//! misses under the abandon policy, an apology that ends the conversation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::action::{Selection, UserAction};
use super::model::{ConversationState, PaginationCursor, PrintFormat, Submitter, SubmittedOrder};
use super::prompts::{self, Prompt};
use super::sink::OrderSink;
use super::state::OrderStep;
use crate::assets::{AssetCategory, AssetPager};
use crate::catalog::{Catalog, ProductMaterial, normalize_size_label};
use crate::config::{FlowConfig, UnrecognizedChoice};
use crate::error::FlowError;

/// What one handled action produced.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Messages for the customer, in order.
    pub prompts: Vec<Prompt>,
    /// Set when this action placed an order.
    pub submitted: Option<SubmittedOrder>,
}

impl StepOutcome {
    fn prompts(prompts: Vec<Prompt>) -> Self {
        Self {
            prompts,
            submitted: None,
        }
    }

    fn prompt(prompt: Prompt) -> Self {
        Self::prompts(vec![prompt])
    }
}

type StepResult = Result<StepOutcome, FlowError>;

pub struct OrderStateMachine {
    catalog: Arc<Catalog>,
    pager: Arc<AssetPager>,
    sink: Arc<dyn OrderSink>,
    flow: FlowConfig,
}

impl OrderStateMachine {
    pub fn new(
        catalog: Arc<Catalog>,
        pager: Arc<AssetPager>,
        sink: Arc<dyn OrderSink>,
        flow: FlowConfig,
    ) -> Self {
        Self {
            catalog,
            pager,
            sink,
            flow,
        }
    }

    /// Handle one action for one conversation.
    ///
    /// `/start`, or any action after the conversation completed, begins a
    /// fresh order.
    pub async fn handle(
        &self,
        state: &mut ConversationState,
        action: UserAction,
        submitter: &Submitter,
    ) -> StepOutcome {
        if matches!(action, UserAction::Start) || state.step.is_terminal() {
            return self.restart(state);
        }

        let from = state.step;
        debug!(step = %from, action = action.kind(), "Handling action");

        let result = match from {
            OrderStep::AwaitingMaterial => self.on_material(state, action),
            OrderStep::AwaitingSize => self.on_size(state, action),
            OrderStep::AwaitingFormat => self.on_format(state, action, submitter).await,
            OrderStep::AwaitingFont => self.on_browse(state, AssetCategory::Font, action).await,
            OrderStep::AwaitingPersonalText => self.on_personal_text(state, action).await,
            OrderStep::AwaitingBackground => {
                self.on_browse(state, AssetCategory::Background, action).await
            }
            OrderStep::AwaitingPhoto => self.on_photo(state, action),
            OrderStep::AwaitingConfirmation => self.on_confirmation(state, action, submitter).await,
            OrderStep::Completed => Ok(self.restart(state)),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => self.recover(state, e),
        };

        if state.step != from {
            info!(from = %from, to = %state.step, "Order step changed");
        }
        outcome
    }

    fn restart(&self, state: &mut ConversationState) -> StepOutcome {
        *state = ConversationState::new();
        StepOutcome::prompts(vec![prompts::greeting(), prompts::material_prompt()])
    }

    fn on_material(&self, state: &mut ConversationState, action: UserAction) -> StepResult {
        let material = match action {
            UserAction::Select(Selection::Material(m)) => m,
            UserAction::Select(Selection::Unrecognized(_)) => {
                return Err(FlowError::NotFound(prompts::unknown_material()));
            }
            UserAction::Text(text) => match ProductMaterial::from_text(&text) {
                Some(m) => m,
                None if text.trim().is_empty() => {
                    return Err(FlowError::UserInput(prompts::unexpected_input()));
                }
                None => return Err(FlowError::NotFound(prompts::unknown_material())),
            },
            _ => return Err(FlowError::UserInput(prompts::unexpected_input())),
        };

        if !material.is_supported() {
            info!(material = %material, "Unsupported material chosen");
            state.enter(OrderStep::Completed);
            return Ok(StepOutcome::prompt(prompts::unsupported_material()));
        }

        state.draft.material = Some(material);
        state.enter(OrderStep::AwaitingSize);
        Ok(StepOutcome::prompt(prompts::size_prompt(
            material,
            self.catalog.sizes_for(material),
        )))
    }

    fn on_size(&self, state: &mut ConversationState, action: UserAction) -> StepResult {
        let Some(material) = state.draft.material else {
            warn!("Size step without a material, restarting");
            return Ok(self.restart(state));
        };

        let label = match action {
            UserAction::Select(Selection::Size(label)) => label,
            UserAction::Select(Selection::Unrecognized(tag)) => {
                return Err(FlowError::NotFound(prompts::unknown_size(&tag)));
            }
            UserAction::Text(text) => normalize_size_label(&text)
                .ok_or_else(|| FlowError::UserInput(prompts::unexpected_input()))?,
            _ => return Err(FlowError::UserInput(prompts::unexpected_input())),
        };

        let entry = self
            .catalog
            .entry_for(material, &label)
            .ok_or_else(|| FlowError::NotFound(prompts::unknown_size(&label)))?;

        state.draft.size = Some(entry.label.to_string());
        state.draft.retail_price = Some(entry.retail());
        state.enter(OrderStep::AwaitingFormat);
        Ok(StepOutcome::prompt(prompts::format_prompt(&state.draft)))
    }

    async fn on_format(
        &self,
        state: &mut ConversationState,
        action: UserAction,
        submitter: &Submitter,
    ) -> StepResult {
        let format = match action {
            UserAction::Select(Selection::Format(f)) => f,
            UserAction::Text(text) => PrintFormat::from_text(&text)
                .ok_or_else(|| FlowError::UserInput(prompts::unexpected_input()))?,
            _ => return Err(FlowError::UserInput(prompts::unexpected_input())),
        };

        state.draft.format = Some(format);

        if format.requires_text() {
            state.enter(OrderStep::AwaitingFont);
            state.cursor = Some(PaginationCursor::new(AssetCategory::Font));
            let prompts = self.browse(state, AssetCategory::Font).await;
            return Ok(StepOutcome::prompts(prompts));
        }

        if self.flow.photo_required_without_text {
            state.enter(OrderStep::AwaitingPhoto);
            return Ok(StepOutcome::prompt(prompts::photo_prompt()));
        }

        // Nothing else to collect. A failed submission leaves the draft
        // waiting for the customer to confirm again.
        state.enter(OrderStep::AwaitingConfirmation);
        self.submit(state, submitter).await
    }

    /// Serve the next page of `category` and record what was shown.
    async fn browse(&self, state: &mut ConversationState, category: AssetCategory) -> Vec<Prompt> {
        let cursor = state.cursor_for(category);
        match self.pager.next_page(category, &cursor.shown).await {
            Ok(page) if page.is_empty() => {
                if cursor.shown.is_empty() {
                    vec![prompts::no_items(category)]
                } else {
                    vec![prompts::no_more_items(category)]
                }
            }
            Ok(page) => {
                cursor.mark_shown(&page.items);
                prompts::asset_page(category, &page)
            }
            Err(e) => {
                warn!(category = %category, error = %e, "Asset page unavailable");
                vec![prompts::assets_unavailable(category)]
            }
        }
    }

    async fn on_browse(
        &self,
        state: &mut ConversationState,
        category: AssetCategory,
        action: UserAction,
    ) -> StepResult {
        let id = match action {
            UserAction::Select(Selection::ShowMore(c)) if c == category => {
                let prompts = self.browse(state, category).await;
                return Ok(StepOutcome::prompts(prompts));
            }
            UserAction::Select(Selection::Asset { category: c, id }) if c == category => id,
            UserAction::Text(text) => text.trim().to_string(),
            _ => return Err(FlowError::UserInput(prompts::not_shown(category))),
        };

        let was_shown = state
            .cursor
            .as_ref()
            .is_some_and(|c| c.has_shown(category, &id));
        if !was_shown {
            return Err(FlowError::UserInput(prompts::not_shown(category)));
        }

        state.cursor = None;
        match category {
            AssetCategory::Font => {
                state.draft.font = Some(id);
                state.enter(OrderStep::AwaitingPersonalText);
                Ok(StepOutcome::prompt(prompts::personal_text_prompt()))
            }
            AssetCategory::Background => {
                state.draft.background = Some(id);
                state.enter(OrderStep::AwaitingPhoto);
                Ok(StepOutcome::prompt(prompts::photo_prompt()))
            }
        }
    }

    async fn on_personal_text(&self, state: &mut ConversationState, action: UserAction) -> StepResult {
        let UserAction::Text(text) = action else {
            return Err(FlowError::UserInput(prompts::text_expected()));
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(FlowError::UserInput(prompts::empty_text()));
        }

        state.draft.personal_text = Some(text.to_string());
        state.enter(OrderStep::AwaitingBackground);
        state.cursor = Some(PaginationCursor::new(AssetCategory::Background));
        let prompts = self.browse(state, AssetCategory::Background).await;
        Ok(StepOutcome::prompts(prompts))
    }

    fn on_photo(&self, state: &mut ConversationState, action: UserAction) -> StepResult {
        let UserAction::Image(photo) = action else {
            return Err(FlowError::UserInput(prompts::photo_expected()));
        };

        state.draft.photo = Some(photo);
        state.enter(OrderStep::AwaitingConfirmation);
        Ok(StepOutcome::prompt(prompts::confirmation_prompt(&state.draft)))
    }

    async fn on_confirmation(
        &self,
        state: &mut ConversationState,
        action: UserAction,
        submitter: &Submitter,
    ) -> StepResult {
        match action {
            UserAction::Select(Selection::Confirm) => self.submit(state, submitter).await,
            _ => Err(FlowError::UserInput(prompts::confirm_expected())),
        }
    }

    /// Hand the draft to the sink once. Only success leaves AwaitingConfirmation.
    async fn submit(&self, state: &mut ConversationState, submitter: &Submitter) -> StepResult {
        let Some(order) = state.draft.finalize(submitter, Utc::now()) else {
            warn!(step = %state.step, "Draft incomplete at confirmation, restarting");
            return Ok(self.restart(state));
        };

        let timeout = self.flow.external_timeout;
        match tokio::time::timeout(timeout, self.sink.submit(&order)).await {
            Ok(Ok(())) => {
                info!(
                    order_number = %order.order_number,
                    submitter = %order.submitter_id,
                    material = %order.material,
                    price = order.retail_price,
                    "Order submitted"
                );
                state.enter(OrderStep::Completed);
                state.cursor = None;
                Ok(StepOutcome {
                    prompts: vec![prompts::submitted(&order)],
                    submitted: Some(order),
                })
            }
            Ok(Err(e)) => {
                warn!(order_number = %order.order_number, error = %e, "Order submission failed");
                Err(FlowError::ExternalUnavailable(prompts::submit_failed()))
            }
            Err(_) => {
                warn!(order_number = %order.order_number, timeout = ?timeout, "Order submission timed out");
                Err(FlowError::ExternalUnavailable(prompts::submit_failed()))
            }
        }
    }

    fn recover(&self, state: &mut ConversationState, error: FlowError) -> StepOutcome {
        match error {
            FlowError::NotFound(reason) if self.flow.on_unrecognized == UnrecognizedChoice::Abandon => {
                info!(step = %state.step, "Catalog miss, abandoning conversation");
                state.enter(OrderStep::Completed);
                state.cursor = None;
                StepOutcome::prompt(prompts::abandoned(&reason))
            }
            FlowError::UserInput(notice)
            | FlowError::NotFound(notice)
            | FlowError::ExternalUnavailable(notice) => {
                debug!(step = %state.step, notice = %notice, "Re-prompting");
                StepOutcome::prompts(vec![Prompt::text(notice), self.reprompt(state)])
            }
        }
    }

    /// The current step's question again, with its options.
    fn reprompt(&self, state: &ConversationState) -> Prompt {
        match state.step {
            OrderStep::AwaitingMaterial | OrderStep::Completed => prompts::material_prompt(),
            OrderStep::AwaitingSize => match state.draft.material {
                Some(m) => prompts::size_prompt(m, self.catalog.sizes_for(m)),
                None => prompts::material_prompt(),
            },
            OrderStep::AwaitingFormat => prompts::format_prompt(&state.draft),
            OrderStep::AwaitingFont => prompts::browse_hint(AssetCategory::Font),
            OrderStep::AwaitingPersonalText => prompts::personal_text_prompt(),
            OrderStep::AwaitingBackground => prompts::browse_hint(AssetCategory::Background),
            OrderStep::AwaitingPhoto => prompts::photo_prompt(),
            OrderStep::AwaitingConfirmation => prompts::confirmation_prompt(&state.draft),
        }
    }
}
