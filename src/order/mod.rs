//! The order conversation: steps, draft, typed actions, prompts, and the
//! state machine that ties them together.

pub mod action;
pub mod machine;
pub mod model;
pub mod prompts;
pub mod sink;
pub mod state;

pub use action::{Selection, UserAction};
pub use machine::{OrderStateMachine, StepOutcome};
pub use model::{
    ConversationId, ConversationState, OrderDraft, OrderStatus, PaginationCursor, PhotoRef,
    PrintFormat, SubmittedOrder, Submitter,
};
pub use prompts::{Prompt, PromptOption};
pub use sink::{OrderRepository, OrderSink};
pub use state::OrderStep;
