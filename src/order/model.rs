//! Order draft, conversation state, and submitted order models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::OrderStep;
use crate::assets::{AssetCategory, AssetItem};
use crate::catalog::ProductMaterial;

/// Stable identity of one conversation (a Telegram chat id, "cli", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Who is placing the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    pub id: String,
    pub display_name: String,
}

impl Submitter {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// How the portrait and text are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintFormat {
    PortraitWithText,
    PortraitWithoutText,
    TextOnly,
}

impl PrintFormat {
    pub const ALL: [PrintFormat; 3] = [
        Self::PortraitWithText,
        Self::PortraitWithoutText,
        Self::TextOnly,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::PortraitWithText => "portrait_with_text",
            Self::PortraitWithoutText => "portrait_without_text",
            Self::TextOnly => "text_only",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PortraitWithText => "Portrait with text",
            Self::PortraitWithoutText => "Portrait only",
            Self::TextOnly => "Text only",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn from_text(text: &str) -> Option<Self> {
        let wanted = text.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.key() == wanted || f.label().to_lowercase() == wanted)
    }

    /// Whether font, personal text and background have to be collected.
    pub fn requires_text(&self) -> bool {
        !matches!(self, Self::PortraitWithoutText)
    }
}

impl std::fmt::Display for PrintFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Reference to an uploaded image. The bytes stay with the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl PhotoRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: None,
        }
    }
}

/// The order being assembled. Fields fill in step order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<ProductMaterial>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Derived from the catalog when the size is chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retail_price: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<PrintFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoRef>,
}

impl OrderDraft {
    /// Render every recorded field, one per line.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if let Some(material) = self.material {
            lines.push(format!("Product: {}", material.label()));
        }
        if let Some(ref size) = self.size {
            lines.push(format!("Size: {size} cm"));
        }
        if let Some(price) = self.retail_price {
            lines.push(format!("Price: {price} ₽"));
        }
        if let Some(format) = self.format {
            lines.push(format!("Format: {}", format.label()));
        }
        if let Some(ref font) = self.font {
            lines.push(format!("Font: {font}"));
        }
        if let Some(ref text) = self.personal_text {
            lines.push(format!("Text: {text}"));
        }
        if let Some(ref background) = self.background {
            lines.push(format!("Background: {background}"));
        }
        if self.photo.is_some() {
            lines.push("Photo: attached".to_string());
        }
        lines.join("\n")
    }

    /// Build the order to hand to the sink, or `None` if a field the chosen
    /// format needs is still missing.
    pub fn finalize(&self, submitter: &Submitter, at: DateTime<Utc>) -> Option<SubmittedOrder> {
        let format = self.format?;
        if format.requires_text()
            && (self.font.is_none()
                || self.personal_text.is_none()
                || self.background.is_none()
                || self.photo.is_none())
        {
            return None;
        }

        let id = Uuid::new_v4();
        Some(SubmittedOrder {
            id,
            order_number: order_number(at, &id),
            submitter_id: submitter.id.clone(),
            submitter_name: submitter.display_name.clone(),
            material: self.material?,
            size: self.size.clone()?,
            retail_price: self.retail_price?,
            format,
            font: self.font.clone(),
            personal_text: self.personal_text.clone(),
            background: self.background.clone(),
            photo: self.photo.clone(),
            status: OrderStatus::Pending,
            submitted_at: at,
            updated_at: at,
        })
    }
}

/// Human-facing order number, e.g. `ORD-1760000000000-3F2A9C01`.
///
/// The suffix comes from the order id so two orders stamped in the same
/// millisecond still get distinct numbers.
pub fn order_number(at: DateTime<Utc>, id: &Uuid) -> String {
    let simple = id.simple().to_string().to_uppercase();
    format!("ORD-{}-{}", at.timestamp_millis(), &simple[..8])
}

/// Asset identifiers already shown in the current browsing sub-session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationCursor {
    pub category: AssetCategory,
    #[serde(default)]
    pub shown: BTreeSet<String>,
}

impl PaginationCursor {
    pub fn new(category: AssetCategory) -> Self {
        Self {
            category,
            shown: BTreeSet::new(),
        }
    }

    pub fn mark_shown(&mut self, items: &[AssetItem]) {
        self.shown.extend(items.iter().map(|i| i.id.clone()));
    }

    pub fn has_shown(&self, category: AssetCategory, id: &str) -> bool {
        self.category == category && self.shown.contains(id)
    }
}

/// Everything remembered about one conversation between turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub step: OrderStep,
    #[serde(default)]
    pub draft: OrderDraft,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<PaginationCursor>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            step: OrderStep::default(),
            draft: OrderDraft::default(),
            cursor: None,
            updated_at: Utc::now(),
        }
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `target`. Panics in debug builds on a transition the step
    /// table does not allow.
    pub fn enter(&mut self, target: OrderStep) {
        debug_assert!(
            self.step.can_transition_to(target),
            "invalid order transition {} -> {}",
            self.step,
            target
        );
        self.step = target;
    }

    /// Cursor for `category`, replacing one left over from another category.
    pub fn cursor_for(&mut self, category: AssetCategory) -> &mut PaginationCursor {
        let cursor = self
            .cursor
            .get_or_insert_with(|| PaginationCursor::new(category));
        if cursor.category != category {
            *cursor = PaginationCursor::new(category);
        }
        cursor
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Lifecycle of a persisted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Ready)
                | (Processing, Cancelled)
                | (Ready, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// A confirmed order as handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedOrder {
    pub id: Uuid,
    pub order_number: String,
    pub submitter_id: String,
    pub submitter_name: String,
    pub material: ProductMaterial,
    pub size: String,
    pub retail_price: u32,
    pub format: PrintFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoRef>,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
