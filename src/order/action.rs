//! Typed inbound actions. Transports decode callback tags here once and the
//! machine only ever sees `Selection` values.

use crate::assets::AssetCategory;
use crate::catalog::ProductMaterial;

use super::model::{PhotoRef, PrintFormat};

/// A choice made by pressing one of the offered options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Material(ProductMaterial),
    /// Size label as offered, e.g. `13x18`.
    Size(String),
    Format(PrintFormat),
    /// Ask for the next page of a browsed asset category.
    ShowMore(AssetCategory),
    Asset {
        category: AssetCategory,
        id: String,
    },
    Confirm,
    /// A tag that does not decode into any known selection.
    Unrecognized(String),
}

impl Selection {
    /// Encode as a callback tag.
    pub fn to_tag(&self) -> String {
        match self {
            Self::Material(m) => format!("material:{}", m.key()),
            Self::Size(label) => format!("size:{label}"),
            Self::Format(f) => format!("format:{}", f.key()),
            Self::ShowMore(c) => format!("more:{c}"),
            Self::Asset { category, id } => format!("{category}:{id}"),
            Self::Confirm => "confirm".to_string(),
            Self::Unrecognized(raw) => raw.clone(),
        }
    }

    /// Decode a callback tag. Never fails; unknown tags become `Unrecognized`.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "confirm" {
            return Self::Confirm;
        }

        let unrecognized = || Self::Unrecognized(tag.to_string());
        let Some((kind, value)) = tag.split_once(':') else {
            return unrecognized();
        };
        if value.is_empty() {
            return unrecognized();
        }

        match kind {
            "material" => ProductMaterial::from_key(value)
                .map(Self::Material)
                .unwrap_or_else(unrecognized),
            "size" => Self::Size(value.to_string()),
            "format" => PrintFormat::from_key(value)
                .map(Self::Format)
                .unwrap_or_else(unrecognized),
            "more" => parse_category(value)
                .map(Self::ShowMore)
                .unwrap_or_else(unrecognized),
            other => match parse_category(other) {
                Some(category) => Self::Asset {
                    category,
                    id: value.to_string(),
                },
                None => unrecognized(),
            },
        }
    }
}

fn parse_category(s: &str) -> Option<AssetCategory> {
    match s {
        "font" => Some(AssetCategory::Font),
        "background" => Some(AssetCategory::Background),
        _ => None,
    }
}

/// One inbound turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// The `/start` command.
    Start,
    Select(Selection),
    Text(String),
    Image(PhotoRef),
    /// Anything else the transport received (sticker, voice, ...).
    Unsupported(String),
}

impl UserAction {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Select(_) => "select",
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Unsupported(_) => "unsupported",
        }
    }
}
