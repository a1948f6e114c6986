//! Externally hosted selectable assets (fonts, backgrounds) and paging over them.

pub mod lister;
pub mod pager;

use serde::{Deserialize, Serialize};

pub use lister::{AssetLister, HttpAssetLister, StaticAssetLister};
pub use pager::{AssetPage, AssetPager, paginate};

/// A named pool of assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Font,
    Background,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 2] = [Self::Font, Self::Background];

    /// Inverse of [`AssetCategory::collection`].
    pub fn from_collection(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.collection() == name)
    }

    /// Collection name on the asset host and in manifests.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Font => "fonts",
            Self::Background => "backgrounds",
        }
    }
}

impl std::fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Font => "font",
            Self::Background => "background",
        };
        write!(f, "{s}")
    }
}

/// One selectable asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetItem {
    /// Identifier the customer selects, unique within its category.
    pub id: String,
    /// Where the preview image can be fetched from.
    pub url: String,
}

impl AssetItem {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}
