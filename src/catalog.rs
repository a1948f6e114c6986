//! Product catalog: materials and their size/price tables.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::pricing::retail_price;

/// The product base the portrait is printed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductMaterial {
    Ceramic,
    MetalOval,
    MetalRectangular,
    /// Recognized, but not orderable through the bot.
    Custom,
}

impl ProductMaterial {
    pub const ALL: [ProductMaterial; 4] = [
        Self::Ceramic,
        Self::MetalOval,
        Self::MetalRectangular,
        Self::Custom,
    ];

    /// Stable key used in selection tags and storage.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Ceramic => "ceramic",
            Self::MetalOval => "metal_oval",
            Self::MetalRectangular => "metal_rectangular",
            Self::Custom => "custom",
        }
    }

    /// Human-readable name shown to customers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ceramic => "Ceramic",
            Self::MetalOval => "Metal-ceramic (oval)",
            Self::MetalRectangular => "Metal-ceramic (rectangular)",
            Self::Custom => "Custom shape",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key() == key)
    }

    /// Match free text typed by a customer against keys and labels.
    pub fn from_text(text: &str) -> Option<Self> {
        let wanted = text.trim().to_lowercase();
        Self::ALL.into_iter().find(|m| {
            m.key() == wanted || m.label().to_lowercase() == wanted || m.key().replace('_', " ") == wanted
        })
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Custom)
    }
}

impl std::fmt::Display for ProductMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One orderable size of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEntry {
    /// Normalized label, e.g. `13x18` (centimetres).
    pub label: &'static str,
    /// Wholesale price in whole roubles.
    pub wholesale: u32,
}

impl SizeEntry {
    pub fn retail(&self) -> u32 {
        retail_price(self.wholesale)
    }
}

const fn size(label: &'static str, wholesale: u32) -> SizeEntry {
    SizeEntry { label, wholesale }
}

static CERAMIC_SIZES: &[SizeEntry] = &[
    size("9x12", 500),
    size("10x15", 600),
    size("13x18", 850),
    size("18x24", 1300),
    size("20x30", 1900),
    size("24x30", 2400),
    size("30x40", 3700),
];

static METAL_OVAL_SIZES: &[SizeEntry] = &[
    size("9x12", 550),
    size("10x15", 650),
    size("13x18", 800),
    size("18x24", 1100),
    size("20x30", 1600),
    size("24x30", 2100),
];

static METAL_RECTANGULAR_SIZES: &[SizeEntry] = &[
    size("9x12", 600),
    size("10x15", 700),
    size("13x18", 900),
    size("18x24", 1200),
    size("20x30", 1750),
    size("24x30", 2300),
    size("30x40", 3500),
];

/// Static size/price tables, keyed by material.
///
/// Lookups are always by `(material, size)`: the same label maps to
/// different prices on different materials.
#[derive(Debug, Clone, Default)]
pub struct Catalog;

impl Catalog {
    pub fn new() -> Self {
        Self
    }

    /// Ordered sizes for a material. Empty for `Custom`.
    pub fn sizes_for(&self, material: ProductMaterial) -> &'static [SizeEntry] {
        match material {
            ProductMaterial::Ceramic => CERAMIC_SIZES,
            ProductMaterial::MetalOval => METAL_OVAL_SIZES,
            ProductMaterial::MetalRectangular => METAL_RECTANGULAR_SIZES,
            ProductMaterial::Custom => &[],
        }
    }

    /// Wholesale price for a size, or `None` if the label is not offered.
    ///
    /// The label is normalized first, so `13×18` and `13 X 18` both match `13x18`.
    pub fn price_for(&self, material: ProductMaterial, size_label: &str) -> Option<u32> {
        self.entry_for(material, size_label).map(|e| e.wholesale)
    }

    /// Full entry for a size, with the label in its canonical form.
    pub fn entry_for(&self, material: ProductMaterial, size_label: &str) -> Option<SizeEntry> {
        let wanted = normalize_size_label(size_label)?;
        self.sizes_for(material)
            .iter()
            .find(|e| e.label == wanted)
            .copied()
    }
}

static SIZE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    // Latin x, Cyrillic х, multiplication sign, asterisk.
    Regex::new(r"^\s*(\d{1,4})\s*[xXхХ×*]\s*(\d{1,4})\s*(?:cm|см)?\s*$").expect("valid size regex")
});

/// Canonicalize a size label to `<w>x<h>`, or `None` if it is not a size.
pub fn normalize_size_label(raw: &str) -> Option<String> {
    let caps = SIZE_LABEL.captures(raw)?;
    let w: u32 = caps[1].parse().ok()?;
    let h: u32 = caps[2].parse().ok()?;
    Some(format!("{w}x{h}"))
}
