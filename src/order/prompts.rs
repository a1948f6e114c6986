//! Outbound prompts and every customer-facing text of the order flow.

use serde::Serialize;

use crate::assets::{AssetCategory, AssetItem, AssetPage};
use crate::catalog::{ProductMaterial, SizeEntry};

use super::action::Selection;
use super::model::{OrderDraft, PrintFormat, SubmittedOrder};

/// One selectable option under a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptOption {
    pub label: String,
    #[serde(serialize_with = "serialize_selection")]
    pub selection: Selection,
}

fn serialize_selection<S: serde::Serializer>(s: &Selection, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&s.to_tag())
}

impl PromptOption {
    pub fn new(label: impl Into<String>, selection: Selection) -> Self {
        Self {
            label: label.into(),
            selection,
        }
    }

    pub fn tag(&self) -> String {
        self.selection.to_tag()
    }
}

/// A message for the customer: text, optional options, optional image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<PromptOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: Vec::new(),
            image_url: None,
        }
    }

    pub fn with_option(mut self, label: impl Into<String>, selection: Selection) -> Self {
        self.options.push(PromptOption::new(label, selection));
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

pub fn greeting() -> Prompt {
    Prompt::text("Hello! Let's put together your memorial portrait order.")
}

pub fn material_prompt() -> Prompt {
    ProductMaterial::ALL.into_iter().fold(
        Prompt::text("Choose the product material:"),
        |p, m| p.with_option(m.label(), Selection::Material(m)),
    )
}

pub fn size_prompt(material: ProductMaterial, sizes: &[SizeEntry]) -> Prompt {
    sizes.iter().fold(
        Prompt::text(format!("{}: choose a size (cm):", material.label())),
        |p, s| {
            p.with_option(
                format!("{} cm, {} ₽", s.label, s.retail()),
                Selection::Size(s.label.to_string()),
            )
        },
    )
}

pub fn format_prompt(draft: &OrderDraft) -> Prompt {
    let text = match (&draft.size, draft.retail_price) {
        (Some(size), Some(price)) => {
            format!("Size {size} cm, price {price} ₽.\nChoose the print format:")
        }
        _ => "Choose the print format:".to_string(),
    };
    PrintFormat::ALL
        .into_iter()
        .fold(Prompt::text(text), |p, f| p.with_option(f.label(), Selection::Format(f)))
}

/// One prompt per asset with its preview and a select option, then a
/// "Show more" prompt when unseen items remain.
pub fn asset_page(category: AssetCategory, page: &AssetPage) -> Vec<Prompt> {
    let mut prompts: Vec<Prompt> = page
        .items
        .iter()
        .map(|item| asset_prompt(category, item))
        .collect();
    if page.has_more {
        prompts.push(
            Prompt::text(format!("Want to see more {category}s?"))
                .with_option("Show more", Selection::ShowMore(category)),
        );
    }
    prompts
}

fn asset_prompt(category: AssetCategory, item: &AssetItem) -> Prompt {
    Prompt::text(format!("{}: {}", capitalize(&category.to_string()), item.id))
        .with_image(&item.url)
        .with_option(
            "Choose",
            Selection::Asset {
                category,
                id: item.id.clone(),
            },
        )
}

pub fn browse_hint(category: AssetCategory) -> Prompt {
    Prompt::text(format!("Pick a {category} from the options above."))
        .with_option("Show more", Selection::ShowMore(category))
}

pub fn no_items(category: AssetCategory) -> Prompt {
    Prompt::text(format!(
        "No {category}s are available at the moment. Try again shortly or send /start."
    ))
    .with_option("Try again", Selection::ShowMore(category))
}

pub fn no_more_items(category: AssetCategory) -> Prompt {
    Prompt::text(format!(
        "That's every {category} we have. Please pick one of those shown."
    ))
}

pub fn assets_unavailable(category: AssetCategory) -> Prompt {
    Prompt::text(format!("The {category} gallery is not available right now."))
        .with_option("Show more", Selection::ShowMore(category))
}

pub fn personal_text_prompt() -> Prompt {
    Prompt::text("Send the text for the portrait (name, dates, epitaph).")
}

pub fn photo_prompt() -> Prompt {
    Prompt::text("Now send the photo for the portrait.")
}

pub fn confirmation_prompt(draft: &OrderDraft) -> Prompt {
    Prompt::text(format!("Please check your order:\n\n{}", draft.summary()))
        .with_option("Confirm", Selection::Confirm)
}

pub fn submitted(order: &SubmittedOrder) -> Prompt {
    Prompt::text(format!(
        "Thank you! Your order {} has been received. We will contact you soon.",
        order.order_number
    ))
}

pub fn unsupported_material() -> Prompt {
    Prompt::text(
        "Custom shapes are made to order. Please contact us directly to discuss it. Send /start to begin a new order.",
    )
}

/// Ends a conversation after a catalog miss.
pub fn abandoned(reason: &str) -> Prompt {
    Prompt::text(format!("{reason} Send /start to begin a new order."))
}

pub fn state_not_saved() -> Prompt {
    Prompt::text("We could not save your progress. If the next step fails, send /start.")
}

// Notices shown above a re-prompt.

pub fn unexpected_input() -> String {
    "Sorry, I didn't get that.".to_string()
}

pub fn unknown_material() -> String {
    "Sorry, we don't offer that material.".to_string()
}

pub fn unknown_size(label: &str) -> String {
    format!("Sorry, size {label} is not available for this material.")
}

pub fn empty_text() -> String {
    "The text can't be empty.".to_string()
}

pub fn text_expected() -> String {
    "Please send the text as a message.".to_string()
}

pub fn photo_expected() -> String {
    "Please send an image.".to_string()
}

pub fn not_shown(category: AssetCategory) -> String {
    format!("Please choose a {category} from the ones shown.")
}

pub fn confirm_expected() -> String {
    "Press Confirm to place the order, or send /start to begin again.".to_string()
}

pub fn submit_failed() -> String {
    "We could not record your order just now. Your choices are saved; press Confirm to try again."
        .to_string()
}

/// Text sent to the admin chat for a new order.
pub fn admin_notification(order: &SubmittedOrder) -> String {
    let mut lines = vec![
        format!("New order {}", order.order_number),
        format!("Customer: {} ({})", order.submitter_name, order.submitter_id),
        format!("Product: {}", order.material.label()),
        format!("Size: {} cm", order.size),
        format!("Price: {} ₽", order.retail_price),
        format!("Format: {}", order.format.label()),
    ];
    if let Some(ref font) = order.font {
        lines.push(format!("Font: {font}"));
    }
    if let Some(ref text) = order.personal_text {
        lines.push(format!("Text: {text}"));
    }
    if let Some(ref background) = order.background {
        lines.push(format!("Background: {background}"));
    }
    if let Some(ref photo) = order.photo {
        lines.push(format!("Photo: {}", photo.file_id));
    }
    lines.push(format!(
        "Submitted: {}",
        order.submitted_at.format("%Y-%m-%d %H:%M UTC")
    ));
    lines.join("\n")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::catalog::Catalog;
    use crate::order::model::{PhotoRef, Submitter};

    #[test]
    fn material_prompt_offers_every_material() {
        let p = material_prompt();
        let tags: Vec<String> = p.options.iter().map(|o| o.tag()).collect();
        assert_eq!(
            tags,
            [
                "material:ceramic",
                "material:metal_oval",
                "material:metal_rectangular",
                "material:custom"
            ]
        );
    }

    #[test]
    fn size_prompt_shows_retail_prices() {
        let catalog = Catalog::new();
        let p = size_prompt(
            ProductMaterial::MetalOval,
            catalog.sizes_for(ProductMaterial::MetalOval),
        );
        let option = p.options.iter().find(|o| o.tag() == "size:18x24").unwrap();
        assert_eq!(option.label, "18x24 cm, 1400 ₽");
    }

    #[test]
    fn asset_page_has_show_more_only_when_more_remain() {
        let page = AssetPage {
            items: vec![AssetItem::new("a", "https://cdn.test/a.png")],
            has_more: true,
        };
        let prompts = asset_page(AssetCategory::Font, &page);
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].image_url.as_deref(), Some("https://cdn.test/a.png"));
        assert_eq!(prompts[0].options[0].tag(), "font:a");
        assert_eq!(prompts[1].options[0].tag(), "more:font");

        let last = AssetPage {
            has_more: false,
            ..page
        };
        assert_eq!(asset_page(AssetCategory::Font, &last).len(), 1);
    }

    #[test]
    fn unavailable_prompts_offer_retry() {
        for p in [
            no_items(AssetCategory::Background),
            assets_unavailable(AssetCategory::Background),
        ] {
            assert_eq!(p.options[0].selection, Selection::ShowMore(AssetCategory::Background));
        }
    }

    #[test]
    fn admin_notification_lists_order_fields() {
        let draft = OrderDraft {
            material: Some(ProductMaterial::Ceramic),
            size: Some("13x18".into()),
            retail_price: Some(1100),
            format: Some(PrintFormat::TextOnly),
            font: Some("serif".into()),
            personal_text: Some("Forever".into()),
            background: Some("marble".into()),
            photo: Some(PhotoRef::new("photo-1")),
        };
        let order = draft
            .finalize(&Submitter::new("7", "Bob"), Utc::now())
            .unwrap();
        let text = admin_notification(&order);
        for needle in [
            order.order_number.as_str(),
            "Bob (7)",
            "Ceramic",
            "13x18",
            "1100 ₽",
            "serif",
            "Forever",
            "marble",
            "photo-1",
        ] {
            assert!(text.contains(needle), "missing {needle}: {text}");
        }
    }

    #[test]
    fn prompt_serializes_tags() {
        let p = Prompt::text("x").with_option("Confirm", Selection::Confirm);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["options"][0]["selection"], "confirm");
        assert!(json.get("image_url").is_none());
    }
}
