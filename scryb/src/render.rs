use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use scryclient::{Card, CardFace};

use crate::{
    page_select::page_options,
    surface::{Control, Embed, EmbedField, OutgoingMessage, SelectOption},
};

pub const FACE_DELIMITER: &str = "//";
pub const NO_COST: &str = "No Cost";
pub const MISSING_IMAGE_URL: &str = "https://errors.scryfall.com/missing.jpg";

const MAX_CARD_SELECTIONS: usize = 9;
const MAX_LABEL_LEN: usize = 100;
const FACE_RULE: &str = "\n------------\n";

/// Emoji ids keyed by name, e.g. `mana_w`.
#[derive(Clone, Debug, Default)]
pub struct ManaEmoji(HashMap<String, String>);

impl ManaEmoji {
    pub fn new(map: HashMap<String, String>) -> Self {
        Self(map)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read mana emoji file {}", path.display()))?;
        let map: HashMap<String, String> = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse mana emoji file {}", path.display()))?;
        Ok(Self::new(map))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Anything carrying power, toughness and cost: a card or one of its faces.
trait Stats {
    fn power(&self) -> Option<&str>;
    fn toughness(&self) -> Option<&str>;
    fn mana_cost(&self) -> Option<&str>;
}

impl Stats for Card {
    fn power(&self) -> Option<&str> {
        self.power.as_deref()
    }
    fn toughness(&self) -> Option<&str> {
        self.toughness.as_deref()
    }
    fn mana_cost(&self) -> Option<&str> {
        self.mana_cost.as_deref()
    }
}

impl Stats for CardFace {
    fn power(&self) -> Option<&str> {
        self.power.as_deref()
    }
    fn toughness(&self) -> Option<&str> {
        self.toughness.as_deref()
    }
    fn mana_cost(&self) -> Option<&str> {
        self.mana_cost.as_deref()
    }
}

fn has_no_cost(x: &impl Stats) -> bool {
    x.mana_cost().map(str::is_empty).unwrap_or(true)
}

fn format_stats(x: &impl Stats, escape_star: bool) -> Option<String> {
    let escape = |v: &str| {
        if escape_star && v == "*" {
            "\\*".to_string()
        } else {
            v.to_string()
        }
    };
    match (x.power(), x.toughness()) {
        (Some(p), Some(t)) if !p.is_empty() && !t.is_empty() => {
            Some(format!("{}/{}", escape(p), escape(t)))
        }
        _ => None,
    }
}

/// `power/toughness`, one entry per face that has them.
pub fn card_stats(card: &Card, escape_star: bool) -> String {
    if card.card_faces.is_empty() {
        return format_stats(card, escape_star).unwrap_or_default();
    }
    card.card_faces
        .iter()
        .filter_map(|face| format_stats(face, escape_star))
        .collect::<Vec<_>>()
        .join(&format!(" {} ", FACE_DELIMITER))
}

pub fn card_images(card: &Card) -> Vec<String> {
    if card.image_status.as_deref() == Some("missing") {
        return vec![MISSING_IMAGE_URL.to_string()];
    }
    // Double-faced cards carry images per face.
    if card.image_uris.is_none() && !card.card_faces.is_empty() {
        return card
            .card_faces
            .iter()
            .map(|face| {
                face.image_uris
                    .as_ref()
                    .and_then(|x| x.large.clone())
                    .unwrap_or_else(|| MISSING_IMAGE_URL.to_string())
            })
            .collect();
    }
    vec![card
        .image_uris
        .as_ref()
        .and_then(|x| x.large.clone())
        .unwrap_or_else(|| MISSING_IMAGE_URL.to_string())]
}

pub fn page_text(sub_page: usize, sub_page_count: usize) -> String {
    format!("Page {} of {}", sub_page + 1, sub_page_count)
}

fn truncate(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        return s;
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push('…');
    out
}

pub struct Renderer {
    color: u32,
    emoji: ManaEmoji,
    mana_symbol: Regex,
}

impl Renderer {
    pub fn new(color: u32, emoji: ManaEmoji) -> Result<Self> {
        Ok(Self {
            color,
            emoji,
            mana_symbol: Regex::new(r"\{(.*?)\}")?,
        })
    }

    /// Replaces `{X}` symbols with the matching `mana_x` emoji when one is
    /// known.
    pub fn insert_mana_symbols(&self, text: &str) -> String {
        self.mana_symbol
            .replace_all(text, |caps: &Captures| {
                let name = format!("mana_{}", caps[1].to_lowercase().replace('/', ""));
                match self.emoji.0.get(&name) {
                    Some(id) => format!("<:{}:{}>", name, id),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn format_cost(&self, x: &impl Stats, blank_no_cost: bool) -> String {
        if has_no_cost(x) {
            return if blank_no_cost {
                String::new()
            } else {
                NO_COST.to_string()
            };
        }
        self.insert_mana_symbols(x.mana_cost().unwrap_or_default())
    }

    pub fn mana_cost(&self, card: &Card) -> String {
        let is_land = card.type_line.to_lowercase().contains("land");
        if card.card_faces.is_empty() {
            return self.format_cost(card, is_land);
        }
        card.card_faces
            .iter()
            .filter(|face| !has_no_cost(*face))
            .map(|face| self.format_cost(face, is_land))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", FACE_DELIMITER))
    }

    pub fn oracle_text(&self, card: &Card) -> String {
        if card.card_faces.is_empty() {
            return self.insert_mana_symbols(card.oracle_text.as_deref().unwrap_or_default());
        }
        card.card_faces
            .iter()
            .map(|face| self.insert_mana_symbols(face.oracle_text.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(FACE_RULE)
    }

    fn card_field(&self, card: &Card) -> EmbedField {
        EmbedField {
            name: " ".into(),
            value: format!(
                "**[{}]({})** | [{}]({})\n{}\n{}\n{}",
                card.name,
                card.scryfall_uri,
                card.set.to_uppercase(),
                card.scryfall_set_uri,
                self.mana_cost(card),
                card.type_line,
                card_stats(card, true)
            ),
            inline: true,
        }
    }

    fn results_embed(
        &self,
        total_items: usize,
        cards: &[Card],
        sub_page: usize,
        sub_page_count: usize,
    ) -> Embed {
        Embed {
            color: Some(self.color),
            title: Some("Results:".into()),
            description: Some(format!(
                "{} card{} found",
                total_items,
                if total_items == 1 { "" } else { "s" }
            )),
            fields: cards.iter().map(|card| self.card_field(card)).collect(),
            footer: Some(page_text(sub_page, sub_page_count)),
            ..Default::default()
        }
    }

    /// The browsing menu: one sub-page of results with its controls.
    pub fn results_message(
        &self,
        total_items: usize,
        cards: &[Card],
        sub_page: usize,
        sub_page_count: usize,
    ) -> OutgoingMessage {
        let card_options = cards
            .iter()
            .enumerate()
            .map(|(i, card)| SelectOption {
                label: truncate(
                    format!("{} | {}", card.name, card.set.to_uppercase()),
                    MAX_LABEL_LEN,
                ),
                description: Some(truncate(
                    format!("{} {}", card.type_line, card_stats(card, false))
                        .trim_end()
                        .to_string(),
                    MAX_LABEL_LEN,
                )),
                value: i.to_string(),
            })
            .collect::<Vec<_>>();

        let mut controls = vec![Control::CardSelect {
            max_values: card_options.len().min(MAX_CARD_SELECTIONS),
            options: card_options,
        }];
        if sub_page_count > 1 {
            controls.push(Control::PageSelect {
                options: page_options(sub_page, sub_page_count)
                    .into_iter()
                    .map(|page| SelectOption {
                        label: format!("Page {}", page + 1),
                        description: None,
                        value: page.to_string(),
                    })
                    .collect(),
            });
        }
        controls.push(Control::Delete);

        OutgoingMessage {
            embeds: vec![self.results_embed(total_items, cards, sub_page, sub_page_count)],
            controls,
            ..Default::default()
        }
    }

    pub fn expired_message(
        &self,
        total_items: usize,
        cards: &[Card],
        sub_page: usize,
        sub_page_count: usize,
    ) -> OutgoingMessage {
        OutgoingMessage {
            content: Some("Search Expired".into()),
            embeds: vec![self.results_embed(total_items, cards, sub_page, sub_page_count)],
            files: Vec::new(),
            controls: vec![Control::Delete],
        }
    }

    pub fn detail_embed(&self, card: &Card) -> Embed {
        let title = match self.mana_cost(card) {
            cost if cost.is_empty() => card.name.clone(),
            cost => format!("{} - {}", card.name, cost),
        };
        Embed {
            color: Some(self.color),
            title: Some(title),
            description: Some(format!(
                "{}\n\n{}\n\n{}",
                card.type_line,
                self.oracle_text(card),
                card_stats(card, true)
            )),
            thumbnail: card_images(card).into_iter().next(),
            ..Default::default()
        }
    }

    /// Reply for a query with exactly one match.
    pub fn match_message(&self, card: &Card, image_only: bool) -> OutgoingMessage {
        if image_only {
            return OutgoingMessage {
                content: Some("Match Found:".into()),
                files: card_images(card),
                ..Default::default()
            };
        }
        OutgoingMessage {
            content: Some(format!("Match Found: \n<{}>", card.scryfall_uri)),
            embeds: vec![self.detail_embed(card)],
            ..Default::default()
        }
    }

    /// Reply for cards picked from the menu.
    pub fn selection_message(&self, cards: &[Card], image_only: bool) -> OutgoingMessage {
        if image_only {
            return OutgoingMessage {
                files: cards
                    .iter()
                    .filter_map(|card| card_images(card).into_iter().next())
                    .collect(),
                ..Default::default()
            };
        }
        OutgoingMessage {
            content: Some("Results:".into()),
            embeds: cards.iter().map(|card| self.detail_embed(card)).collect(),
            ..Default::default()
        }
    }
}

pub fn not_found_text() -> String {
    "Your query didn't match any cards. Adjust your search terms or refer to the syntax guide at <https://scryfall.com/docs/reference>".into()
}

pub fn error_text(details: &str) -> String {
    format!(
        "There was an error in processing your request: \"{}\"\nBut I did not crash, try again!",
        details
    )
}
