use serde::{Deserialize, Serialize};

/// One page of search results.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CardList {
    pub object: String,
    #[serde(default)]
    pub has_more: bool,
    pub next_page: Option<String>,
    pub total_cards: Option<usize>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub data: Vec<Card>,
}

impl CardList {
    pub fn total(&self) -> usize {
        self.total_cards.unwrap_or(self.data.len())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Card {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub set: String,
    #[serde(default)]
    pub type_line: String,
    pub mana_cost: Option<String>,
    pub oracle_text: Option<String>,
    pub power: Option<String>,
    pub toughness: Option<String>,
    #[serde(default)]
    pub card_faces: Vec<CardFace>,
    pub image_uris: Option<ImageUris>,
    pub image_status: Option<String>,
    #[serde(default)]
    pub scryfall_uri: String,
    #[serde(default)]
    pub scryfall_set_uri: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CardFace {
    #[serde(default)]
    pub name: String,
    pub type_line: Option<String>,
    pub mana_cost: Option<String>,
    pub oracle_text: Option<String>,
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub image_uris: Option<ImageUris>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ImageUris {
    pub small: Option<String>,
    pub normal: Option<String>,
    pub large: Option<String>,
    pub png: Option<String>,
    pub art_crop: Option<String>,
}

/// Error body returned alongside non-success statuses.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "object": "list",
        "total_cards": 412,
        "has_more": true,
        "next_page": "https://api.scryfall.com/cards/search?page=2&q=goblin",
        "data": [
            {
                "object": "card",
                "id": "a1",
                "name": "Goblin Guide",
                "set": "zen",
                "type_line": "Creature — Goblin Scout",
                "mana_cost": "{R}",
                "oracle_text": "Haste",
                "power": "2",
                "toughness": "2",
                "image_uris": { "large": "https://img/large.jpg" },
                "scryfall_uri": "https://scryfall.com/card/zen/126",
                "scryfall_set_uri": "https://scryfall.com/sets/zen"
            },
            {
                "object": "card",
                "name": "Delver of Secrets // Insectile Aberration",
                "set": "isd",
                "type_line": "Creature — Human Wizard // Creature — Human Insect",
                "card_faces": [
                    { "name": "Delver of Secrets", "mana_cost": "{U}", "power": "1", "toughness": "1" },
                    { "name": "Insectile Aberration", "mana_cost": "", "power": "3", "toughness": "2" }
                ]
            }
        ]
    }"#;

    #[test]
    fn decodes_search_page() {
        let list: CardList = serde_json::from_str(PAGE).unwrap();
        assert_eq!(list.total(), 412);
        assert!(list.has_more);
        assert_eq!(list.data.len(), 2);
        assert_eq!(list.data[0].mana_cost.as_deref(), Some("{R}"));
        assert_eq!(list.data[1].card_faces.len(), 2);
        assert!(list.data[1].image_uris.is_none());
    }

    #[test]
    fn total_falls_back_to_data_length() {
        let list: CardList =
            serde_json::from_str(r#"{"object":"list","has_more":false,"data":[{"name":"Opt"}]}"#)
                .unwrap();
        assert_eq!(list.total(), 1);
    }
}
