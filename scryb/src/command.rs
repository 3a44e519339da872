use anyhow::Result;
use regex::Regex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Search { query: String, image_only: bool },
}

pub struct CommandParser {
    key_phrase: String,
    search: Regex,
}

impl CommandParser {
    pub fn new(key_phrase: &str) -> Result<Self> {
        let key_phrase = key_phrase.trim().to_lowercase();
        if key_phrase.is_empty() {
            anyhow::bail!("key phrase must not be empty");
        }
        let search = Regex::new(&format!(r"(?s)^{}(!)?(.*)$", regex::escape(&key_phrase)))?;
        Ok(Self { key_phrase, search })
    }

    pub fn parse(&self, content: &str) -> Option<Command> {
        let lower = content.trim().to_lowercase();

        let mut words = lower.split_whitespace();
        let first = words.next()?;
        if first == format!("{}?", self.key_phrase) {
            return Some(Command::Help);
        }
        if first == self.key_phrase {
            if let Some("?" | "h" | "help") = words.next() {
                return Some(Command::Help);
            }
        }

        let caps = self.search.captures(&lower)?;
        let query = caps.get(2).map(|x| x.as_str().trim()).unwrap_or_default();
        if query.is_empty() {
            return None;
        }
        Some(Command::Search {
            query: query.to_string(),
            image_only: caps.get(1).is_some(),
        })
    }
}

pub fn help_text(key_phrase: &str, timeout_secs: u64) -> String {
    format!(
        "Search scryfall by typing \"{kp} \" followed by any valid scryfall search syntax, which defaults to searching card names.\n\
         Find the syntax here: https://scryfall.com/docs/syntax.\n\
         \"{kp}! \" will return a full art response rather than an embed.\n\
         If there are multiple results, you will be presented with a select to choose the card you want details on that will expire after {timeout} seconds.",
        kp = key_phrase,
        timeout = timeout_secs
    )
}
