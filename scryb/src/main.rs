mod command;
mod console;
mod driver;
mod page_select;
mod render;
mod session;
mod source;
mod surface;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use console::ConsoleSurface;
use driver::{BotConfig, Event, SessionDriver};
use render::{ManaEmoji, Renderer};
use scrycache::{Paginator, WindowGeometry, ITEMS_PER_PAGE, ITEMS_PER_SUB_PAGE};
use scryclient::{CardSearchClient, CardSearchClientConfig};
use source::ScryfallSource;
use structopt::StructOpt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};
use url::Url;

const EMBED_COLOR: u32 = 0xFFFC30;

#[derive(Debug, StructOpt)]
#[structopt(name = "scryb", about = "card search bot")]
struct Opt {
    /// Card search endpoint.
    #[structopt(
        long,
        default_value = "https://api.scryfall.com/cards/search",
        env = "SCRYB_SEARCH_ENDPOINT"
    )]
    search_endpoint: Url,

    /// Prefix that marks a message as a command.
    #[structopt(long, default_value = "scryb", env = "SCRYB_KEY_PHRASE")]
    key_phrase: String,

    /// Seconds a selection menu stays usable after its last page change.
    #[structopt(long, default_value = "30", env = "SCRYB_SELECT_TIMEOUT_SECS")]
    select_timeout_secs: u64,

    /// Seconds an expired menu still answers its delete control.
    #[structopt(long, default_value = "3600", env = "SCRYB_EXPIRED_GRACE_SECS")]
    expired_grace_secs: u64,

    /// Page size of the search endpoint.
    #[structopt(long, default_value = "175", env = "SCRYB_ITEMS_PER_PAGE")]
    items_per_page: usize,

    /// Cards shown per menu page.
    #[structopt(long, default_value = "9", env = "SCRYB_ITEMS_PER_SUB_PAGE")]
    items_per_sub_page: usize,

    /// HTTP attempts per page, including the first one.
    #[structopt(long, default_value = "5", env = "SCRYB_MAX_ATTEMPTS")]
    max_attempts: usize,

    /// User agent sent to the search endpoint.
    #[structopt(long, env = "SCRYB_USER_AGENT")]
    user_agent: Option<String>,

    /// JSON file mapping mana emoji names to ids.
    #[structopt(long, env = "SCRYB_MANA_EMOJI")]
    mana_emoji: Option<PathBuf>,

    /// Send selection menus as direct messages.
    #[structopt(long)]
    private_select: bool,

    /// Output log in JSON format.
    #[structopt(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::from_args();

    if opt.json {
        SubscriberBuilder::default()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        SubscriberBuilder::default()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .pretty()
            .init();
    }

    let geometry = WindowGeometry::new(opt.items_per_page, opt.items_per_sub_page)
        .with_context(|| "invalid window geometry")?;
    if geometry.items_per_page() != ITEMS_PER_PAGE
        || geometry.items_per_sub_page() != ITEMS_PER_SUB_PAGE
    {
        tracing::warn!(
            items_per_page = geometry.items_per_page(),
            items_per_sub_page = geometry.items_per_sub_page(),
            "using non-default window geometry"
        );
    }

    let client = CardSearchClient::new(
        CardSearchClientConfig {
            search_endpoint: opt.search_endpoint.clone(),
            user_agent: opt
                .user_agent
                .clone()
                .unwrap_or_else(|| format!("scryb/{}", env!("CARGO_PKG_VERSION"))),
            max_attempts: opt.max_attempts,
        },
        reqwest_client()?,
    )?;
    let paginator = Arc::new(Paginator::new(ScryfallSource::new(client), geometry));

    let emoji = match &opt.mana_emoji {
        Some(path) => ManaEmoji::load(path)?,
        None => ManaEmoji::default(),
    };
    tracing::info!(count = emoji.len(), "loaded mana emoji");
    let renderer = Renderer::new(EMBED_COLOR, emoji)?;

    let surface = Arc::new(ConsoleSurface::default());
    let driver = SessionDriver::new(
        BotConfig {
            key_phrase: opt.key_phrase.clone(),
            select_timeout: Duration::from_secs(opt.select_timeout_secs),
            private_select: opt.private_select,
            expired_grace: Duration::from_secs(opt.expired_grace_secs),
        },
        surface.clone(),
        paginator,
        renderer,
    )?;
    let tx = driver.sender();
    let driver_task = tokio::spawn(driver.run());

    tracing::info!(key_phrase = %opt.key_phrase, endpoint = %opt.search_endpoint, "bot started");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(event) = surface.parse_line(&line) {
            if tx.send(event).is_err() {
                break;
            }
        }
    }

    let _ = tx.send(Event::Shutdown);
    driver_task.await?;
    Ok(())
}

fn reqwest_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?)
}
