use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Result;
use scrycache::{FirstWindow, PageSource, Paginator, QueryKey, Window};
use scryclient::{Card, StatusCodeError};
use tokio::sync::mpsc;

use crate::{
    command::{help_text, Command, CommandParser},
    render::{error_text, not_found_text, Renderer},
    session::{SelectionSession, SessionOrigin},
    surface::{
        Destination, IncomingMessage, Interaction, InteractionKind, MessageId, OutgoingMessage,
        Surface, UserId,
    },
};

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub key_phrase: String,
    pub select_timeout: Duration,
    /// Send menus to the author directly instead of the channel.
    pub private_select: bool,
    /// How long an expired menu keeps answering its delete control.
    pub expired_grace: Duration,
}

/// A search with more than one match, ready to become a menu.
pub struct SearchHit {
    msg: IncomingMessage,
    query: QueryKey,
    first: FirstWindow<Card>,
    image_only: bool,
}

pub enum Event {
    Message(IncomingMessage),
    Interaction(Interaction),
    Found(SearchHit),
    Expire {
        menu: MessageId,
        timer: u64,
    },
    Forget {
        menu: MessageId,
    },
    WindowReady {
        menu: MessageId,
        seq: u64,
        sub_page: usize,
        result: Result<Window<Card>>,
    },
    Shutdown,
}

struct Shared<S, P: PageSource> {
    config: BotConfig,
    surface: Arc<S>,
    paginator: Arc<Paginator<P>>,
    renderer: Renderer,
    parser: CommandParser,
}

/// What is left of a session after it expires: enough to honour delete.
struct ExpiredMenu {
    owner: UserId,
    destination: Destination,
}

/// Applies events one at a time. Searches and window fetches run as
/// spawned tasks and report back through the same queue. Menus are sent from
/// the driver itself, so a session exists before any interaction with its
/// menu can be applied.
pub struct SessionDriver<S, P: PageSource> {
    shared: Arc<Shared<S, P>>,
    sessions: HashMap<MessageId, SelectionSession>,
    expired: HashMap<MessageId, ExpiredMenu>,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

fn find_status(e: &anyhow::Error) -> Option<&StatusCodeError> {
    e.chain().find_map(|x| x.downcast_ref::<StatusCodeError>())
}

fn schedule(tx: mpsc::UnboundedSender<Event>, after: Duration, event: Event) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = tx.send(event);
    });
}

impl<S: Surface, P: PageSource<Item = Card>> SessionDriver<S, P> {
    pub fn new(
        config: BotConfig,
        surface: Arc<S>,
        paginator: Arc<Paginator<P>>,
        renderer: Renderer,
    ) -> Result<Self> {
        let parser = CommandParser::new(&config.key_phrase)?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                surface,
                paginator,
                renderer,
                parser,
            }),
            sessions: HashMap::new(),
            expired: HashMap::new(),
            tx,
            rx,
        })
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    #[cfg(test)]
    pub fn session(&self, menu: &MessageId) -> Option<&SelectionSession> {
        self.sessions.get(menu)
    }

    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }

    #[cfg(test)]
    pub async fn next_event(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            if let Event::Shutdown = event {
                break;
            }
            self.dispatch(event).await;
        }
        tracing::info!(
            sessions = self.sessions.len(),
            expired = self.expired.len(),
            "session driver stopped"
        );
    }

    pub async fn dispatch(&mut self, event: Event) {
        match event {
            Event::Message(msg) => self.on_message(msg).await,
            Event::Interaction(interaction) => self.on_interaction(interaction).await,
            Event::Found(hit) => self.on_found(hit).await,
            Event::Expire { menu, timer } => self.on_expire(menu, timer).await,
            Event::Forget { menu } => {
                if self.expired.remove(&menu).is_some() {
                    tracing::debug!(menu = %menu, "forgot expired menu");
                }
            }
            Event::WindowReady {
                menu,
                seq,
                sub_page,
                result,
            } => self.on_window(menu, seq, sub_page, result).await,
            Event::Shutdown => {}
        }
    }

    async fn on_message(&mut self, msg: IncomingMessage) {
        if msg.author_is_bot {
            return;
        }
        let command = match self.shared.parser.parse(&msg.content) {
            Some(x) => x,
            None => return,
        };

        match command {
            Command::Help => {
                let text = help_text(
                    &self.shared.config.key_phrase,
                    self.shared.config.select_timeout.as_secs(),
                );
                let channel = Destination::Channel(msg.channel.clone());
                if let Err(e) = self
                    .shared
                    .surface
                    .send(&channel, Some(&msg.id), OutgoingMessage::text(text))
                    .await
                {
                    tracing::error!(error = %e, "failed to send help");
                }
            }
            Command::Search { query, image_only } => {
                let shared = self.shared.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    match shared.search(msg, query, image_only).await {
                        Ok(Some(hit)) => {
                            let _ = tx.send(Event::Found(hit));
                        }
                        Ok(None) => {}
                        Err(e) => tracing::error!(error = %e, "search failed"),
                    }
                });
            }
        }
    }

    async fn on_found(&mut self, hit: SearchHit) {
        let SearchHit {
            msg,
            query,
            first,
            image_only,
        } = hit;
        let channel = Destination::Channel(msg.channel.clone());
        let (menu_destination, reply_to) = if self.shared.config.private_select {
            (Destination::Direct(msg.author.clone()), None)
        } else {
            (channel.clone(), Some(&msg.id))
        };
        let menu_msg = self.shared.renderer.results_message(
            first.total_items,
            &first.items,
            0,
            first.sub_page_count,
        );
        let menu = match self
            .shared
            .surface
            .send(&menu_destination, reply_to, menu_msg)
            .await
        {
            Ok(x) => x,
            Err(e) => {
                tracing::error!(error = %e, query = %query, "failed to send menu");
                return;
            }
        };

        let mut session = SelectionSession::new(
            SessionOrigin {
                owner: msg.author.clone(),
                channel,
                message: msg.id.clone(),
                menu_destination,
                menu: menu.clone(),
            },
            query,
            first.total_items,
            first.sub_page_count,
            first.items,
            image_only,
        );
        let timer = session.arm_timer();
        tracing::info!(menu = %menu, query = %session.query(), "session opened");
        schedule(
            self.tx.clone(),
            self.shared.config.select_timeout,
            Event::Expire {
                menu: menu.clone(),
                timer,
            },
        );
        self.sessions.insert(menu, session);
    }

    async fn on_interaction(&mut self, interaction: Interaction) {
        let session = match self.sessions.get_mut(&interaction.message) {
            Some(x) => x,
            None => {
                self.on_expired_interaction(interaction).await;
                return;
            }
        };
        if !session.is_owner(&interaction.user) {
            tracing::debug!(
                menu = %interaction.message,
                user = %interaction.user,
                "ignoring interaction from another user"
            );
            return;
        }

        let surface = &self.shared.surface;
        match interaction.kind {
            InteractionKind::CardSelect(values) => {
                let cards = match session.select_cards(&values) {
                    Some(x) => x,
                    None => return,
                };
                let origin = session.origin().clone();
                let msg = self
                    .shared
                    .renderer
                    .selection_message(&cards, session.image_only());
                self.sessions.remove(&interaction.message);
                tracing::info!(menu = %origin.menu, selected = cards.len(), "cards selected");

                if let Err(e) = surface.send(&origin.channel, Some(&origin.message), msg).await {
                    tracing::error!(error = %e, "failed to send selected cards");
                }
                if let Err(e) = surface.delete(&origin.menu_destination, &origin.menu).await {
                    tracing::warn!(error = %e, "failed to delete menu");
                }
            }
            InteractionKind::PageSelect(value) => {
                let req = match session.request_page(&value) {
                    Some(x) => x,
                    None => return,
                };
                let menu = interaction.message.clone();
                schedule(
                    self.tx.clone(),
                    self.shared.config.select_timeout,
                    Event::Expire {
                        menu: menu.clone(),
                        timer: req.timer,
                    },
                );

                let shared = self.shared.clone();
                let tx = self.tx.clone();
                let query: QueryKey = session.query().clone();
                let total_items = session.total_items();
                tracing::debug!(menu = %menu, sub_page = req.sub_page, seq = req.seq, "page requested");
                tokio::spawn(async move {
                    let result = shared
                        .paginator
                        .window(req.sub_page, &query, total_items)
                        .await;
                    let _ = tx.send(Event::WindowReady {
                        menu,
                        seq: req.seq,
                        sub_page: req.sub_page,
                        result,
                    });
                });
            }
            InteractionKind::Delete => {
                if !session.delete() {
                    return;
                }
                let origin = session.origin().clone();
                self.sessions.remove(&interaction.message);
                tracing::info!(menu = %origin.menu, "menu deleted");
                if let Err(e) = surface.delete(&origin.menu_destination, &origin.menu).await {
                    tracing::warn!(error = %e, "failed to delete menu");
                }
            }
        }
    }

    async fn on_expired_interaction(&mut self, interaction: Interaction) {
        let record = match self.expired.get(&interaction.message) {
            Some(x) => x,
            None => {
                tracing::debug!(menu = %interaction.message, "interaction for unknown menu");
                return;
            }
        };
        if record.owner != interaction.user || interaction.kind != InteractionKind::Delete {
            return;
        }
        let destination = record.destination.clone();
        self.expired.remove(&interaction.message);
        tracing::info!(menu = %interaction.message, "expired menu deleted");
        if let Err(e) = self
            .shared
            .surface
            .delete(&destination, &interaction.message)
            .await
        {
            tracing::warn!(error = %e, "failed to delete menu");
        }
    }

    /// Strips the menu down to its delete control and drops the session,
    /// keeping only what delete needs until the grace period ends.
    async fn on_expire(&mut self, menu: MessageId, timer: u64) {
        let session = match self.sessions.get_mut(&menu) {
            Some(x) => x,
            None => return,
        };
        if !session.expire(timer) {
            return;
        }
        tracing::info!(menu = %menu, "session expired");
        let msg = self.shared.renderer.expired_message(
            session.total_items(),
            session.cards(),
            session.sub_page(),
            session.sub_page_count(),
        );
        let record = ExpiredMenu {
            owner: session.origin().owner.clone(),
            destination: session.origin().menu_destination.clone(),
        };
        self.sessions.remove(&menu);

        if let Err(e) = self
            .shared
            .surface
            .edit(&record.destination, &menu, msg)
            .await
        {
            tracing::warn!(error = %e, "failed to strip expired menu");
        }
        self.expired.insert(menu.clone(), record);
        schedule(
            self.tx.clone(),
            self.shared.config.expired_grace,
            Event::Forget { menu },
        );
    }

    async fn on_window(
        &mut self,
        menu: MessageId,
        seq: u64,
        sub_page: usize,
        result: Result<Window<Card>>,
    ) {
        let session = match self.sessions.get_mut(&menu) {
            Some(x) => x,
            None => return,
        };

        let window = match result {
            Ok(x) => x,
            Err(e) => {
                tracing::error!(menu = %menu, sub_page, error = %e, "failed to assemble window");
                if session.wants(seq) {
                    let origin = session.origin().clone();
                    let text = error_text(&e.root_cause().to_string());
                    if let Err(e) = self
                        .shared
                        .surface
                        .send(&origin.channel, Some(&origin.message), OutgoingMessage::text(text))
                        .await
                    {
                        tracing::error!(error = %e, "failed to report window error");
                    }
                }
                return;
            }
        };

        if !session.apply_window(seq, sub_page, window.items) {
            tracing::debug!(menu = %menu, seq, "dropping stale window");
            return;
        }
        let msg = self.shared.renderer.results_message(
            session.total_items(),
            session.cards(),
            session.sub_page(),
            session.sub_page_count(),
        );
        let at = session.origin().menu_destination.clone();
        if let Err(e) = self.shared.surface.edit(&at, &menu, msg).await {
            tracing::warn!(error = %e, "failed to render window");
        }
    }
}

impl<S: Surface, P: PageSource<Item = Card>> Shared<S, P> {
    async fn search(
        self: Arc<Self>,
        msg: IncomingMessage,
        query: String,
        image_only: bool,
    ) -> Result<Option<SearchHit>> {
        let channel = Destination::Channel(msg.channel.clone());
        let waiting = self
            .surface
            .send(&channel, Some(&msg.id), OutgoingMessage::text("Looking..."))
            .await?;

        let res = self.open_menu(&msg, &channel, &query, image_only).await;
        if let Err(e) = self.surface.delete(&channel, &waiting).await {
            tracing::warn!(error = %e, "failed to delete placeholder");
        }

        match res {
            Ok(x) => Ok(x),
            Err(e) => {
                let text = match find_status(&e) {
                    Some(status) if status.is_not_found() => not_found_text(),
                    Some(status) => match &status.details {
                        Some(details) => error_text(details),
                        None => error_text(&status.to_string()),
                    },
                    None => {
                        tracing::error!(error = ?e, query = %query, "error during search");
                        error_text(&e.root_cause().to_string())
                    }
                };
                self.surface
                    .send(&channel, Some(&msg.id), OutgoingMessage::text(text))
                    .await?;
                Ok(None)
            }
        }
    }

    async fn open_menu(
        &self,
        msg: &IncomingMessage,
        channel: &Destination,
        query: &str,
        image_only: bool,
    ) -> Result<Option<SearchHit>> {
        let key = QueryKey::encode(query);
        tracing::info!(query = %key, user = %msg.author, image_only, "searching");
        let first = self.paginator.first_window(&key).await?;

        if first.total_items == 1 {
            if let Some(card) = first.items.first() {
                let reply = self.renderer.match_message(card, image_only);
                self.surface.send(channel, Some(&msg.id), reply).await?;
                return Ok(None);
            }
        }

        Ok(Some(SearchHit {
            msg: msg.clone(),
            query: key,
            first,
            image_only,
        }))
    }
}

#[cfg(test)]
#[path = "driver_test.rs"]
mod driver_test;
