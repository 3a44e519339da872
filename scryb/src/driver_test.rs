use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use scrycache::{PageSource, Paginator, QueryKey, SourcePage, WindowGeometry, ITEMS_PER_PAGE};
use scryclient::{Card, StatusCode, StatusCodeError};
use tokio::sync::mpsc;

use crate::{
    driver::{BotConfig, Event, SessionDriver},
    render::{ManaEmoji, Renderer},
    session::SessionState,
    surface::{
        ChannelId, Control, Destination, IncomingMessage, Interaction, InteractionKind, MessageId,
        OutgoingMessage, Surface, UserId,
    },
};

#[derive(Clone, Debug)]
enum Op {
    Send {
        to: Destination,
        reply_to: Option<MessageId>,
        id: MessageId,
        msg: OutgoingMessage,
    },
    Edit {
        id: MessageId,
        msg: OutgoingMessage,
    },
    Delete {
        id: MessageId,
    },
}

#[derive(Default)]
struct RecordingSurface {
    next_id: AtomicU64,
    ops: Mutex<Vec<Op>>,
    /// Queues a card pick by this user as soon as a menu is sent.
    eager_picker: Mutex<Option<(mpsc::UnboundedSender<Event>, UserId)>>,
}

impl RecordingSurface {
    fn pick_on_send(&self, tx: mpsc::UnboundedSender<Event>, user: &str) {
        *self.eager_picker.lock().unwrap() = Some((tx, UserId(user.into())));
    }

    fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    fn sent(&self) -> Vec<(Destination, Option<MessageId>, MessageId, OutgoingMessage)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Send {
                    to,
                    reply_to,
                    id,
                    msg,
                } => Some((to, reply_to, id, msg)),
                _ => None,
            })
            .collect()
    }

    fn edits(&self) -> Vec<(MessageId, OutgoingMessage)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Edit { id, msg } => Some((id, msg)),
                _ => None,
            })
            .collect()
    }

    fn deleted(&self) -> Vec<MessageId> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Delete { id } => Some(id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Surface for RecordingSurface {
    async fn send(
        &self,
        to: &Destination,
        reply_to: Option<&MessageId>,
        msg: OutgoingMessage,
    ) -> Result<MessageId> {
        let id = MessageId(format!("out-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        if !msg.controls.is_empty() {
            if let Some((tx, user)) = &*self.eager_picker.lock().unwrap() {
                let _ = tx.send(Event::Interaction(Interaction {
                    message: id.clone(),
                    user: user.clone(),
                    kind: InteractionKind::CardSelect(vec!["0".into()]),
                }));
            }
        }
        self.ops.lock().unwrap().push(Op::Send {
            to: to.clone(),
            reply_to: reply_to.cloned(),
            id: id.clone(),
            msg,
        });
        Ok(id)
    }

    async fn edit(&self, _at: &Destination, id: &MessageId, msg: OutgoingMessage) -> Result<()> {
        self.ops.lock().unwrap().push(Op::Edit {
            id: id.clone(),
            msg,
        });
        Ok(())
    }

    async fn delete(&self, _at: &Destination, id: &MessageId) -> Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(Op::Delete { id: id.clone() });
        Ok(())
    }
}

/// Every query matches `totals[query]` cards named "<query> <index>".
/// Unknown queries are a 404.
#[derive(Default)]
struct MockCards {
    totals: HashMap<String, usize>,
    /// Queries answered with a 400 carrying these details.
    rejected: HashMap<String, String>,
    failing_pages: HashSet<u32>,
}

impl MockCards {
    fn new(totals: &[(&str, usize)]) -> Self {
        Self {
            totals: totals
                .iter()
                .map(|(q, n)| (QueryKey::encode(q).as_str().to_string(), *n))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PageSource for MockCards {
    type Item = Card;

    async fn fetch_page(&self, query: &QueryKey, source_page: u32) -> Result<SourcePage<Card>> {
        if let Some(details) = self.rejected.get(query.as_str()) {
            return Err(StatusCodeError {
                status: StatusCode::BAD_REQUEST,
                details: Some(details.clone()),
            }
            .into());
        }
        if self.failing_pages.contains(&source_page) {
            anyhow::bail!("upstream unavailable");
        }
        let total = match self.totals.get(query.as_str()) {
            Some(x) => *x,
            None => {
                return Err(StatusCodeError {
                    status: StatusCode::NOT_FOUND,
                    details: Some("no cards found".into()),
                }
                .into())
            }
        };
        let start = (source_page as usize - 1) * ITEMS_PER_PAGE;
        let end = (start + ITEMS_PER_PAGE).min(total);
        Ok(SourcePage {
            items: (start..end)
                .map(|i| Card {
                    name: format!("{} {}", query, i),
                    set: "tst".into(),
                    ..Default::default()
                })
                .collect(),
            total_items: total,
            has_more: end < total,
            next_page: None,
        })
    }
}

const TIMEOUT: Duration = Duration::from_secs(60);
const GRACE: Duration = Duration::from_secs(600);

struct Harness {
    driver: SessionDriver<RecordingSurface, MockCards>,
    surface: Arc<RecordingSurface>,
}

impl Harness {
    fn new(totals: &[(&str, usize)], private_select: bool) -> Self {
        Self::with_source(MockCards::new(totals), private_select)
    }

    fn with_source(source: MockCards, private_select: bool) -> Self {
        let surface = Arc::new(RecordingSurface::default());
        let paginator = Arc::new(Paginator::new(source, WindowGeometry::default()));
        let renderer = Renderer::new(0xFFFC30, ManaEmoji::new(HashMap::new())).unwrap();
        let driver = SessionDriver::new(
            BotConfig {
                key_phrase: "scryb".into(),
                select_timeout: TIMEOUT,
                private_select,
                expired_grace: GRACE,
            },
            surface.clone(),
            paginator,
            renderer,
        )
        .unwrap();
        Self { driver, surface }
    }

    async fn step(&mut self) {
        let ev = self.driver.next_event().await.unwrap();
        self.driver.dispatch(ev).await;
    }

    async fn say(&mut self, user: &str, content: &str) {
        self.driver
            .dispatch(Event::Message(IncomingMessage {
                id: MessageId("in-1".into()),
                channel: ChannelId("general".into()),
                author: UserId(user.into()),
                author_is_bot: false,
                content: content.into(),
            }))
            .await;
    }

    /// Runs a search that opens a menu and returns the menu id.
    async fn open(&mut self, content: &str) -> MessageId {
        self.say("alice", content).await;
        self.step().await;
        let menu = self
            .surface
            .sent()
            .into_iter()
            .rev()
            .find(|(_, _, _, msg)| !msg.controls.is_empty())
            .map(|(_, _, id, _)| id)
            .unwrap();
        assert!(self.driver.session(&menu).is_some());
        menu
    }

    async fn interact(&mut self, menu: &MessageId, user: &str, kind: InteractionKind) {
        self.driver
            .dispatch(Event::Interaction(Interaction {
                message: menu.clone(),
                user: UserId(user.into()),
                kind,
            }))
            .await;
    }
}

fn footer(msg: &OutgoingMessage) -> Option<String> {
    msg.embeds.first().and_then(|e| e.footer.clone())
}

fn option_labels(msg: &OutgoingMessage) -> Vec<String> {
    msg.controls
        .iter()
        .find_map(|c| match c {
            Control::CardSelect { options, .. } => {
                Some(options.iter().map(|o| o.label.clone()).collect())
            }
            _ => None,
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn help_is_answered_inline() {
    let mut h = Harness::new(&[], false);
    h.say("alice", "scryb help").await;

    let sent = h.surface.sent();
    assert_eq!(sent.len(), 1);
    let (to, reply_to, _, msg) = &sent[0];
    assert_eq!(*to, Destination::Channel(ChannelId("general".into())));
    assert_eq!(reply_to.as_ref(), Some(&MessageId("in-1".into())));
    assert!(msg.content.as_ref().unwrap().contains("60 seconds"));
    assert_eq!(h.driver.session_count(), 0);
}

#[tokio::test]
async fn bots_and_chatter_are_ignored() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    h.say("alice", "hello there").await;
    h.driver
        .dispatch(Event::Message(IncomingMessage {
            id: MessageId("in-2".into()),
            channel: ChannelId("general".into()),
            author: UserId("otherbot".into()),
            author_is_bot: true,
            content: "scryb goblin".into(),
        }))
        .await;
    assert!(h.surface.ops().is_empty());
}

#[tokio::test]
async fn search_opens_menu() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    let menu = h.open("scryb goblin").await;

    let sent = h.surface.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].3.content.as_deref(), Some("Looking..."));
    assert_eq!(h.surface.deleted(), vec![sent[0].2.clone()]);

    let (to, reply_to, id, msg) = &sent[1];
    assert_eq!(*id, menu);
    assert_eq!(*to, Destination::Channel(ChannelId("general".into())));
    assert_eq!(reply_to.as_ref(), Some(&MessageId("in-1".into())));
    assert_eq!(footer(msg).as_deref(), Some("Page 1 of 23"));
    assert_eq!(option_labels(msg).len(), 9);
    assert_eq!(option_labels(msg)[0], "goblin 0 | TST");

    let session = h.driver.session(&menu).unwrap();
    assert_eq!(session.total_items(), 200);
    assert_eq!(session.sub_page_count(), 23);
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn private_select_goes_to_author() {
    let mut h = Harness::new(&[("goblin", 20)], true);
    let menu = h.open("scryb goblin").await;

    let (to, reply_to, _, _) = h
        .surface
        .sent()
        .into_iter()
        .find(|(_, _, id, _)| *id == menu)
        .unwrap();
    assert_eq!(to, Destination::Direct(UserId("alice".into())));
    assert!(reply_to.is_none());
}

#[tokio::test]
async fn single_match_skips_menu() {
    let mut h = Harness::new(&[("black lotus", 1)], false);
    h.say("alice", "scryb black lotus").await;
    // No session event is posted, so wait for the placeholder cleanup.
    while h.surface.deleted().is_empty() {
        tokio::task::yield_now().await;
    }

    let sent = h.surface.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1]
        .3
        .content
        .as_ref()
        .unwrap()
        .starts_with("Match Found"));
    assert!(sent[1].3.controls.is_empty());
    assert_eq!(h.driver.session_count(), 0);
}

#[tokio::test]
async fn unknown_query_reports_not_found() {
    let mut h = Harness::new(&[], false);
    h.say("alice", "scryb zzzz").await;
    while h.surface.sent().len() < 2 {
        tokio::task::yield_now().await;
    }

    let sent = h.surface.sent();
    assert!(sent[1]
        .3
        .content
        .as_ref()
        .unwrap()
        .starts_with("Your query didn't match any cards"));
    assert_eq!(h.driver.session_count(), 0);
}

#[tokio::test]
async fn rejected_query_reports_details() {
    let mut source = MockCards::new(&[]);
    source.rejected.insert(
        QueryKey::encode("o:").as_str().to_string(),
        "All of your terms were ignored.".into(),
    );
    let mut h = Harness::with_source(source, false);
    h.say("alice", "scryb o:").await;
    while h.surface.sent().len() < 2 {
        tokio::task::yield_now().await;
    }

    let content = h.surface.sent()[1].3.content.clone().unwrap();
    assert!(content.starts_with("There was an error in processing your request"));
    assert!(content.contains("\"All of your terms were ignored.\""));
    assert_eq!(h.driver.session_count(), 0);
}

#[tokio::test]
async fn failed_page_select_is_reported() {
    let mut source = MockCards::new(&[("goblin", 200)]);
    source.failing_pages.insert(2);
    let mut h = Harness::with_source(source, false);
    let menu = h.open("scryb goblin").await;

    // Sub-page 19 needs the second source page.
    h.interact(&menu, "alice", InteractionKind::PageSelect("19".into()))
        .await;
    h.step().await;

    assert!(h.surface.edits().is_empty());
    let (_, reply_to, _, msg) = h.surface.sent().pop().unwrap();
    assert_eq!(reply_to, Some(MessageId("in-1".into())));
    assert!(msg.content.unwrap().contains("upstream unavailable"));

    let session = h.driver.session(&menu).unwrap();
    assert_eq!(session.sub_page(), 0);
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn menu_is_live_as_soon_as_it_is_sent() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    h.surface.pick_on_send(h.driver.sender(), "alice");
    let menu = h.open("scryb goblin").await;

    // The pick was queued while the menu was being sent.
    h.step().await;
    let (_, _, _, msg) = h.surface.sent().pop().unwrap();
    assert_eq!(msg.content.as_deref(), Some("Results:"));
    assert_eq!(msg.embeds[0].title.as_deref(), Some("goblin 0 - No Cost"));
    assert_eq!(h.surface.deleted().last(), Some(&menu));
    assert!(h.driver.session(&menu).is_none());
}

#[tokio::test]
async fn page_select_edits_menu() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    let menu = h.open("scryb goblin").await;

    h.interact(&menu, "alice", InteractionKind::PageSelect("19".into()))
        .await;
    h.step().await;

    let edits = h.surface.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].0, menu);
    assert_eq!(footer(&edits[0].1).as_deref(), Some("Page 20 of 23"));
    let labels = option_labels(&edits[0].1);
    assert_eq!(labels.len(), 9);
    assert_eq!(labels[0], "goblin 171 | TST");
    assert_eq!(labels[8], "goblin 179 | TST");
    assert_eq!(h.driver.session(&menu).unwrap().sub_page(), 19);
}

#[tokio::test]
async fn other_users_cannot_drive_menu() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    let menu = h.open("scryb goblin").await;
    let before = h.surface.ops().len();

    h.interact(&menu, "mallory", InteractionKind::PageSelect("1".into()))
        .await;
    h.interact(&menu, "mallory", InteractionKind::CardSelect(vec!["0".into()]))
        .await;
    h.interact(&menu, "mallory", InteractionKind::Delete).await;

    assert_eq!(h.surface.ops().len(), before);
    assert_eq!(
        h.driver.session(&menu).unwrap().state(),
        SessionState::Active
    );
}

#[tokio::test]
async fn card_select_replies_and_removes_menu() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    let menu = h.open("scryb goblin").await;

    h.interact(
        &menu,
        "alice",
        InteractionKind::CardSelect(vec!["1".into(), "4".into()]),
    )
    .await;

    let (to, reply_to, _, msg) = h.surface.sent().pop().unwrap();
    assert_eq!(to, Destination::Channel(ChannelId("general".into())));
    assert_eq!(reply_to, Some(MessageId("in-1".into())));
    assert_eq!(msg.content.as_deref(), Some("Results:"));
    assert_eq!(msg.embeds.len(), 2);
    assert_eq!(msg.embeds[0].title.as_deref(), Some("goblin 1 - No Cost"));
    assert_eq!(msg.embeds[1].title.as_deref(), Some("goblin 4 - No Cost"));
    assert_eq!(h.surface.deleted().last(), Some(&menu));
    assert!(h.driver.session(&menu).is_none());
}

#[tokio::test(start_paused = true)]
async fn menu_expires() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    let menu = h.open("scryb goblin").await;

    // Only the expiry timer is pending; the paused clock jumps to it.
    h.step().await;

    let edits = h.surface.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].1.content.as_deref(), Some("Search Expired"));
    assert_eq!(edits[0].1.controls, vec![Control::Delete]);
    assert!(h.driver.session(&menu).is_none());
    assert_eq!(h.driver.expired_count(), 1);

    // Selections are dead, deletion still works for the owner only.
    let before = h.surface.ops().len();
    h.interact(&menu, "alice", InteractionKind::PageSelect("2".into()))
        .await;
    h.interact(&menu, "alice", InteractionKind::CardSelect(vec!["0".into()]))
        .await;
    h.interact(&menu, "mallory", InteractionKind::Delete).await;
    assert_eq!(h.surface.ops().len(), before);

    h.interact(&menu, "alice", InteractionKind::Delete).await;
    assert_eq!(h.surface.deleted().last(), Some(&menu));
    assert_eq!(h.driver.expired_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_menus_are_released() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    let mut menus = Vec::new();
    for _ in 0..5 {
        menus.push(h.open("scryb goblin").await);
    }
    assert_eq!(h.driver.session_count(), 5);

    for _ in 0..5 {
        h.step().await;
    }
    assert_eq!(h.driver.session_count(), 0);
    assert_eq!(h.driver.expired_count(), 5);

    h.interact(&menus[0], "alice", InteractionKind::Delete).await;
    assert_eq!(h.driver.expired_count(), 4);

    // One forget per expired menu, including the one already deleted.
    let expired_at = tokio::time::Instant::now();
    for _ in 0..5 {
        h.step().await;
    }
    assert!(expired_at.elapsed() >= GRACE);
    assert_eq!(h.driver.expired_count(), 0);

    let deletes = h.surface.deleted().len();
    h.interact(&menus[1], "alice", InteractionKind::Delete).await;
    assert_eq!(h.surface.deleted().len(), deletes);
}

#[tokio::test(start_paused = true)]
async fn page_select_postpones_expiry() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    let menu = h.open("scryb goblin").await;
    let opened_at = tokio::time::Instant::now();

    tokio::time::advance(Duration::from_secs(30)).await;
    h.interact(&menu, "alice", InteractionKind::PageSelect("1".into()))
        .await;
    h.step().await;
    assert_eq!(h.surface.edits().len(), 1);

    // The first timer fires at 60s and is stale.
    h.step().await;
    assert_eq!(
        h.driver.session(&menu).unwrap().state(),
        SessionState::Active
    );

    h.step().await;
    assert!(opened_at.elapsed() >= Duration::from_secs(90));
    assert!(h.driver.session(&menu).is_none());
    assert_eq!(h.driver.expired_count(), 1);
}

#[tokio::test]
async fn late_window_does_not_overwrite_newer_one() {
    let mut h = Harness::new(&[("goblin", 200)], false);
    let menu = h.open("scryb goblin").await;

    h.interact(&menu, "alice", InteractionKind::PageSelect("3".into()))
        .await;
    h.interact(&menu, "alice", InteractionKind::PageSelect("7".into()))
        .await;

    let mut ready = Vec::new();
    while ready.len() < 2 {
        match h.driver.next_event().await.unwrap() {
            ev @ Event::WindowReady { .. } => ready.push(ev),
            _ => {}
        }
    }
    ready.sort_by_key(|ev| match ev {
        Event::WindowReady { seq, .. } => std::cmp::Reverse(*seq),
        _ => unreachable!(),
    });
    for ev in ready {
        h.driver.dispatch(ev).await;
    }

    let edits = h.surface.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(footer(&edits[0].1).as_deref(), Some("Page 8 of 23"));
    assert_eq!(h.driver.session(&menu).unwrap().sub_page(), 7);
}
