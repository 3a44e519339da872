use scrycache::QueryKey;
use scryclient::Card;

use crate::surface::{Destination, MessageId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Controls are live and the expiry timer is running.
    Active,
    /// Timer fired; only the delete control remains.
    Expired,
    /// Menu removed.
    Terminal,
}

/// A window fetch issued by a page-select.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub seq: u64,
    pub sub_page: usize,
    pub timer: u64,
}

/// Where the search came from and where its menu lives.
#[derive(Clone, Debug)]
pub struct SessionOrigin {
    pub owner: UserId,
    pub channel: Destination,
    pub message: MessageId,
    pub menu_destination: Destination,
    pub menu: MessageId,
}

/// Browsing state for one search menu. Every transition is explicit; the
/// timer generation and the request sequence number reject stale timer fires
/// and stale window results.
pub struct SelectionSession {
    origin: SessionOrigin,
    query: QueryKey,
    total_items: usize,
    image_only: bool,
    cards: Vec<Card>,
    sub_page: usize,
    sub_page_count: usize,
    state: SessionState,
    timer: u64,
    latest_request: u64,
}

impl SelectionSession {
    pub fn new(
        origin: SessionOrigin,
        query: QueryKey,
        total_items: usize,
        sub_page_count: usize,
        cards: Vec<Card>,
        image_only: bool,
    ) -> Self {
        Self {
            origin,
            query,
            total_items,
            image_only,
            cards,
            sub_page: 0,
            sub_page_count,
            state: SessionState::Active,
            timer: 0,
            latest_request: 0,
        }
    }

    pub fn origin(&self) -> &SessionOrigin {
        &self.origin
    }

    pub fn query(&self) -> &QueryKey {
        &self.query
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn image_only(&self) -> bool {
        self.image_only
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn sub_page(&self) -> usize {
        self.sub_page
    }

    pub fn sub_page_count(&self) -> usize {
        self.sub_page_count
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_owner(&self, user: &UserId) -> bool {
        self.origin.owner == *user
    }

    /// Restarts the expiry timer. The returned token must be handed back to
    /// `expire`.
    pub fn arm_timer(&mut self) -> u64 {
        self.timer += 1;
        self.timer
    }

    pub fn expire(&mut self, timer: u64) -> bool {
        if self.state != SessionState::Active || timer != self.timer {
            return false;
        }
        self.state = SessionState::Expired;
        true
    }

    /// Resolves selected option values to cards and ends the session. Values
    /// that are not indexes into the current window are skipped; if none are
    /// left, nothing happens.
    pub fn select_cards(&mut self, values: &[String]) -> Option<Vec<Card>> {
        if self.state != SessionState::Active {
            return None;
        }
        let selected = values
            .iter()
            .filter_map(|v| v.parse::<usize>().ok())
            .filter_map(|i| self.cards.get(i).cloned())
            .collect::<Vec<_>>();
        if selected.is_empty() {
            return None;
        }
        self.state = SessionState::Terminal;
        self.timer += 1;
        Some(selected)
    }

    pub fn request_page(&mut self, value: &str) -> Option<PageRequest> {
        if self.state != SessionState::Active {
            return None;
        }
        let sub_page = value.parse::<usize>().ok()?;
        if sub_page >= self.sub_page_count {
            return None;
        }
        self.latest_request += 1;
        Some(PageRequest {
            seq: self.latest_request,
            sub_page,
            timer: self.arm_timer(),
        })
    }

    /// Whether a window result for `seq` should still be shown.
    pub fn wants(&self, seq: u64) -> bool {
        self.state == SessionState::Active && seq == self.latest_request
    }

    /// Installs a fetched window. Returns `false` for results that are no
    /// longer wanted.
    pub fn apply_window(&mut self, seq: u64, sub_page: usize, cards: Vec<Card>) -> bool {
        if !self.wants(seq) {
            return false;
        }
        self.sub_page = sub_page;
        self.cards = cards;
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.state == SessionState::Terminal {
            return false;
        }
        self.state = SessionState::Terminal;
        self.timer += 1;
        true
    }
}
