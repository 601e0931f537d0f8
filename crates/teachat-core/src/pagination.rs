use tracing::debug;

use teachat_types::ChannelId;
use teachat_types::api::{MESSAGE_PAGE_SIZE, MessagePageQuery};

/// How far back the active channel's history has been loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    pub offset: u32,
    pub has_more: bool,
}

impl Default for PaginationCursor {
    fn default() -> Self {
        Self {
            offset: 0,
            has_more: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Initial,
    Older,
}

/// A history fetch in flight. `epoch` identifies the channel activation that
/// issued it, so completions from an earlier visit to the same channel are
/// recognisable as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub channel_id: ChannelId,
    pub epoch: u64,
    pub kind: PageKind,
    pub query: MessagePageQuery,
}

#[derive(Debug, Default)]
pub struct Pagination {
    cursor: PaginationCursor,
    in_flight: bool,
}

impl Pagination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> PaginationCursor {
        self.cursor
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    pub fn reset(&mut self) {
        self.cursor = PaginationCursor::default();
        self.in_flight = false;
    }

    pub fn begin_initial(&mut self, channel_id: ChannelId, epoch: u64) -> PageRequest {
        self.in_flight = true;
        PageRequest {
            channel_id,
            epoch,
            kind: PageKind::Initial,
            query: MessagePageQuery::at(0),
        }
    }

    /// Returns `None` when history is exhausted or a page is already loading.
    pub fn begin_more(&mut self, channel_id: ChannelId, epoch: u64) -> Option<PageRequest> {
        if !self.cursor.has_more {
            debug!("Channel {} history exhausted", channel_id);
            return None;
        }
        if self.in_flight {
            debug!("Channel {} page already loading", channel_id);
            return None;
        }

        self.in_flight = true;
        Some(PageRequest {
            channel_id,
            epoch,
            kind: PageKind::Older,
            query: MessagePageQuery::at(self.cursor.offset),
        })
    }

    /// `live_confirmed` counts confirmed messages that arrived ahead of the
    /// first page and are therefore also ahead of it in the server's order.
    pub fn complete_initial(&mut self, returned: usize, live_confirmed: usize) {
        self.in_flight = false;
        self.cursor.offset = MESSAGE_PAGE_SIZE + live_confirmed as u32;
        self.cursor.has_more = returned as u32 == MESSAGE_PAGE_SIZE;
    }

    pub fn complete_more(&mut self, returned: usize) {
        self.in_flight = false;
        self.cursor.offset += returned as u32;
        self.cursor.has_more = returned as u32 == MESSAGE_PAGE_SIZE;
    }

    /// A failed fetch leaves the cursor untouched so the user can retry.
    pub fn fail(&mut self) {
        self.in_flight = false;
    }

    /// A confirmed message arrived live. The server orders by creation time,
    /// so a row newer than the oldest loaded one shifts every later offset by
    /// one wherever it sorts locally. A row older than everything loaded
    /// lands at the current offset and is already held, so counting it only
    /// skips a message the store has.
    pub fn note_live_insert(&mut self) {
        self.cursor.offset += 1;
    }
}
