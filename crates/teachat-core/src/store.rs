use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use teachat_types::{ChannelId, Message, MessageId, TempId};

/// Identity of a store entry. A logical message is held under exactly one
/// key at a time: provisional until the server echo arrives, then confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Confirmed(MessageId),
    Provisional(TempId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Sent, waiting for the server echo.
    Pending,
    /// No echo arrived within the send timeout.
    Failed,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub key: MessageKey,
    pub content: String,
    pub sender: String,
    pub channel_id: ChannelId,
    pub created_at: DateTime<Utc>,
    pub state: DeliveryState,
}

impl StoredMessage {
    pub fn provisional(
        temp_id: TempId,
        content: String,
        sender: String,
        channel_id: ChannelId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: MessageKey::Provisional(temp_id),
            content,
            sender,
            channel_id,
            created_at,
            state: DeliveryState::Pending,
        }
    }

    pub fn id(&self) -> Option<MessageId> {
        match self.key {
            MessageKey::Confirmed(id) => Some(id),
            MessageKey::Provisional(_) => None,
        }
    }

    pub fn temp_id(&self) -> Option<TempId> {
        match self.key {
            MessageKey::Provisional(temp_id) => Some(temp_id),
            MessageKey::Confirmed(_) => None,
        }
    }

    fn supersede(&mut self, confirmed: Message) {
        self.key = MessageKey::Confirmed(confirmed.id);
        self.content = confirmed.content;
        self.sender = confirmed.sender;
        self.created_at = confirmed.created_at;
        self.state = DeliveryState::Confirmed;
    }
}

impl From<Message> for StoredMessage {
    fn from(msg: Message) -> Self {
        Self {
            key: MessageKey::Confirmed(msg.id),
            content: msg.content,
            sender: msg.sender,
            channel_id: msg.channel_id,
            created_at: msg.created_at,
            state: DeliveryState::Confirmed,
        }
    }
}

/// Result of offering a confirmed message to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was added.
    Inserted,
    /// The provisional entry with this temp id became the confirmed message.
    Reconciled(TempId),
    /// The id is already held, but a provisional copy echoing the same temp
    /// id was still waiting and has been dropped.
    Absorbed(TempId),
    /// The id is already held; nothing changed.
    Duplicate,
}

/// Result of merging a history page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageMerge {
    /// Page entries added to the store.
    pub added: usize,
    /// Live confirmed entries kept ahead of an initial page.
    pub live: usize,
    /// Provisional entries the page turned out to confirm.
    pub reconciled: Vec<TempId>,
}

/// Newest-first, duplicate-free timeline of the active channel.
#[derive(Debug, Default)]
pub struct MessageStore {
    entries: Vec<StoredMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredMessage> {
        self.entries.iter()
    }

    pub fn get(&self, id: MessageId) -> Option<&StoredMessage> {
        self.entries.iter().find(|e| e.id() == Some(id))
    }

    pub fn get_provisional(&self, temp_id: TempId) -> Option<&StoredMessage> {
        self.entries.iter().find(|e| e.temp_id() == Some(temp_id))
    }

    /// Adds a locally created message at the head.
    pub fn insert_provisional(&mut self, entry: StoredMessage) {
        self.entries.insert(0, entry);
    }

    /// Offers a confirmed message. An existing entry with the same id wins,
    /// and drops a provisional copy carrying the echoed temp id. Otherwise a
    /// provisional entry that represents the same message is superseded in
    /// place: matched by echoed temp id when the server sends one, else by
    /// sender and content (oldest provisional first).
    pub fn insert(&mut self, msg: Message) -> InsertOutcome {
        if self.get(msg.id).is_some() {
            return match self.take_provisional(&msg, false) {
                Some(temp_id) => InsertOutcome::Absorbed(temp_id),
                None => InsertOutcome::Duplicate,
            };
        }

        if let Some(idx) = self.find_provisional_match(&msg) {
            let entry = &mut self.entries[idx];
            let temp_id = match entry.key {
                MessageKey::Provisional(temp_id) => temp_id,
                MessageKey::Confirmed(_) => return InsertOutcome::Duplicate,
            };
            debug!("Reconciled {} as message {}", temp_id, msg.id);
            entry.supersede(msg);
            return InsertOutcome::Reconciled(temp_id);
        }

        let pos = self
            .entries
            .iter()
            .position(|e| e.created_at <= msg.created_at)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, msg.into());
        InsertOutcome::Inserted
    }

    fn find_provisional_match(&self, msg: &Message) -> Option<usize> {
        self.find_echo(msg).or_else(|| {
            self.entries.iter().rposition(|e| {
                e.temp_id().is_some() && e.sender == msg.sender && e.content == msg.content
            })
        })
    }

    fn find_echo(&self, msg: &Message) -> Option<usize> {
        let temp_id = msg.temp_id?;
        self.entries.iter().position(|e| e.temp_id() == Some(temp_id))
    }

    /// Drops the provisional entry `msg` confirms, if any. Without
    /// `by_content` only an echoed temp id counts.
    fn take_provisional(&mut self, msg: &Message, by_content: bool) -> Option<TempId> {
        let found = if by_content {
            self.find_provisional_match(msg)
        } else {
            self.find_echo(msg)
        };
        let idx = found?;
        let temp_id = self.entries.remove(idx).temp_id()?;
        debug!("{} already held as message {}", temp_id, msg.id);
        Some(temp_id)
    }

    /// Appends an older history page after everything currently held.
    /// Provisional entries are only matched by echoed temp id here: older
    /// history routinely repeats short messages.
    pub fn append_older(&mut self, page: Vec<Message>) -> PageMerge {
        let mut held: HashSet<MessageId> = self.entries.iter().filter_map(|e| e.id()).collect();
        let mut merge = PageMerge::default();
        for msg in page {
            if !held.insert(msg.id) {
                debug!("Skipping message {} already in view", msg.id);
                continue;
            }
            if let Some(temp_id) = self.take_provisional(&msg, false) {
                merge.reconciled.push(temp_id);
            }
            self.entries.push(msg.into());
            merge.added += 1;
        }
        merge
    }

    /// Installs the first history page. Entries that arrived live since the
    /// store was reset and are not part of the page stay ahead of it. A
    /// provisional entry the server saved before answering is replaced by
    /// its page copy.
    pub fn replace_with_page(&mut self, page: Vec<Message>) -> PageMerge {
        let page_ids: HashSet<MessageId> = page.iter().map(|m| m.id).collect();
        self.entries
            .retain(|e| e.id().is_none_or(|id| !page_ids.contains(&id)));

        let mut merge = PageMerge {
            added: page.len(),
            live: self.entries.iter().filter(|e| e.id().is_some()).count(),
            reconciled: Vec::new(),
        };
        // Newest first, so the freshest copy claims the oldest provisional.
        for msg in &page {
            if let Some(temp_id) = self.take_provisional(msg, true) {
                merge.reconciled.push(temp_id);
            }
        }

        self.entries.extend(page.into_iter().map(StoredMessage::from));
        merge
    }

    /// Deletes the entry with `id`. Absent ids are a no-op.
    pub fn remove(&mut self, id: MessageId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id() != Some(id));
        before != self.entries.len()
    }

    /// Flags a provisional entry whose echo never arrived.
    pub fn mark_failed(&mut self, temp_id: TempId) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.temp_id() == Some(temp_id))
        {
            Some(entry) => {
                entry.state = DeliveryState::Failed;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Case-insensitive content filter, in store order.
    pub fn search(&self, query: &str) -> Vec<&StoredMessage> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.content.to_lowercase().contains(&needle))
            .collect()
    }
}
