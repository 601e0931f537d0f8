use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use teachat_api::ApiError;
use teachat_gateway::GatewayEvent;
use teachat_types::events::{MessageDeleted, StatusUpdate, TypingSignal};
use teachat_types::{
    Channel, ChannelId, ClientCommand, Message, MessageId, ServerEvent, TempId, User, UserId,
};

use crate::error::SendError;
use crate::pagination::{PageKind, PageRequest, Pagination, PaginationCursor};
use crate::presence::Roster;
use crate::send::{PendingSends, SEND_TIMEOUT, TempIdGenerator, validate_content};
use crate::sink::{CommandSink, Fetcher};
use crate::store::{InsertOutcome, MessageStore, StoredMessage};
use crate::typing::{LocalTyping, TYPING_DEBOUNCE, TypingSet};

/// Who this client is on the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub send_timeout: Duration,
    pub typing_debounce: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            send_timeout: SEND_TIMEOUT,
            typing_debounce: TYPING_DEBOUNCE,
        }
    }
}

/// What a view needs to redraw after the session handled an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Connection { online: bool },
    ChannelsUpdated,
    ChannelSwitched(ChannelId),
    MessagesUpdated,
    TypingUpdated,
    PresenceUpdated,
    /// A provisional message never got its echo.
    SendFailed(TempId),
    Rejected(SendError),
    SearchResults(String),
}

#[derive(Debug, Clone)]
struct ActiveChannel {
    channel: Channel,
    epoch: u64,
}

/// Per-client orchestrator. Owns the active channel's store, history cursor
/// and typing state, and is the only issuer of `join_channel`.
pub struct ChannelSession {
    identity: Identity,
    sink: Box<dyn CommandSink>,
    fetcher: Box<dyn Fetcher>,

    channels: Vec<Channel>,
    active: Option<ActiveChannel>,
    epoch: u64,
    connected: bool,

    store: MessageStore,
    pagination: Pagination,
    local_typing: LocalTyping,
    typing: TypingSet,
    pending: PendingSends,
    temp_ids: TempIdGenerator,
    roster: Roster,

    changes: Vec<Change>,
}

impl ChannelSession {
    pub fn new(
        identity: Identity,
        sink: Box<dyn CommandSink>,
        fetcher: Box<dyn Fetcher>,
        options: SessionOptions,
    ) -> Self {
        let typing = TypingSet::new(identity.username.clone());
        Self {
            identity,
            sink,
            fetcher,
            channels: Vec::new(),
            active: None,
            epoch: 0,
            connected: false,
            store: MessageStore::new(),
            pagination: Pagination::new(),
            local_typing: LocalTyping::new(options.typing_debounce),
            typing,
            pending: PendingSends::new(options.send_timeout),
            temp_ids: TempIdGenerator::default(),
            roster: Roster::new(),
            changes: Vec::new(),
        }
    }

    // -- Read access for views --

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn active_channel(&self) -> Option<&Channel> {
        self.active.as_ref().map(|a| &a.channel)
    }

    pub fn active_channel_id(&self) -> Option<ChannelId> {
        self.active.as_ref().map(|a| a.channel.id)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn cursor(&self) -> PaginationCursor {
        self.pagination.cursor()
    }

    pub fn is_loading_history(&self) -> bool {
        self.pagination.is_loading()
    }

    pub fn typing(&self) -> &TypingSet {
        &self.typing
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn search(&self, query: &str) -> Vec<&StoredMessage> {
        self.store.search(query)
    }

    pub fn pending_sends(&self) -> usize {
        self.pending.len()
    }

    /// Drains the changes accumulated since the last call.
    pub fn take_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    // -- Channel lifecycle --

    /// Loads the channel directory and user roster.
    pub fn refresh(&mut self) {
        self.fetcher.fetch_channels();
        self.fetcher.fetch_users();
    }

    /// Switches to the channel whose name or id matches `target`.
    pub fn switch_to(&mut self, target: &str) -> Result<(), SendError> {
        let target = target.trim().trim_start_matches('#');
        let channel = self
            .channels
            .iter()
            .find(|c| c.name == target || c.id.to_string() == target)
            .cloned()
            .ok_or_else(|| SendError::UnknownChannel(target.to_string()))?;
        self.switch_channel(channel);
        Ok(())
    }

    /// Tears down the previous channel's state, starts the first history
    /// load and joins the new room. Everything keyed to the previous
    /// activation is invalidated by bumping the epoch.
    pub fn switch_channel(&mut self, next: Channel) {
        if self.active_channel_id() == Some(next.id) {
            debug!("Channel {} already active", next.id);
            return;
        }

        if let Some(previous) = self.local_typing.stop() {
            self.emit_typing_stop(previous);
        }

        self.store.reset();
        self.pagination.reset();
        self.typing.clear();
        self.pending.clear();

        self.epoch += 1;
        let channel_id = next.id;
        info!("Switching to channel #{} ({})", next.name, channel_id);
        self.active = Some(ActiveChannel {
            channel: next,
            epoch: self.epoch,
        });

        let request = self.pagination.begin_initial(channel_id, self.epoch);
        self.fetcher.fetch_page(request);
        self.emit(ClientCommand::JoinChannel { channel_id });

        self.changes.push(Change::ChannelSwitched(channel_id));
    }

    /// Requests the next older page, unless history is exhausted or a page
    /// is already loading.
    pub fn load_more(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        if let Some(request) = self.pagination.begin_more(active.channel.id, active.epoch) {
            debug!(
                "Loading older messages for channel {} at offset {}",
                request.channel_id, request.query.offset
            );
            self.fetcher.fetch_page(request);
        }
    }

    pub fn create_channel(&mut self, name: &str) -> Result<(), SendError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SendError::EmptyChannelName);
        }
        self.fetcher.create_channel(name.to_string());
        Ok(())
    }

    // -- User input --

    /// A keystroke in the message input of the active channel.
    pub fn keystroke(&mut self, now: Instant) {
        let Some(channel_id) = self.active_channel_id() else {
            return;
        };
        if self.local_typing.keystroke(channel_id, now) {
            self.emit(ClientCommand::TypingStart(TypingSignal {
                channel_id,
                username: self.identity.username.clone(),
            }));
        }
    }

    /// Optimistically inserts the message and sends it. Returns the temp id
    /// the provisional entry is held under.
    pub fn submit(&mut self, content: &str, now: Instant) -> Result<TempId, SendError> {
        validate_content(content)?;
        let channel_id = self.active_channel_id().ok_or(SendError::NoActiveChannel)?;

        if let Some(typing_in) = self.local_typing.stop() {
            self.emit_typing_stop(typing_in);
        }

        let created_at = Utc::now();
        let temp_id = self
            .temp_ids
            .next(created_at.timestamp_millis().max(0) as u64);
        self.store.insert_provisional(StoredMessage::provisional(
            temp_id,
            content.to_string(),
            self.identity.username.clone(),
            channel_id,
            created_at,
        ));
        self.pending.track(temp_id, now);

        self.emit(ClientCommand::SendMessage {
            content: content.to_string(),
            channel_id,
            user_id: self.identity.user_id,
            temp_id: Some(temp_id),
        });
        self.changes.push(Change::MessagesUpdated);
        Ok(temp_id)
    }

    /// Asks the server to delete a message. The view only changes when the
    /// authoritative `message_deleted` arrives.
    pub fn request_delete(&mut self, message_id: MessageId) -> Result<(), SendError> {
        let channel_id = self.active_channel_id().ok_or(SendError::NoActiveChannel)?;
        self.emit(ClientCommand::DeleteMessage {
            message_id,
            channel_id,
            user_id: self.identity.user_id,
        });
        Ok(())
    }

    pub fn reject(&mut self, err: SendError) {
        self.changes.push(Change::Rejected(err));
    }

    pub fn show_search(&mut self, query: String) {
        self.changes.push(Change::SearchResults(query));
    }

    // -- Timers --

    /// Earliest instant at which `on_tick` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.local_typing.deadline(), self.pending.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        if let Some(channel_id) = self.local_typing.expire(now) {
            self.emit_typing_stop(channel_id);
        }

        for temp_id in self.pending.expire(now) {
            if self.store.mark_failed(temp_id) {
                warn!("Message {} got no echo in time", temp_id);
                self.changes.push(Change::SendFailed(temp_id));
            }
        }
    }

    // -- Gateway events --

    pub fn on_gateway(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Connected | GatewayEvent::Reconnected => {
                self.connected = true;
                // The gateway does not restore room subscriptions.
                if let Some(channel_id) = self.active_channel_id() {
                    info!("Rejoining channel {}", channel_id);
                    self.emit(ClientCommand::JoinChannel { channel_id });
                }
                self.changes.push(Change::Connection { online: true });
            }
            GatewayEvent::Disconnected => {
                self.connected = false;
                warn!("Gateway connection lost");
                self.changes.push(Change::Connection { online: false });
            }
            GatewayEvent::Server(event) => self.on_server_event(event),
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        if let Some(channel_id) = event.channel_id() {
            if self.active_channel_id() != Some(channel_id) {
                debug!(
                    "Dropping {} for inactive channel {}",
                    event.name(),
                    channel_id
                );
                return;
            }
        }

        match event {
            ServerEvent::NewMessage(msg) => self.on_new_message(msg),
            ServerEvent::StatusUpdate(StatusUpdate { user_id, is_online }) => {
                if self.roster.set_online(user_id, is_online) {
                    self.changes.push(Change::PresenceUpdated);
                }
            }
            ServerEvent::TypingStart(TypingSignal { username, .. }) => {
                if self.typing.start(&username) {
                    self.changes.push(Change::TypingUpdated);
                }
            }
            ServerEvent::TypingStop(TypingSignal { username, .. }) => {
                if self.typing.stop(&username) {
                    self.changes.push(Change::TypingUpdated);
                }
            }
            ServerEvent::MessageDeleted(MessageDeleted { id, .. }) => {
                if self.store.remove(id) {
                    self.changes.push(Change::MessagesUpdated);
                } else {
                    debug!("Deleted message {} not in view", id);
                }
            }
        }
    }

    fn on_new_message(&mut self, msg: Message) {
        let id = msg.id;
        match self.store.insert(msg) {
            InsertOutcome::Inserted => {
                self.pagination.note_live_insert();
                self.changes.push(Change::MessagesUpdated);
            }
            InsertOutcome::Reconciled(temp_id) => {
                self.pending.confirm(temp_id);
                self.pagination.note_live_insert();
                self.changes.push(Change::MessagesUpdated);
            }
            // Already counted when the page holding it arrived.
            InsertOutcome::Absorbed(temp_id) => {
                self.pending.confirm(temp_id);
                self.changes.push(Change::MessagesUpdated);
            }
            InsertOutcome::Duplicate => debug!("Duplicate delivery of message {}", id),
        }
    }

    // -- Fetch completions --

    pub fn on_page_loaded(&mut self, request: PageRequest, result: Result<Vec<Message>, ApiError>) {
        let current = self
            .active
            .as_ref()
            .is_some_and(|a| a.channel.id == request.channel_id && a.epoch == request.epoch);
        if !current {
            debug!(
                "Discarding stale page for channel {} (epoch {})",
                request.channel_id, request.epoch
            );
            return;
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!("History load for channel {} failed: {}", request.channel_id, e);
                self.pagination.fail();
                return;
            }
        };

        let returned = page.len();
        let merge = match request.kind {
            PageKind::Initial => {
                let merge = self.store.replace_with_page(page);
                self.pagination.complete_initial(returned, merge.live);
                merge
            }
            PageKind::Older => {
                let merge = self.store.append_older(page);
                self.pagination.complete_more(returned);
                merge
            }
        };
        for temp_id in merge.reconciled {
            self.pending.confirm(temp_id);
        }
        self.changes.push(Change::MessagesUpdated);
    }

    pub fn on_channels_loaded(&mut self, result: Result<Vec<Channel>, ApiError>) {
        let channels = match result {
            Ok(channels) => channels,
            Err(e) => {
                warn!("Channel list load failed: {}", e);
                return;
            }
        };

        self.channels = channels;
        self.changes.push(Change::ChannelsUpdated);

        if self.active.is_none() {
            if let Some(first) = self.channels.first().cloned() {
                self.switch_channel(first);
            }
        }
    }

    pub fn on_users_loaded(&mut self, result: Result<Vec<User>, ApiError>) {
        match result {
            Ok(users) => {
                self.roster.replace(users);
                self.changes.push(Change::PresenceUpdated);
            }
            Err(e) => warn!("User list load failed: {}", e),
        }
    }

    pub fn on_channel_created(&mut self, result: Result<Channel, ApiError>) {
        match result {
            Ok(channel) => {
                info!("Created channel #{} ({})", channel.name, channel.id);
                self.fetcher.fetch_channels();
            }
            Err(e) => warn!("Channel creation failed: {}", e),
        }
    }

    // -- Helpers --

    fn emit_typing_stop(&self, channel_id: ChannelId) {
        self.emit(ClientCommand::TypingStop(TypingSignal {
            channel_id,
            username: self.identity.username.clone(),
        }));
    }

    fn emit(&self, command: ClientCommand) {
        let name = command.name();
        if let Err(e) = self.sink.emit(command) {
            warn!("Could not emit {}: {}", name, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use teachat_api::StatusCode;
    use teachat_types::api::{MESSAGE_PAGE_SIZE, MessagePageQuery};

    use super::*;
    use crate::store::tests::confirmed;
    use crate::store::{DeliveryState, MessageKey};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum FetchCall {
        Page(PageRequest),
        Channels,
        Users,
        Create(String),
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink(pub Arc<Mutex<Vec<ClientCommand>>>);

    impl RecordingSink {
        pub(crate) fn take(&self) -> Vec<ClientCommand> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl CommandSink for RecordingSink {
        fn emit(&self, command: ClientCommand) -> Result<(), teachat_gateway::GatewayError> {
            self.0.lock().unwrap().push(command);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingFetcher(pub Arc<Mutex<Vec<FetchCall>>>);

    impl RecordingFetcher {
        pub(crate) fn take(&self) -> Vec<FetchCall> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }

        fn last_page(&self) -> PageRequest {
            self.0
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find_map(|call| match call {
                    FetchCall::Page(req) => Some(*req),
                    _ => None,
                })
                .expect("no page request recorded")
        }
    }

    impl Fetcher for RecordingFetcher {
        fn fetch_page(&self, request: PageRequest) {
            self.0.lock().unwrap().push(FetchCall::Page(request));
        }
        fn fetch_channels(&self) {
            self.0.lock().unwrap().push(FetchCall::Channels);
        }
        fn fetch_users(&self) {
            self.0.lock().unwrap().push(FetchCall::Users);
        }
        fn create_channel(&self, name: String) {
            self.0.lock().unwrap().push(FetchCall::Create(name));
        }
    }

    pub(crate) fn channel(id: ChannelId, name: &str) -> Channel {
        Channel {
            id,
            name: name.into(),
            description: None,
        }
    }

    fn session() -> (ChannelSession, RecordingSink, RecordingFetcher) {
        let sink = RecordingSink::default();
        let fetcher = RecordingFetcher::default();
        let session = ChannelSession::new(
            Identity {
                user_id: 1,
                username: "me".into(),
            },
            Box::new(sink.clone()),
            Box::new(fetcher.clone()),
            SessionOptions::default(),
        );
        (session, sink, fetcher)
    }

    fn in_channel(msg: Message, channel_id: ChannelId) -> Message {
        Message { channel_id, ..msg }
    }

    /// `count` messages newest-first, ids and timestamps descending from `top`.
    fn page(channel_id: ChannelId, top: i64, count: usize) -> Vec<Message> {
        (0..count as i64)
            .map(|i| in_channel(confirmed(top - i, "m", "bob", top - i), channel_id))
            .collect()
    }

    fn new_message(msg: Message) -> GatewayEvent {
        GatewayEvent::Server(ServerEvent::NewMessage(msg))
    }

    fn typing_start(channel_id: ChannelId, username: &str) -> GatewayEvent {
        GatewayEvent::Server(ServerEvent::TypingStart(TypingSignal {
            channel_id,
            username: username.into(),
        }))
    }

    fn deleted(id: MessageId, channel_id: ChannelId) -> GatewayEvent {
        GatewayEvent::Server(ServerEvent::MessageDeleted(MessageDeleted { id, channel_id }))
    }

    #[test]
    fn first_listed_channel_is_activated() {
        let (mut s, sink, fetcher) = session();
        s.refresh();
        assert_eq!(fetcher.take(), vec![FetchCall::Channels, FetchCall::Users]);

        s.on_channels_loaded(Ok(vec![channel(1, "general"), channel(2, "random")]));
        assert_eq!(s.active_channel_id(), Some(1));
        assert_eq!(sink.take(), vec![ClientCommand::JoinChannel { channel_id: 1 }]);
        assert_eq!(
            fetcher.take(),
            vec![FetchCall::Page(PageRequest {
                channel_id: 1,
                epoch: 1,
                kind: PageKind::Initial,
                query: MessagePageQuery { limit: 20, offset: 0 },
            })]
        );
        assert_eq!(
            s.take_changes(),
            vec![Change::ChannelsUpdated, Change::ChannelSwitched(1)]
        );
    }

    #[test]
    fn optimistic_send_reconciles_with_echo() {
        let (mut s, sink, _) = session();
        s.switch_channel(channel(1, "general"));
        sink.take();

        let now = Instant::now();
        let temp_id = s.submit("hello", now).unwrap();
        assert_eq!(s.store().len(), 1);
        assert_eq!(s.pending_sends(), 1);
        assert_eq!(
            sink.take(),
            vec![ClientCommand::SendMessage {
                content: "hello".into(),
                channel_id: 1,
                user_id: 1,
                temp_id: Some(temp_id),
            }]
        );

        // Echo without a temp id falls back to content matching.
        s.on_gateway(new_message(in_channel(confirmed(77, "hello", "me", 5), 1)));
        assert_eq!(s.store().len(), 1);
        let entry = s.store().iter().next().unwrap();
        assert_eq!(entry.key, MessageKey::Confirmed(77));
        assert_eq!(entry.state, DeliveryState::Confirmed);
        assert_eq!(s.pending_sends(), 0);

        // A redelivery of the echo changes nothing.
        s.on_gateway(new_message(in_channel(confirmed(77, "hello", "me", 5), 1)));
        assert_eq!(s.store().len(), 1);
    }

    #[test]
    fn submit_validates_before_sending() {
        let (mut s, sink, _) = session();
        assert_eq!(
            s.submit("hi", Instant::now()),
            Err(SendError::NoActiveChannel)
        );
        s.switch_channel(channel(1, "general"));
        sink.take();
        assert_eq!(s.submit("  ", Instant::now()), Err(SendError::EmptyContent));
        assert!(sink.take().is_empty());
        assert!(s.store().is_empty());
    }

    #[test]
    fn initial_then_older_page_stays_ordered() {
        let (mut s, _, fetcher) = session();
        s.switch_channel(channel(1, "general"));
        let initial = fetcher.last_page();
        s.on_page_loaded(initial, Ok(page(1, 100, 20)));

        s.load_more();
        let older = fetcher.last_page();
        assert_eq!(older.kind, PageKind::Older);
        assert_eq!(older.query.offset, 20);
        s.on_page_loaded(older, Ok(page(1, 80, 20)));

        let entries: Vec<_> = s.store().iter().collect();
        assert_eq!(entries.len(), 40);
        assert!(entries.windows(2).all(|w| w[0].created_at > w[1].created_at));
        assert_eq!(entries[19].id(), Some(81));
        assert_eq!(entries[20].id(), Some(80));
        assert_eq!(s.cursor().offset, 40);
        assert!(s.cursor().has_more);
    }

    #[test]
    fn short_page_stops_pagination() {
        let (mut s, _, fetcher) = session();
        s.switch_channel(channel(1, "general"));
        s.on_page_loaded(fetcher.last_page(), Ok(page(1, 100, 20)));
        s.load_more();
        s.on_page_loaded(fetcher.last_page(), Ok(page(1, 80, 5)));
        assert!(!s.cursor().has_more);

        fetcher.take();
        s.load_more();
        assert!(fetcher.take().is_empty());
        assert_eq!(s.store().len(), 25);
    }

    #[test]
    fn load_more_waits_for_in_flight_page() {
        let (mut s, _, fetcher) = session();
        s.switch_channel(channel(1, "general"));
        fetcher.take();
        s.load_more();
        assert!(fetcher.take().is_empty());
    }

    #[test]
    fn switching_resets_channel_state() {
        let (mut s, sink, fetcher) = session();
        s.switch_channel(channel(1, "a"));
        s.on_page_loaded(fetcher.last_page(), Ok(page(1, 100, 20)));
        s.load_more();
        s.on_page_loaded(fetcher.last_page(), Ok(page(1, 80, 20)));
        s.on_gateway(typing_start(1, "tess"));
        s.keystroke(Instant::now());
        assert!(s.typing().contains("tess"));
        assert_eq!(s.store().len(), 40);
        sink.take();

        s.switch_channel(channel(2, "b"));
        assert!(s.store().is_empty());
        assert!(s.typing().is_empty());
        assert_eq!(s.cursor(), PaginationCursor::default());
        assert!(s.is_loading_history());
        assert_eq!(
            sink.take(),
            vec![
                ClientCommand::TypingStop(TypingSignal {
                    channel_id: 1,
                    username: "me".into()
                }),
                ClientCommand::JoinChannel { channel_id: 2 },
            ]
        );
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn stale_page_does_not_touch_new_channel() {
        let (mut s, _, fetcher) = session();
        s.switch_channel(channel(1, "a"));
        let for_a = fetcher.last_page();

        s.switch_channel(channel(2, "b"));
        s.on_gateway(new_message(in_channel(confirmed(500, "in b", "bob", 500), 2)));
        s.on_page_loaded(for_a, Ok(page(1, 100, 20)));

        assert_eq!(s.store().len(), 1);
        assert_eq!(s.store().iter().next().unwrap().channel_id, 2);
        assert!(s.is_loading_history());
    }

    #[test]
    fn page_from_earlier_visit_is_stale() {
        let (mut s, _, fetcher) = session();
        s.switch_channel(channel(1, "a"));
        let first_visit = fetcher.last_page();
        s.switch_channel(channel(2, "b"));
        s.switch_channel(channel(1, "a"));

        s.on_page_loaded(first_visit, Ok(page(1, 100, 20)));
        assert!(s.store().is_empty());

        s.on_page_loaded(fetcher.last_page(), Ok(page(1, 100, 3)));
        assert_eq!(s.store().len(), 3);
    }

    #[test]
    fn events_for_other_channels_are_dropped() {
        let (mut s, _, _) = session();
        s.switch_channel(channel(1, "a"));
        s.take_changes();

        s.on_gateway(new_message(in_channel(confirmed(9, "x", "bob", 9), 2)));
        s.on_gateway(typing_start(2, "bob"));
        assert!(s.store().is_empty());
        assert!(s.typing().is_empty());
        assert!(s.take_changes().is_empty());
    }

    #[test]
    fn deletion_is_idempotent_and_order_tolerant() {
        let (mut s, _, _) = session();
        s.switch_channel(channel(1, "a"));

        // Deletion observed before the message itself.
        s.on_gateway(deleted(3, 1));
        assert!(s.store().is_empty());

        s.on_gateway(new_message(in_channel(confirmed(3, "x", "bob", 3), 1)));
        s.on_gateway(new_message(in_channel(confirmed(4, "y", "bob", 4), 1)));
        s.on_gateway(deleted(3, 1));
        s.on_gateway(deleted(3, 1));
        assert_eq!(s.store().len(), 1);
        assert_eq!(s.store().iter().next().unwrap().id(), Some(4));
    }

    #[test]
    fn request_delete_emits_command_only() {
        let (mut s, sink, _) = session();
        s.switch_channel(channel(1, "a"));
        s.on_gateway(new_message(in_channel(confirmed(3, "x", "me", 3), 1)));
        sink.take();

        s.request_delete(3).unwrap();
        assert_eq!(
            sink.take(),
            vec![ClientCommand::DeleteMessage {
                message_id: 3,
                channel_id: 1,
                user_id: 1
            }]
        );
        assert_eq!(s.store().len(), 1);
    }

    #[test]
    fn typing_burst_emits_one_start_and_one_stop() {
        let (mut s, sink, _) = session();
        s.switch_channel(channel(1, "a"));
        sink.take();

        let t0 = Instant::now();
        let ms = Duration::from_millis;
        s.keystroke(t0);
        s.keystroke(t0 + ms(700));
        s.keystroke(t0 + ms(1500));
        assert_eq!(s.next_deadline(), Some(t0 + ms(3500)));

        s.on_tick(t0 + ms(3000));
        s.on_tick(t0 + ms(3500));
        s.on_tick(t0 + ms(6000));

        let signal = TypingSignal {
            channel_id: 1,
            username: "me".into(),
        };
        assert_eq!(
            sink.take(),
            vec![
                ClientCommand::TypingStart(signal.clone()),
                ClientCommand::TypingStop(signal),
            ]
        );
    }

    #[test]
    fn submit_stops_typing_immediately() {
        let (mut s, sink, _) = session();
        s.switch_channel(channel(1, "a"));
        sink.take();

        let t0 = Instant::now();
        s.keystroke(t0);
        s.submit("done", t0).unwrap();
        s.on_tick(t0 + Duration::from_millis(2500));

        let names: Vec<_> = sink.take().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["typing_start", "typing_stop", "send_message"]);
    }

    #[test]
    fn own_typing_echo_is_ignored() {
        let (mut s, _, _) = session();
        s.switch_channel(channel(1, "a"));
        s.on_gateway(typing_start(1, "me"));
        assert!(s.typing().is_empty());
    }

    #[test]
    fn missing_echo_marks_message_failed() {
        let (mut s, _, _) = session();
        s.switch_channel(channel(1, "a"));
        s.take_changes();

        let t0 = Instant::now();
        let temp_id = s.submit("anyone?", t0).unwrap();
        assert_eq!(s.next_deadline(), Some(t0 + SEND_TIMEOUT));

        s.on_tick(t0 + SEND_TIMEOUT);
        assert_eq!(
            s.store().get_provisional(temp_id).unwrap().state,
            DeliveryState::Failed
        );
        assert_eq!(
            s.take_changes(),
            vec![Change::MessagesUpdated, Change::SendFailed(temp_id)]
        );
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn reconnect_rejoins_active_channel() {
        let (mut s, sink, _) = session();
        s.on_gateway(GatewayEvent::Connected);
        assert!(sink.take().is_empty());

        s.switch_channel(channel(5, "a"));
        sink.take();
        s.on_gateway(GatewayEvent::Disconnected);
        assert!(!s.is_connected());
        s.on_gateway(GatewayEvent::Reconnected);
        assert!(s.is_connected());
        assert_eq!(sink.take(), vec![ClientCommand::JoinChannel { channel_id: 5 }]);
    }

    #[test]
    fn live_messages_shift_history_offset() {
        let (mut s, _, fetcher) = session();
        s.switch_channel(channel(1, "a"));
        s.on_gateway(new_message(in_channel(confirmed(200, "early", "bob", 200), 1)));
        s.on_page_loaded(fetcher.last_page(), Ok(page(1, 100, MESSAGE_PAGE_SIZE as usize)));
        assert_eq!(s.store().len(), 21);
        assert_eq!(s.cursor().offset, 21);

        s.on_gateway(new_message(in_channel(confirmed(201, "later", "bob", 201), 1)));
        assert_eq!(s.cursor().offset, 22);
        assert_eq!(s.store().iter().next().unwrap().id(), Some(201));
    }

    #[test]
    fn late_arrival_inside_window_still_shifts_offset() {
        let (mut s, _, fetcher) = session();
        s.switch_channel(channel(1, "a"));
        s.on_page_loaded(fetcher.last_page(), Ok(page(1, 100, MESSAGE_PAGE_SIZE as usize)));
        assert_eq!(s.cursor().offset, 20);

        // Sorts between loaded rows here and on the server alike.
        s.on_gateway(new_message(in_channel(confirmed(300, "late", "bob", 90), 1)));
        assert_eq!(s.store().iter().position(|e| e.id() == Some(300)), Some(10));
        assert_eq!(s.cursor().offset, 21);
    }

    #[test]
    fn send_saved_before_first_page_is_not_reported_failed() {
        let (mut s, _, fetcher) = session();
        s.switch_channel(channel(1, "a"));
        let t0 = Instant::now();
        let temp_id = s.submit("hi", t0).unwrap();

        let saved = in_channel(confirmed(50, "hi", "me", 100), 1);
        let mut first_page = vec![saved.clone()];
        first_page.extend(page(1, 49, 5));
        s.on_page_loaded(fetcher.last_page(), Ok(first_page));
        s.on_gateway(new_message(saved));
        s.take_changes();

        s.on_tick(t0 + SEND_TIMEOUT);
        assert_eq!(s.store().len(), 6);
        assert_eq!(s.store().iter().next().unwrap().key, MessageKey::Confirmed(50));
        assert!(s.store().get_provisional(temp_id).is_none());
        assert_eq!(s.pending_sends(), 0);
        assert!(s.take_changes().is_empty());
    }

    #[test]
    fn failed_history_load_can_be_retried() {
        let (mut s, _, fetcher) = session();
        s.switch_channel(channel(1, "a"));
        s.on_page_loaded(fetcher.last_page(), Ok(page(1, 100, 20)));
        s.load_more();
        let req = fetcher.last_page();
        s.on_page_loaded(
            req,
            Err(ApiError::Status {
                url: "http://test/messages/1".into(),
                status: StatusCode::BAD_GATEWAY,
            }),
        );
        assert_eq!(s.store().len(), 20);
        assert!(!s.is_loading_history());

        fetcher.take();
        s.load_more();
        assert_eq!(fetcher.last_page().query.offset, 20);
    }

    #[test]
    fn presence_updates_roster() {
        let (mut s, _, _) = session();
        s.on_users_loaded(Ok(vec![User {
            id: 8,
            username: "bob".into(),
            is_online: false,
        }]));
        s.on_gateway(GatewayEvent::Server(ServerEvent::StatusUpdate(StatusUpdate {
            user_id: 8,
            is_online: true,
        })));
        assert!(s.roster().get(8).unwrap().is_online);
    }

    #[test]
    fn created_channel_refreshes_directory() {
        let (mut s, _, fetcher) = session();
        assert_eq!(s.create_channel("  "), Err(SendError::EmptyChannelName));
        s.create_channel(" random ").unwrap();
        assert_eq!(fetcher.take(), vec![FetchCall::Create("random".into())]);

        s.on_channel_created(Ok(channel(3, "random")));
        assert_eq!(fetcher.take(), vec![FetchCall::Channels]);
    }

    #[test]
    fn switch_to_accepts_name_or_id() {
        let (mut s, _, _) = session();
        s.on_channels_loaded(Ok(vec![channel(1, "general"), channel(2, "random")]));
        s.switch_to("#random").unwrap();
        assert_eq!(s.active_channel_id(), Some(2));
        s.switch_to("1").unwrap();
        assert_eq!(s.active_channel_id(), Some(1));
        assert_eq!(
            s.switch_to("nope"),
            Err(SendError::UnknownChannel("nope".into()))
        );
    }
}
