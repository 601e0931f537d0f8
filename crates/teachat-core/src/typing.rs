use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;

use teachat_types::ChannelId;

/// Quiet period after the last keystroke before `typing_stop` is sent.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Single cancellable deadline. Rescheduling always replaces the previous
/// deadline, so at most one timer is ever live.
#[derive(Debug)]
pub struct DebounceTimer {
    period: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    pub fn reschedule(&mut self, now: Instant) {
        self.cancel();
        self.deadline = Some(now + self.period);
    }

    /// Returns true if a timer was live.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_live(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consumes the timer if its deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Local side: Idle until a keystroke, Typing until the debounce expires or
/// the message is submitted.
#[derive(Debug)]
pub struct LocalTyping {
    timer: DebounceTimer,
    channel: Option<ChannelId>,
}

impl Default for LocalTyping {
    fn default() -> Self {
        Self::new(TYPING_DEBOUNCE)
    }
}

impl LocalTyping {
    pub fn new(period: Duration) -> Self {
        Self {
            timer: DebounceTimer::new(period),
            channel: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.timer.is_live()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Records a keystroke in `channel`. Returns true when this keystroke
    /// starts a typing burst and `typing_start` should be sent.
    pub fn keystroke(&mut self, channel: ChannelId, now: Instant) -> bool {
        let started = !self.timer.is_live() || self.channel != Some(channel);
        self.channel = Some(channel);
        self.timer.reschedule(now);
        started
    }

    /// Ends the burst immediately. Returns the channel `typing_stop` should
    /// go to, if a burst was live.
    pub fn stop(&mut self) -> Option<ChannelId> {
        if self.timer.cancel() {
            self.channel.take()
        } else {
            None
        }
    }

    /// Ends the burst if the debounce elapsed.
    pub fn expire(&mut self, now: Instant) -> Option<ChannelId> {
        if self.timer.fire_if_due(now) {
            self.channel.take()
        } else {
            None
        }
    }
}

/// Remote side: display names currently typing in the active channel.
/// Entries leave only on an explicit stop or a channel reset.
#[derive(Debug)]
pub struct TypingSet {
    local_username: String,
    users: BTreeSet<String>,
}

impl TypingSet {
    pub fn new(local_username: impl Into<String>) -> Self {
        Self {
            local_username: local_username.into(),
            users: BTreeSet::new(),
        }
    }

    pub fn start(&mut self, username: &str) -> bool {
        if username == self.local_username {
            return false;
        }
        self.users.insert(username.to_string())
    }

    pub fn stop(&mut self, username: &str) -> bool {
        self.users.remove(username)
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains(username)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }
}
