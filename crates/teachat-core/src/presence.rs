use tracing::debug;

use teachat_types::{User, UserId};

/// Known users and their online state, keyed by user id.
#[derive(Debug, Default)]
pub struct Roster {
    users: Vec<User>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, users: Vec<User>) {
        self.users = users;
    }

    /// Applies a `status_update`. Unknown ids are ignored.
    pub fn set_online(&mut self, user_id: UserId, is_online: bool) -> bool {
        match self.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.is_online = is_online;
                true
            }
            None => {
                debug!("Presence update for unknown user {}", user_id);
                false
            }
        }
    }

    pub fn get(&self, user_id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.users.iter().filter(|u| u.is_online).count()
    }
}
