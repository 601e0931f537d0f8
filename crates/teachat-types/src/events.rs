use serde::{Deserialize, Serialize};

use crate::models::{ChannelId, Message, MessageId, TempId, UserId, flexible_id};

/// Events pushed FROM server TO client over the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A message was persisted and broadcast to the channel room
    NewMessage(Message),

    /// A user came online or went offline
    StatusUpdate(StatusUpdate),

    /// Another user started typing
    TypingStart(TypingSignal),

    /// Another user stopped typing
    TypingStop(TypingSignal),

    /// A message was removed by its author
    MessageDeleted(MessageDeleted),
}

impl ServerEvent {
    /// Returns the channel_id if this event is scoped to a specific channel.
    /// Presence updates are global and return `None`.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Self::NewMessage(msg) => Some(msg.channel_id),
            Self::TypingStart(sig) | Self::TypingStop(sig) => Some(sig.channel_id),
            Self::MessageDeleted(del) => Some(del.channel_id),
            Self::StatusUpdate(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::StatusUpdate(_) => "status_update",
            Self::TypingStart(_) => "typing_start",
            Self::TypingStop(_) => "typing_stop",
            Self::MessageDeleted(_) => "message_deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: UserId,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    #[serde(deserialize_with = "flexible_id")]
    pub channel_id: ChannelId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleted {
    #[serde(deserialize_with = "flexible_id")]
    pub id: MessageId,
    #[serde(deserialize_with = "flexible_id")]
    pub channel_id: ChannelId,
}

/// Commands sent FROM client TO server over the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Subscribe this connection to a channel room
    JoinChannel { channel_id: ChannelId },

    /// Persist and broadcast a new message
    SendMessage {
        content: String,
        channel_id: ChannelId,
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<TempId>,
    },

    TypingStart(TypingSignal),

    TypingStop(TypingSignal),

    /// Ask the server to delete one of our own messages
    DeleteMessage {
        message_id: MessageId,
        channel_id: ChannelId,
        user_id: UserId,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChannel { .. } => "join_channel",
            Self::SendMessage { .. } => "send_message",
            Self::TypingStart(_) => "typing_start",
            Self::TypingStop(_) => "typing_stop",
            Self::DeleteMessage { .. } => "delete_message",
        }
    }
}
