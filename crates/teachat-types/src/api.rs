use serde::{Deserialize, Serialize};

/// Fixed history page size for `GET /messages/{channel_id}`.
pub const MESSAGE_PAGE_SIZE: u32 = 20;

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePageQuery {
    pub limit: u32,
    pub offset: u32,
}

impl MessagePageQuery {
    pub fn at(offset: u32) -> Self {
        Self {
            limit: MESSAGE_PAGE_SIZE,
            offset,
        }
    }
}

// -- Channels --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
