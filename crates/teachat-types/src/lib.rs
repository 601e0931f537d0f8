pub mod api;
pub mod events;
pub mod models;

pub use events::{ClientCommand, ServerEvent};
pub use models::{Channel, ChannelId, Message, MessageId, TempId, User, UserId};
