//! Message synchronization core: reconciles optimistic sends, pushed gateway
//! events and paginated history into one view of the active channel.

pub mod error;
pub mod fetch;
pub mod pagination;
pub mod presence;
pub mod runtime;
pub mod send;
pub mod session;
pub mod sink;
pub mod store;
pub mod typing;

pub use error::SendError;
pub use runtime::{Runtime, SessionInput, UserAction, View};
pub use session::{Change, ChannelSession, Identity};
pub use store::{DeliveryState, MessageKey, MessageStore, StoredMessage};
