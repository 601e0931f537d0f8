use thiserror::Error;

/// Why a user action was refused locally, before anything reached the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyContent,

    #[error("no channel is active")]
    NoActiveChannel,

    #[error("channel name is empty")]
    EmptyChannelName,

    #[error("no channel named '{0}'")]
    UnknownChannel(String),
}
