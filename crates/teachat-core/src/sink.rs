use teachat_gateway::{GatewayError, GatewayHandle};
use teachat_types::ClientCommand;

use crate::pagination::PageRequest;

/// Outbound half of the event channel, injected into the session.
pub trait CommandSink: Send {
    fn emit(&self, command: ClientCommand) -> Result<(), GatewayError>;
}

impl CommandSink for GatewayHandle {
    fn emit(&self, command: ClientCommand) -> Result<(), GatewayError> {
        GatewayHandle::emit(self, command)
    }
}

/// Fire-and-forget REST requests. Results come back later as session inputs.
pub trait Fetcher: Send {
    fn fetch_page(&self, request: PageRequest);
    fn fetch_channels(&self);
    fn fetch_users(&self);
    fn create_channel(&self, name: String);
}
