use tokio::sync::mpsc;

use teachat_api::RestClient;

use crate::pagination::PageRequest;
use crate::runtime::SessionInput;
use crate::sink::Fetcher;

/// Runs each REST call on its own task and posts the completion back into
/// the session's input queue.
#[derive(Clone)]
pub struct RestFetcher {
    api: RestClient,
    inputs: mpsc::UnboundedSender<SessionInput>,
}

impl RestFetcher {
    pub fn new(api: RestClient, inputs: mpsc::UnboundedSender<SessionInput>) -> Self {
        Self { api, inputs }
    }
}

impl Fetcher for RestFetcher {
    fn fetch_page(&self, request: PageRequest) {
        let api = self.api.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = api.fetch_messages(request.channel_id, request.query).await;
            let _ = inputs.send(SessionInput::PageLoaded { request, result });
        });
    }

    fn fetch_channels(&self) {
        let api = self.api.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = api.list_channels().await;
            let _ = inputs.send(SessionInput::ChannelsLoaded(result));
        });
    }

    fn fetch_users(&self) {
        let api = self.api.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = api.list_users().await;
            let _ = inputs.send(SessionInput::UsersLoaded(result));
        });
    }

    fn create_channel(&self, name: String) {
        let api = self.api.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = api.create_channel(&name).await;
            let _ = inputs.send(SessionInput::ChannelCreated(result));
        });
    }
}
