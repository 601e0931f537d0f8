use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use teachat_api::ApiError;
use teachat_gateway::GatewayEvent;
use teachat_types::{Channel, Message, MessageId, User};

use crate::pagination::PageRequest;
use crate::session::{Change, ChannelSession};

/// Something the user did in the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Keystroke,
    Submit(String),
    SwitchChannel(String),
    LoadMore,
    Delete(MessageId),
    CreateChannel(String),
    Refresh,
    Search(String),
    Quit,
}

/// Everything that can mutate the session, other than gateway events and
/// timers which the runtime watches directly.
#[derive(Debug)]
pub enum SessionInput {
    PageLoaded {
        request: PageRequest,
        result: Result<Vec<Message>, ApiError>,
    },
    ChannelsLoaded(Result<Vec<Channel>, ApiError>),
    UsersLoaded(Result<Vec<User>, ApiError>),
    ChannelCreated(Result<Channel, ApiError>),
    User(UserAction),
}

/// Redraw hook, called on the runtime's task after each handled input.
pub trait View: Send {
    fn render(&mut self, session: &ChannelSession, change: &Change);
}

/// The single logical thread: every mutation of the session happens here,
/// one input at a time.
pub struct Runtime<V: View> {
    session: ChannelSession,
    view: V,
}

impl<V: View> Runtime<V> {
    pub fn new(session: ChannelSession, view: V) -> Self {
        Self { session, view }
    }

    /// Runs until the user quits or the input queue closes.
    pub async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<SessionInput>,
        mut gateway: mpsc::UnboundedReceiver<GatewayEvent>,
    ) -> ChannelSession {
        let mut gateway_open = true;
        self.session.refresh();
        self.flush();

        loop {
            let deadline = self.session.next_deadline();

            tokio::select! {
                input = inputs.recv() => match input {
                    Some(SessionInput::User(UserAction::Quit)) | None => break,
                    Some(input) => self.apply(input, Instant::now()),
                },
                event = gateway.recv(), if gateway_open => match event {
                    Some(event) => self.session.on_gateway(event),
                    None => {
                        warn!("Gateway event stream ended");
                        gateway_open = false;
                    }
                },
                _ = sleep_until(deadline) => self.session.on_tick(Instant::now()),
            }

            self.flush();
        }

        info!("Session loop stopped");
        self.session
    }

    fn apply(&mut self, input: SessionInput, now: Instant) {
        let session = &mut self.session;
        match input {
            SessionInput::PageLoaded { request, result } => session.on_page_loaded(request, result),
            SessionInput::ChannelsLoaded(result) => session.on_channels_loaded(result),
            SessionInput::UsersLoaded(result) => session.on_users_loaded(result),
            SessionInput::ChannelCreated(result) => session.on_channel_created(result),
            SessionInput::User(action) => {
                debug!("User action: {:?}", action);
                let outcome = match action {
                    UserAction::Keystroke => {
                        session.keystroke(now);
                        Ok(())
                    }
                    UserAction::Submit(content) => session.submit(&content, now).map(|_| ()),
                    UserAction::SwitchChannel(target) => session.switch_to(&target),
                    UserAction::LoadMore => {
                        session.load_more();
                        Ok(())
                    }
                    UserAction::Delete(id) => session.request_delete(id),
                    UserAction::CreateChannel(name) => session.create_channel(&name),
                    UserAction::Refresh => {
                        session.refresh();
                        Ok(())
                    }
                    UserAction::Search(query) => {
                        session.show_search(query);
                        Ok(())
                    }
                    UserAction::Quit => Ok(()),
                };
                if let Err(err) = outcome {
                    session.reject(err);
                }
            }
        }
    }

    fn flush(&mut self) {
        for change in self.session.take_changes() {
            self.view.render(&self.session, &change);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
