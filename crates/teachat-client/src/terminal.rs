use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use teachat_core::{Change, ChannelSession, DeliveryState, SessionInput, StoredMessage, UserAction, View};

/// How many of the newest messages are redrawn on each timeline change.
const TIMELINE_ROWS: usize = 20;

/// Reads stdin line by line and turns each line into user actions.
pub async fn read_input(inputs: mpsc::UnboundedSender<SessionInput>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        for action in parse_line(&line) {
            let quit = action == UserAction::Quit;
            if inputs.send(SessionInput::User(action)).is_err() || quit {
                return;
            }
        }
    }
    debug!("stdin closed");
    let _ = inputs.send(SessionInput::User(UserAction::Quit));
}

pub fn parse_line(line: &str) -> Vec<UserAction> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(command) = line.strip_prefix('/') else {
        if line.trim().is_empty() {
            return Vec::new();
        }
        return vec![UserAction::Keystroke, UserAction::Submit(line.to_string())];
    };

    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    let action = match name {
        "join" => UserAction::SwitchChannel(arg.to_string()),
        "more" => UserAction::LoadMore,
        "delete" => match arg.parse() {
            Ok(id) => UserAction::Delete(id),
            Err(_) => return Vec::new(),
        },
        "create" => UserAction::CreateChannel(arg.to_string()),
        "channels" | "users" => UserAction::Refresh,
        "search" => UserAction::Search(arg.to_string()),
        "quit" | "exit" => UserAction::Quit,
        _ => return Vec::new(),
    };
    vec![action]
}

/// Line-oriented renderer on stdout.
pub struct TerminalView;

impl View for TerminalView {
    fn render(&mut self, session: &ChannelSession, change: &Change) {
        let mut out = std::io::stdout().lock();
        for line in render_lines(session, change) {
            let _ = writeln!(out, "{}", line);
        }
    }
}

pub fn render_lines(session: &ChannelSession, change: &Change) -> Vec<String> {
    match change {
        Change::Connection { online: true } => vec!["* connected".into()],
        Change::Connection { online: false } => vec!["* connection lost, reconnecting".into()],
        Change::ChannelsUpdated => {
            let active = session.active_channel_id();
            let names: Vec<String> = session
                .channels()
                .iter()
                .map(|c| {
                    let marker = if Some(c.id) == active { "*" } else { "" };
                    format!("{}#{} ({})", marker, c.name, c.id)
                })
                .collect();
            vec![format!("channels: {}", names.join("  "))]
        }
        Change::ChannelSwitched(_) => match session.active_channel() {
            Some(channel) => vec![format!("== #{} ==", channel.name)],
            None => Vec::new(),
        },
        Change::MessagesUpdated => {
            let mut rows: Vec<String> = session
                .store()
                .iter()
                .take(TIMELINE_ROWS)
                .map(format_message)
                .collect();
            rows.reverse();
            if session.cursor().has_more {
                rows.insert(0, "-- /more for older messages --".into());
            }
            rows
        }
        Change::TypingUpdated => {
            let names: Vec<&str> = session.typing().iter().collect();
            match names.len() {
                0 => Vec::new(),
                1 => vec![format!("{} is typing...", names[0])],
                _ => vec![format!("{} are typing...", names.join(", "))],
            }
        }
        Change::PresenceUpdated => {
            let roster = session.roster();
            let online: Vec<&str> = roster
                .iter()
                .filter(|u| u.is_online)
                .map(|u| u.username.as_str())
                .collect();
            vec![format!(
                "online ({}/{}): {}",
                online.len(),
                roster.len(),
                online.join(", ")
            )]
        }
        Change::SendFailed(temp_id) => match session.store().get_provisional(*temp_id) {
            Some(entry) => vec![format!("! not delivered: {}", entry.content)],
            None => Vec::new(),
        },
        Change::Rejected(err) => vec![format!("! {}", err)],
        Change::SearchResults(query) => {
            let hits = session.search(query);
            let mut rows = vec![format!("search '{}': {} match(es)", query, hits.len())];
            rows.extend(hits.into_iter().map(format_message));
            rows
        }
    }
}

fn format_message(entry: &StoredMessage) -> String {
    let marker = match entry.state {
        DeliveryState::Confirmed => "",
        DeliveryState::Pending => " (sending)",
        DeliveryState::Failed => " (failed)",
    };
    let id = entry.id().map(|id| format!(" #{}", id)).unwrap_or_default();
    format!(
        "[{}]{} {}: {}{}",
        entry.created_at.format("%H:%M"),
        id,
        entry.sender,
        entry.content,
        marker
    )
}
