//! Event formatting for terminal display.

use crate::common::time::unix_to_jst_clock;
use crate::domain::{ChatMessage, Heartbeat, HeartbeatStatus, PostStatus, Rank};
use crate::listener::CloseReason;
use crate::session::SessionEvent;

/// Event formatter for terminal display
pub struct EventFormatter;

impl EventFormatter {
    /// Format one session event as a display line, `None` for events that
    /// have no terminal representation of their own.
    pub fn format_event(event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::Prepared {
                live, community, ..
            } => {
                let title = live.title.as_deref().unwrap_or("(untitled)");
                let level = community
                    .level
                    .map(|level| level.to_string())
                    .unwrap_or_else(|| "?".to_string());
                Some(format!(
                    "* connected to {} \"{}\" (community level {})",
                    live.live_id, title, level
                ))
            }
            SessionEvent::ListeningStarted { room } => {
                Some(format!("* listening on {}", room))
            }
            SessionEvent::FirstChat(chat) => {
                Some(format!("* first chat arrived on {}", chat.room))
            }
            SessionEvent::Chat(chat) => Some(Self::format_chat(chat)),
            SessionEvent::PostResult { result, .. } => match result.status {
                PostStatus::Accepted => Some("* comment accepted".to_string()),
                PostStatus::Rejected(code) => {
                    Some(format!("* comment rejected (status {})", code))
                }
            },
            SessionEvent::Heartbeat(heartbeat) => Some(Self::format_heartbeat(heartbeat)),
            SessionEvent::RoomClosed { room, reason } => match reason {
                CloseReason::Requested => None,
                CloseReason::EndOfStream => Some(format!("* {} closed by the server", room)),
                CloseReason::TransportError(detail) => {
                    Some(format!("* {} lost: {}", room, detail))
                }
            },
            SessionEvent::Disconnected => Some("* session ended".to_string()),
        }
    }

    /// Format a chat line: sequence, room, time, sender and body
    pub fn format_chat(chat: &ChatMessage) -> String {
        let time = chat
            .posted_at
            .map(|posted| unix_to_jst_clock(posted.seconds))
            .unwrap_or_else(|| "--:--:--".to_string());
        let rank_tag = match chat.rank {
            Rank::Normal => "",
            Rank::Premium => " [P]",
            Rank::System => " [sys]",
            Rank::Caster => " [cast]",
        };
        format!(
            "{:>6} {} [{}]{} {}: {}",
            chat.sequence, time, chat.room, rank_tag, chat.user_id, chat.body
        )
    }

    /// Format a heartbeat summary line
    pub fn format_heartbeat(heartbeat: &Heartbeat) -> String {
        match heartbeat.status {
            HeartbeatStatus::Ok => format!(
                "* heartbeat: {} watching, {} comments",
                heartbeat
                    .watch_count
                    .map(|count| count.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                heartbeat
                    .comment_count
                    .map(|count| count.to_string())
                    .unwrap_or_else(|| "?".to_string()),
            ),
            HeartbeatStatus::Fail => format!(
                "* heartbeat failed: {:?}",
                heartbeat.error_code
            ),
        }
    }
}
