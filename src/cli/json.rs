//! JSON-lines output for the watch binary.
//!
//! Each session event becomes one JSON object on stdout, for piping into
//! other tools. The DTOs are a stable output surface decoupled from the
//! domain types.

use serde::Serialize;

use crate::domain::{ChatMessage, Heartbeat, Rank};
use crate::session::SessionEvent;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDto {
    Prepared {
        live_id: String,
        title: Option<String>,
        community_level: Option<u32>,
    },
    ListeningStarted {
        room: String,
    },
    Chat(ChatDto),
    PostResult {
        room: String,
        accepted: bool,
    },
    Heartbeat {
        ok: bool,
        watch_count: Option<u64>,
        comment_count: Option<u64>,
        free_slot_num: Option<u64>,
    },
    RoomClosed {
        room: String,
    },
    Disconnected,
}

#[derive(Debug, Serialize)]
pub struct ChatDto {
    pub room: String,
    pub no: u64,
    pub user_id: String,
    pub rank: &'static str,
    pub posted_at: Option<i64>,
    pub body: String,
    pub first: bool,
}

fn rank_name(rank: Rank) -> &'static str {
    match rank {
        Rank::Normal => "normal",
        Rank::Premium => "premium",
        Rank::System => "system",
        Rank::Caster => "caster",
    }
}

fn chat_dto(chat: &ChatMessage, first: bool) -> ChatDto {
    ChatDto {
        room: chat.room.to_string(),
        no: chat.sequence,
        user_id: chat.user_id.clone(),
        rank: rank_name(chat.rank),
        posted_at: chat.posted_at.map(|time| time.seconds),
        body: chat.body.clone(),
        first,
    }
}

fn heartbeat_dto(heartbeat: &Heartbeat) -> EventDto {
    EventDto::Heartbeat {
        ok: heartbeat.status == crate::domain::HeartbeatStatus::Ok,
        watch_count: heartbeat.watch_count,
        comment_count: heartbeat.comment_count,
        free_slot_num: heartbeat.free_slot_num,
    }
}

/// Map a session event to its output DTO, `None` for events not exported
pub fn event_dto(event: &SessionEvent) -> Option<EventDto> {
    match event {
        SessionEvent::Prepared {
            live, community, ..
        } => Some(EventDto::Prepared {
            live_id: live.live_id.clone(),
            title: live.title.clone(),
            community_level: community.level,
        }),
        SessionEvent::ListeningStarted { room } => Some(EventDto::ListeningStarted {
            room: room.to_string(),
        }),
        SessionEvent::FirstChat(chat) => Some(EventDto::Chat(chat_dto(chat, true))),
        SessionEvent::Chat(chat) => Some(EventDto::Chat(chat_dto(chat, false))),
        SessionEvent::PostResult { room, result } => Some(EventDto::PostResult {
            room: room.to_string(),
            accepted: result.status == crate::domain::PostStatus::Accepted,
        }),
        SessionEvent::Heartbeat(heartbeat) => Some(heartbeat_dto(heartbeat)),
        SessionEvent::RoomClosed { room, .. } => Some(EventDto::RoomClosed {
            room: room.to_string(),
        }),
        SessionEvent::Disconnected => Some(EventDto::Disconnected),
    }
}

/// Render a session event as one JSON line
pub fn event_json_line(event: &SessionEvent) -> Option<String> {
    let dto = event_dto(event)?;
    match serde_json::to_string(&dto) {
        Ok(line) => Some(line),
        Err(e) => {
            tracing::error!("failed to serialize event: {}", e);
            None
        }
    }
}
