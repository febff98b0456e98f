//! Structured records extracted from the room socket protocol.

use std::collections::HashSet;

use super::room::RoomPosition;

/// Sender rank carried on a chat record.
///
/// The raw wire value doubles as the premium flag of the poster; values above
/// the known range are treated as system-tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    Normal,
    Premium,
    System,
    Caster,
}

impl Rank {
    /// Map the raw `premium` attribute value to a rank. Absent attributes are
    /// mapped to `Normal` by the parser before this is called.
    pub fn from_raw(raw: i64) -> Rank {
        match raw {
            0 => Rank::Normal,
            1 => Rank::Premium,
            2 => Rank::System,
            3 => Rank::Caster,
            _ => Rank::System,
        }
    }

    /// An ordinary viewer: normal or premium
    pub fn is_ordinary(self) -> bool {
        matches!(self, Rank::Normal | Rank::Premium)
    }

    /// The broadcaster or the service itself
    pub fn is_operator(self) -> bool {
        matches!(self, Rank::System | Rank::Caster)
    }
}

/// Wire timestamp: seconds since the epoch plus microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatTime {
    pub seconds: i64,
    pub micros: u32,
}

impl ChatTime {
    /// Render as `seconds.micros`, the form the abuse-report endpoint expects
    pub fn tpos(&self) -> String {
        format!("{}.{}", self.seconds, self.micros)
    }
}

/// Acknowledgement that a room's comment thread is open.
///
/// Marks the room's epoch (`server_time`) and the baseline sequence counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadOpened {
    pub thread_id: u64,
    pub result_code: i64,
    pub last_sequence: u64,
    pub ticket: String,
    pub server_time: i64,
}

/// One chat comment received on a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sequence: u64,
    pub user_id: String,
    pub posted_at: Option<ChatTime>,
    pub room: RoomPosition,
    pub rank: Rank,
    pub score: i64,
    pub mail: HashSet<String>,
    pub body: String,
    /// Monotonic per-room arrival counter, assigned at parse time
    pub arrival_index: u64,
}

/// Server acknowledgement of an outbound comment post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostResult {
    pub status: PostStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStatus {
    Accepted,
    Rejected(i64),
}

impl PostStatus {
    pub fn from_raw(raw: i64) -> PostStatus {
        if raw == 0 {
            PostStatus::Accepted
        } else {
            PostStatus::Rejected(raw)
        }
    }
}

/// Tagged union of every record kind the stream protocol can deliver
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecord {
    Thread(ThreadOpened),
    Chat(ChatMessage),
    Post(PostResult),
}
