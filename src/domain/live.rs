//! Descriptors of the live broadcast, its community and the watching user.
//!
//! These are resolved once at connect time by the entry-point collaborator
//! and treated as immutable session inputs afterwards.

use super::server::MessageServer;

/// One live broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Live {
    pub live_id: String,
    pub title: Option<String>,
    pub community_id: Option<String>,
    /// Stream time base (Unix seconds); the origin of vpos arithmetic
    pub base_time: i64,
    pub open_time: Option<i64>,
    pub start_time: Option<i64>,
}

/// The community hosting a broadcast. The level gates overflow rooms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Community {
    pub community_id: String,
    pub title: Option<String>,
    pub level: Option<u32>,
    pub thumbnail_url: Option<String>,
}

/// The authenticated user watching the broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveUser {
    pub user_id: String,
    pub nickname: Option<String>,
    /// Raw premium flag, echoed back verbatim when posting
    pub premium: i64,
    /// Server-assigned room label ("co12345", "立ち見A列", ...)
    pub room_label: Option<String>,
    pub seat_no: Option<u64>,
}

/// Everything the entry-point lookup resolves in one round trip: the live,
/// the watching user, and the socket endpoint of the room the user was
/// assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveContext {
    pub live: Live,
    pub user: LiveUser,
    pub assigned_server: MessageServer,
}
