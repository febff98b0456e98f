//! Collaborator interfaces consumed by the stream engine.
//!
//! Entry-point resolution, community metadata, posting tokens, heartbeat
//! polls, username lookup and abuse reporting all live behind [`LiveApi`] so
//! the session core never depends on a concrete transport.

pub mod http;
pub mod names;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Community, Heartbeat, LiveContext};

pub use http::HttpLiveApi;
pub use names::UserNameCache;

/// Errors from the collaborator endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service reported failure: {code}")]
    Service { code: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("response missing required field: {0}")]
    MissingField(&'static str),
}

/// Everything needed to report one user as abusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbuseReport {
    pub live_id: String,
    pub user_id: String,
    /// `seconds.micros` position of the offending comment
    pub tpos: String,
    pub comment_no: u64,
    pub thread_id: u64,
}

/// External service operations the session core calls out to.
///
/// Implementations must be safe to share across the orchestrator, the
/// heartbeat loop and concurrent posting tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LiveApi: Send + Sync {
    /// Resolve a live id to its broadcast descriptor, the watching user and
    /// the assigned message-server endpoint
    async fn resolve_live(&self, live_id: &str) -> Result<LiveContext, ApiError>;

    /// Resolve the community hosting a broadcast (title, entitlement level)
    async fn resolve_community(&self, community_id: &str) -> Result<Community, ApiError>;

    /// Obtain a one-time posting token for a thread and paging block
    async fn fetch_post_key(&self, thread_id: u64, block: u64) -> Result<String, ApiError>;

    /// Poll the live health endpoint
    async fn fetch_heartbeat(&self, live_id: &str) -> Result<Heartbeat, ApiError>;

    /// Resolve a raw user id to a display name, `None` when unresolvable
    async fn resolve_username(&self, user_id: &str) -> Result<Option<String>, ApiError>;

    /// Report a user as abusive
    async fn report_abuse(&self, report: &AbuseReport) -> Result<(), ApiError>;
}
