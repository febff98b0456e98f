//! Heartbeat documents returned by the live status endpoint.

/// One successful or failed heartbeat poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub status: HeartbeatStatus,
    pub watch_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub free_slot_num: Option<u64>,
    pub is_restrict: Option<bool>,
    pub ticket: Option<String>,
    /// Server-requested polling interval in seconds; re-arms the loop
    pub wait_time: Option<u64>,
    pub error_code: Option<HeartbeatErrorCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Ok,
    Fail,
}

impl HeartbeatStatus {
    pub fn from_wire(status: &str) -> HeartbeatStatus {
        if status == "ok" {
            HeartbeatStatus::Ok
        } else {
            HeartbeatStatus::Fail
        }
    }
}

/// Error codes the endpoint reports on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatErrorCode {
    /// The live no longer exists or has ended
    NotFound,
    /// The session credential was not accepted
    NotLogin,
    Other(String),
}

impl HeartbeatErrorCode {
    pub fn from_code(code: &str) -> HeartbeatErrorCode {
        match code {
            "NOTFOUND" => HeartbeatErrorCode::NotFound,
            "NOTLOGIN" => HeartbeatErrorCode::NotLogin,
            other => HeartbeatErrorCode::Other(other.to_string()),
        }
    }

    /// Whether the live itself is gone, as opposed to a transient failure
    pub fn live_is_gone(&self) -> bool {
        matches!(self, HeartbeatErrorCode::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_wire() {
        // テスト項目: status 文字列が ok/fail に変換される
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(HeartbeatStatus::from_wire("ok"), HeartbeatStatus::Ok);
        assert_eq!(HeartbeatStatus::from_wire("fail"), HeartbeatStatus::Fail);
        assert_eq!(HeartbeatStatus::from_wire(""), HeartbeatStatus::Fail);
    }

    #[test]
    fn test_error_code_mapping() {
        // テスト項目: エラーコード文字列が列挙型に変換される
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(
            HeartbeatErrorCode::from_code("NOTFOUND"),
            HeartbeatErrorCode::NotFound
        );
        assert_eq!(
            HeartbeatErrorCode::from_code("NOTLOGIN"),
            HeartbeatErrorCode::NotLogin
        );
        assert_eq!(
            HeartbeatErrorCode::from_code("FULL"),
            HeartbeatErrorCode::Other("FULL".to_string())
        );
        assert!(HeartbeatErrorCode::NotFound.live_is_gone());
        assert!(!HeartbeatErrorCode::NotLogin.live_is_gone());
    }
}
