//! Message server descriptors and adjacent-server derivation.

use super::room::RoomPosition;

/// Immutable descriptor of one room's socket endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageServer {
    pub room_position: RoomPosition,
    pub host: String,
    pub port: u16,
    pub thread_id: u64,
}

impl MessageServer {
    pub fn new(
        room_position: RoomPosition,
        host: impl Into<String>,
        port: u16,
        thread_id: u64,
    ) -> Self {
        Self {
            room_position,
            host: host.into(),
            port,
            thread_id,
        }
    }
}

/// Strategy computing the endpoint of the room adjacent to a given one.
///
/// The concrete host/thread arithmetic is a service contract that has changed
/// over time, so it is injected rather than fixed. Implementations must keep
/// `next` and `previous` exact inverses: `previous(next(s)) == s` whenever
/// both are defined.
pub trait ServerDerivation: Send + Sync {
    /// Descriptor of the room one position after `server`, `None` past the
    /// last stand
    fn next(&self, server: &MessageServer) -> Option<MessageServer>;

    /// Descriptor of the room one position before `server`, `None` before the
    /// arena
    fn previous(&self, server: &MessageServer) -> Option<MessageServer>;

    /// Derive the descriptors for every room position, arena first, starting
    /// from a server at any position
    fn derive_all(&self, origin: &MessageServer) -> Option<Vec<MessageServer>> {
        let mut arena = origin.clone();
        while arena.room_position != RoomPosition::Arena {
            arena = self.previous(&arena)?;
        }

        let mut servers = vec![arena];
        while servers.last().map(|s| s.room_position) != Some(RoomPosition::StandG) {
            let next = self.next(servers.last()?)?;
            servers.push(next);
        }

        Some(servers)
    }
}

/// Default derivation: the thread id advances by a fixed step and the port
/// rotates through a contiguous ring, host unchanged.
///
/// The step and ring are parameters because the exact arithmetic is a
/// service-contract assumption, not a verified invariant.
#[derive(Debug, Clone)]
pub struct ThreadOffsetDerivation {
    thread_step: u64,
    port_first: u16,
    port_last: u16,
}

impl ThreadOffsetDerivation {
    pub fn new(thread_step: u64, port_first: u16, port_last: u16) -> Self {
        assert!(port_first <= port_last, "port ring must not be empty");
        assert!(thread_step > 0, "thread step must be positive");
        Self {
            thread_step,
            port_first,
            port_last,
        }
    }

    fn ring_len(&self) -> u16 {
        self.port_last - self.port_first + 1
    }

    fn port_after(&self, port: u16) -> u16 {
        if port >= self.port_last {
            self.port_first
        } else {
            port + 1
        }
    }

    fn port_before(&self, port: u16) -> u16 {
        if port <= self.port_first {
            self.port_last
        } else {
            port - 1
        }
    }

    fn in_ring(&self, port: u16) -> bool {
        (self.port_first..=self.port_last).contains(&port)
    }
}

impl Default for ThreadOffsetDerivation {
    /// Parameters observed on community broadcasts: ports 2805-2814, thread
    /// ids contiguous per room.
    fn default() -> Self {
        Self::new(1, 2805, 2814)
    }
}

impl ServerDerivation for ThreadOffsetDerivation {
    fn next(&self, server: &MessageServer) -> Option<MessageServer> {
        let position = server.room_position.next()?;
        if !self.in_ring(server.port) || self.ring_len() < 2 {
            return None;
        }
        Some(MessageServer {
            room_position: position,
            host: server.host.clone(),
            port: self.port_after(server.port),
            thread_id: server.thread_id.checked_add(self.thread_step)?,
        })
    }

    fn previous(&self, server: &MessageServer) -> Option<MessageServer> {
        let position = server.room_position.previous()?;
        if !self.in_ring(server.port) || self.ring_len() < 2 {
            return None;
        }
        Some(MessageServer {
            room_position: position,
            host: server.host.clone(),
            port: self.port_before(server.port),
            thread_id: server.thread_id.checked_sub(self.thread_step)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_server() -> MessageServer {
        MessageServer::new(RoomPosition::Arena, "msg102.example.jp", 2810, 1_345_000_000)
    }

    #[test]
    fn test_next_then_previous_is_identity() {
        // テスト項目: next を適用してから previous を適用すると元のサーバに戻る
        // given (前提条件):
        let derivation = ThreadOffsetDerivation::default();
        let origin = arena_server();

        // when (操作):
        let next = derivation.next(&origin).unwrap();
        let back = derivation.previous(&next).unwrap();

        // then (期待する結果):
        assert_eq!(back, origin);
    }

    #[test]
    fn test_port_rotates_within_ring() {
        // テスト項目: ポートがリングの末尾から先頭へ循環する
        // given (前提条件):
        let derivation = ThreadOffsetDerivation::new(1, 2805, 2814);
        let origin = MessageServer::new(RoomPosition::Arena, "msg102.example.jp", 2814, 100);

        // when (操作):
        let next = derivation.next(&origin).unwrap();

        // then (期待する結果):
        assert_eq!(next.port, 2805);
        assert_eq!(next.thread_id, 101);
        assert_eq!(next.room_position, RoomPosition::StandA);
    }

    #[test]
    fn test_next_fails_past_last_stand() {
        // テスト項目: 最後のスタンドからは next が失敗する
        // given (前提条件):
        let derivation = ThreadOffsetDerivation::default();
        let last = MessageServer::new(RoomPosition::StandG, "msg102.example.jp", 2811, 107);

        // when (操作):
        let result = derivation.next(&last);

        // then (期待する結果):
        assert!(result.is_none());
    }

    #[test]
    fn test_derive_all_from_arena() {
        // テスト項目: アリーナのサーバから全部屋のサーバ一覧が導出される
        // given (前提条件):
        let derivation = ThreadOffsetDerivation::default();
        let origin = arena_server();

        // when (操作):
        let servers = derivation.derive_all(&origin).unwrap();

        // then (期待する結果):
        assert_eq!(servers.len(), 8);
        assert_eq!(servers[0], origin);
        for (ordinal, server) in servers.iter().enumerate() {
            assert_eq!(server.room_position.ordinal(), ordinal);
        }
    }

    #[test]
    fn test_derive_all_from_stand_walks_back_to_arena() {
        // テスト項目: スタンドのサーバから導出しても先頭はアリーナになる
        // given (前提条件):
        let derivation = ThreadOffsetDerivation::default();
        let origin = MessageServer::new(RoomPosition::StandB, "msg102.example.jp", 2812, 102);

        // when (操作):
        let servers = derivation.derive_all(&origin).unwrap();

        // then (期待する結果):
        assert_eq!(servers.len(), 8);
        assert_eq!(servers[0].room_position, RoomPosition::Arena);
        assert_eq!(servers[0].thread_id, 100);
        assert_eq!(servers[0].port, 2810);
        assert_eq!(servers[2], origin);
    }
}
