//! Pure decision logic for progressive room opening.
//!
//! Kept free of session state and I/O so the gating rules are testable on
//! their own: a room opens only after the room before it has proven live
//! traffic, and only if the community's level clears the position's minimum.

use std::collections::HashSet;

use crate::domain::{MessageServer, RoomPosition};

/// Index into `servers` of the room that should be opened now, or `None`
/// when opening is deferred.
///
/// `open_count` is the number of rooms opened so far (the arena counts), so
/// the candidate is always the room right after the open prefix. Evaluated on
/// every first-chat signal rather than polled.
pub fn next_room_to_open(
    servers: &[MessageServer],
    open_count: usize,
    first_chat: &HashSet<RoomPosition>,
    community_level: u32,
) -> Option<usize> {
    if open_count == 0 || open_count >= servers.len() {
        return None;
    }

    let preceding = servers[open_count - 1].room_position;
    if !first_chat.contains(&preceding) {
        return None;
    }

    let candidate = servers[open_count].room_position;
    if candidate.required_community_level() > community_level {
        return None;
    }

    Some(open_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServerDerivation, ThreadOffsetDerivation};

    fn derived_servers() -> Vec<MessageServer> {
        let arena = MessageServer::new(RoomPosition::Arena, "msg102.example.jp", 2805, 100);
        ThreadOffsetDerivation::default().derive_all(&arena).unwrap()
    }

    fn first_chat_through(last: RoomPosition) -> HashSet<RoomPosition> {
        RoomPosition::ALL
            .into_iter()
            .filter(|room| *room <= last)
            .collect()
    }

    #[test]
    fn test_stand_a_opens_after_arena_first_chat_at_any_level() {
        // テスト項目: アリーナの初チャット後はレベルに関係なくスタンド A が開く
        // given (前提条件):
        let servers = derived_servers();
        let first_chat = first_chat_through(RoomPosition::Arena);

        // when (操作):
        let result = next_room_to_open(&servers, 1, &first_chat, 0);

        // then (期待する結果):
        assert_eq!(result, Some(1));
    }

    #[test]
    fn test_no_open_before_preceding_room_first_chat() {
        // テスト項目: 直前の部屋に初チャットが無い間は次の部屋が開かない
        // given (前提条件):
        let servers = derived_servers();
        let first_chat = HashSet::new();

        // when (操作):
        let result = next_room_to_open(&servers, 1, &first_chat, 255);

        // then (期待する結果):
        assert_eq!(result, None);
    }

    #[test]
    fn test_stand_b_deferred_below_required_level_then_allowed() {
        // テスト項目: レベル 50 ではスタンド B が保留され、66 に上がると開けるようになる
        // given (前提条件):
        let servers = derived_servers();
        let first_chat = first_chat_through(RoomPosition::StandA);

        // when (操作):
        let deferred = next_room_to_open(&servers, 2, &first_chat, 50);
        let allowed = next_room_to_open(&servers, 2, &first_chat, 66);

        // then (期待する結果):
        assert_eq!(deferred, None);
        assert_eq!(allowed, Some(2));
    }

    #[test]
    fn test_no_open_when_every_room_is_already_open() {
        // テスト項目: すべての部屋が開いているときは何も開かない
        // given (前提条件):
        let servers = derived_servers();
        let first_chat = first_chat_through(RoomPosition::StandG);

        // when (操作):
        let result = next_room_to_open(&servers, servers.len(), &first_chat, 255);

        // then (期待する結果):
        assert_eq!(result, None);
    }

    #[test]
    fn test_no_open_before_the_arena_itself_is_open() {
        // テスト項目: アリーナ未接続の状態では進行判定が何も返さない
        // given (前提条件):
        let servers = derived_servers();
        let first_chat = first_chat_through(RoomPosition::StandG);

        // when (操作):
        let result = next_room_to_open(&servers, 0, &first_chat, 255);

        // then (期待する結果):
        assert_eq!(result, None);
    }

    #[test]
    fn test_level_exactly_at_threshold_allows_opening() {
        // テスト項目: 必要レベルちょうどで部屋が開けられる
        // given (前提条件):
        let servers = derived_servers();
        let first_chat = first_chat_through(RoomPosition::StandB);

        // when (操作):
        // スタンド C は レベル 70 が必要
        let at_threshold = next_room_to_open(&servers, 3, &first_chat, 70);
        let below_threshold = next_room_to_open(&servers, 3, &first_chat, 69);

        // then (期待する結果):
        assert_eq!(at_threshold, Some(3));
        assert_eq!(below_threshold, None);
    }
}
