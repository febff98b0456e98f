//! Room positions for a live broadcast.
//!
//! A broadcast has one arena room plus up to seven overflow "stand" rooms.
//! Positions are totally ordered; the ordinal is also the index into the
//! derived message-server list.

use std::fmt;

/// Ordered room positions: the arena followed by the overflow stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomPosition {
    Arena = 0,
    StandA = 1,
    StandB = 2,
    StandC = 3,
    StandD = 4,
    StandE = 5,
    StandF = 6,
    StandG = 7,
}

/// Minimum community level required to open each room position.
const REQUIRED_COMMUNITY_LEVEL: [u32; 8] = [0, 0, 66, 70, 105, 150, 190, 232];

impl RoomPosition {
    /// All positions in order, arena first
    pub const ALL: [RoomPosition; 8] = [
        RoomPosition::Arena,
        RoomPosition::StandA,
        RoomPosition::StandB,
        RoomPosition::StandC,
        RoomPosition::StandD,
        RoomPosition::StandE,
        RoomPosition::StandF,
        RoomPosition::StandG,
    ];

    /// Construct a position from its ordinal (0 = arena)
    pub fn from_ordinal(ordinal: usize) -> Option<RoomPosition> {
        RoomPosition::ALL.get(ordinal).copied()
    }

    /// The position's ordinal, 0 for the arena
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// The adjacent position toward the last stand, `None` at Stand G
    pub fn next(self) -> Option<RoomPosition> {
        RoomPosition::from_ordinal(self.ordinal() + 1)
    }

    /// The adjacent position toward the arena, `None` at the arena
    pub fn previous(self) -> Option<RoomPosition> {
        self.ordinal().checked_sub(1).and_then(RoomPosition::from_ordinal)
    }

    /// Minimum community level required to open this room
    pub fn required_community_level(self) -> u32 {
        REQUIRED_COMMUNITY_LEVEL[self.ordinal()]
    }

    /// Short display label ("Arena", "Stand A", ...)
    pub fn label(self) -> &'static str {
        match self {
            RoomPosition::Arena => "Arena",
            RoomPosition::StandA => "Stand A",
            RoomPosition::StandB => "Stand B",
            RoomPosition::StandC => "Stand C",
            RoomPosition::StandD => "Stand D",
            RoomPosition::StandE => "Stand E",
            RoomPosition::StandF => "Stand F",
            RoomPosition::StandG => "Stand G",
        }
    }
}

impl fmt::Display for RoomPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_strictly_increases_from_arena() {
        // テスト項目: ordinal がアリーナから最後のスタンドまで単調増加する
        // given (前提条件):
        let positions = RoomPosition::ALL;

        // when (操作) / then (期待する結果):
        for pair in positions.windows(2) {
            assert!(pair[0].ordinal() < pair[1].ordinal());
        }
        assert_eq!(RoomPosition::Arena.ordinal(), 0);
        assert_eq!(RoomPosition::StandG.ordinal(), 7);
    }

    #[test]
    fn test_next_then_previous_is_identity() {
        // テスト項目: 境界以外のすべての位置で next(previous(p)) == p が成り立つ
        // given (前提条件):
        let positions = RoomPosition::ALL;

        // when (操作) / then (期待する結果):
        for position in positions {
            if let Some(prev) = position.previous() {
                assert_eq!(prev.next(), Some(position));
            }
            if let Some(next) = position.next() {
                assert_eq!(next.previous(), Some(position));
            }
        }
    }

    #[test]
    fn test_next_fails_at_last_stand() {
        // テスト項目: 最後のスタンドで next が失敗する
        // given (前提条件):
        let last = RoomPosition::StandG;

        // when (操作):
        let result = last.next();

        // then (期待する結果):
        assert_eq!(result, None);
    }

    #[test]
    fn test_previous_fails_at_arena() {
        // テスト項目: アリーナで previous が失敗する
        // given (前提条件):
        let arena = RoomPosition::Arena;

        // when (操作):
        let result = arena.previous();

        // then (期待する結果):
        assert_eq!(result, None);
    }

    #[test]
    fn test_required_community_level_table() {
        // テスト項目: 各部屋に必要なコミュニティレベルが正しい
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(RoomPosition::Arena.required_community_level(), 0);
        assert_eq!(RoomPosition::StandA.required_community_level(), 0);
        assert_eq!(RoomPosition::StandB.required_community_level(), 66);
        assert_eq!(RoomPosition::StandC.required_community_level(), 70);
        assert_eq!(RoomPosition::StandD.required_community_level(), 105);
        assert_eq!(RoomPosition::StandE.required_community_level(), 150);
        assert_eq!(RoomPosition::StandF.required_community_level(), 190);
        assert_eq!(RoomPosition::StandG.required_community_level(), 232);
    }

    #[test]
    fn test_from_ordinal_out_of_range() {
        // テスト項目: 範囲外の ordinal からは位置が構築できない
        // given (前提条件):
        let ordinal = 8;

        // when (操作):
        let result = RoomPosition::from_ordinal(ordinal);

        // then (期待する結果):
        assert_eq!(result, None);
    }
}
