//! Rank → score lookup tables.
//!
//! Round 0 uses a single table. Round 1 (finals) scores each section with its
//! own table so that the strata stay separated on the leaderboard.

use crate::types::BALLOT_SIZE;

const ROUND_ZERO: [i64; BALLOT_SIZE] = [3, 1, 0, 0];

const ROUND_ONE: [[i64; BALLOT_SIZE]; 4] = [
    [7, 5, 3, 1],
    [6, 4, 2, 2],
    [5, 3, 1, 1],
    [4, 2, 0, 1],
];

/// Score awarded for `vote` (1-based rank) in the given round and section.
///
/// The section is ignored in round 0. Returns `None` when the rank is outside
/// `1..=BALLOT_SIZE` or a round-1 section has no table.
pub fn calculate_score(vote: u8, round: u8, section: u8) -> Option<i64> {
    let idx = usize::from(vote).checked_sub(1)?;
    if idx >= BALLOT_SIZE {
        return None;
    }
    match round {
        0 => Some(ROUND_ZERO[idx]),
        _ => ROUND_ONE.get(usize::from(section)).map(|table| table[idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_zero_ignores_section() {
        assert_eq!(calculate_score(1, 0, 0), Some(3));
        assert_eq!(calculate_score(2, 0, 3), Some(1));
        assert_eq!(calculate_score(2, 0, 200), Some(1));
        assert_eq!(calculate_score(4, 0, 1), Some(0));
    }

    #[test]
    fn test_round_one_sections() {
        assert_eq!(calculate_score(1, 1, 2), Some(5));
        assert_eq!(calculate_score(4, 1, 0), Some(1));
        assert_eq!(calculate_score(1, 1, 0), Some(7));
        assert_eq!(calculate_score(4, 1, 1), Some(2));
        assert_eq!(calculate_score(3, 1, 3), Some(0));
        assert_eq!(calculate_score(4, 1, 3), Some(1));
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(calculate_score(0, 0, 0), None);
        assert_eq!(calculate_score(5, 1, 0), None);
        assert_eq!(calculate_score(1, 1, 4), None);
    }
}
