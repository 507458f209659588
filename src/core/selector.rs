use super::Move;
use crate::memory::MovementMemoryEntry;

/// Cumulative reward per move, in declared order. Moves never taken score 0.
pub fn score_moves(memory: &[MovementMemoryEntry]) -> [(Move, i64); 3] {
    let mut scores = Move::ALL.map(|m| (m, 0i64));
    for entry in memory {
        if let Some(slot) = scores.iter_mut().find(|(m, _)| *m == entry.movement) {
            slot.1 += entry.reward;
        }
    }
    scores
}

/// Highest-scoring move; the first in declared order wins a tie.
pub fn select_move(memory: &[MovementMemoryEntry]) -> Move {
    let mut best = (Move::ALL[0], i64::MIN);
    for (m, score) in score_moves(memory) {
        if score > best.1 {
            best = (m, score);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(m: Move, reward: i64) -> MovementMemoryEntry {
        MovementMemoryEntry { vision_ref: "cam.jpg".into(), movement: m, reward }
    }

    #[test]
    fn test_sums_per_move() {
        let memory = vec![entry(Move::Left, 3), entry(Move::Right, 1), entry(Move::Left, 2)];
        assert_eq!(
            score_moves(&memory),
            [(Move::Left, 5), (Move::Right, 1), (Move::Forward, 0)]
        );
        assert_eq!(select_move(&memory), Move::Left);
    }

    #[test]
    fn test_empty_memory_picks_first_declared() {
        assert_eq!(select_move(&[]), Move::Left);
    }

    #[test]
    fn test_ties_resolve_in_declared_order() {
        let memory = vec![entry(Move::Forward, 2), entry(Move::Right, 2)];
        assert_eq!(select_move(&memory), Move::Right);
    }

    #[test]
    fn test_unobserved_move_beats_negative_history() {
        let memory = vec![entry(Move::Left, -1), entry(Move::Right, -4)];
        assert_eq!(select_move(&memory), Move::Forward);
    }
}
