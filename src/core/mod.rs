pub mod state;
pub mod reinforcement;
pub mod monitor;
pub mod selector;
pub mod recorder;
pub mod r#loop;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A discrete movement the robot can commit to on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Left,
    Right,
    Forward,
}

impl Move {
    /// Declared order. Ties in scoring resolve to the earliest entry.
    pub const ALL: [Move; 3] = [Move::Left, Move::Right, Move::Forward];

    pub fn as_str(&self) -> &'static str {
        match self {
            Move::Left => "left",
            Move::Right => "right",
            Move::Forward => "forward",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Move::Left),
            "right" => Some(Move::Right),
            "forward" => Some(Move::Forward),
            _ => None,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome attached to an interaction by the reward/punish buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reinforcement {
    Positive,
    Negative,
}

impl Reinforcement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reinforcement::Positive => "positive",
            Reinforcement::Negative => "negative",
        }
    }

    /// Signed contribution to a movement score.
    pub fn delta(&self) -> i64 {
        match self {
            Reinforcement::Positive => 1,
            Reinforcement::Negative => -1,
        }
    }
}

impl fmt::Display for Reinforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Move::Forward).unwrap(), "\"forward\"");
        let m: Move = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(m, Move::Left);
        assert_eq!(Move::parse(" RIGHT "), Some(Move::Right));
        assert_eq!(Move::parse("null"), None);
    }

    #[test]
    fn test_reinforcement_serde() {
        assert_eq!(serde_json::to_string(&Reinforcement::Negative).unwrap(), "\"negative\"");
        assert_eq!(Reinforcement::Positive.delta(), 1);
    }
}
