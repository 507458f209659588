//! Persisted memory of the robot.
//!
//! Three documents live on disk: the learning state (point counters), the
//! movement memory (every move ever taken, with the frame it was taken on) and
//! the short-term memory (the last few interactions, which is where button
//! presses get attributed).

pub mod store;

pub use store::PersistentStore;

use crate::core::{Move, Reinforcement};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default short-term capacity.
pub const SHORT_TERM_CAPACITY: usize = 10;

/// ISO-8601 UTC timestamp used in every document and audit line.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    #[serde(default)]
    pub reward_points: u64,
    #[serde(default)]
    pub punishment_points: u64,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl LearningState {
    pub fn register(&mut self, kind: Reinforcement) -> u64 {
        match kind {
            Reinforcement::Positive => {
                self.reward_points += 1;
                self.reward_points
            }
            Reinforcement::Negative => {
                self.punishment_points += 1;
                self.punishment_points
            }
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Some(now_iso());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementMemoryEntry {
    #[serde(rename = "vision")]
    pub vision_ref: String,
    #[serde(rename = "move")]
    pub movement: Move,
    #[serde(default)]
    pub reward: i64,
}

impl MovementMemoryEntry {
    pub fn new(vision_ref: impl Into<String>, movement: Move) -> Self {
        Self {
            vision_ref: vision_ref.into(),
            movement,
            reward: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShortTermRecord {
    pub timestamp: String,
    #[serde(rename = "input_file", default)]
    pub input_audio_ref: Option<String>,
    #[serde(rename = "output_file", default)]
    pub output_audio_ref: Option<String>,
    #[serde(default)]
    pub spoke: bool,
    #[serde(default)]
    pub reinforcement: Option<Reinforcement>,
    #[serde(rename = "saw", default)]
    pub vision_ref: Option<String>,
}

/// Bounded FIFO of the most recent interactions.
#[derive(Debug, Clone)]
pub struct ShortTermMemory {
    records: VecDeque<ShortTermRecord>,
    capacity: usize,
}

impl ShortTermMemory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Rebuilds the ring from a persisted document, keeping only the newest
    /// `capacity` records.
    pub fn from_records(records: Vec<ShortTermRecord>, capacity: usize) -> Self {
        let mut memory = Self::new(capacity);
        for record in records {
            memory.push(record);
        }
        memory
    }

    /// Appends a record, evicting the oldest ones past capacity.
    /// Returns the number of evicted records.
    pub fn push(&mut self, record: ShortTermRecord) -> usize {
        self.records.push_back(record);
        let mut evicted = 0;
        while self.records.len() > self.capacity {
            self.records.pop_front();
            evicted += 1;
        }
        debug_assert!(self.records.len() <= self.capacity);
        evicted
    }

    pub fn last(&self) -> Option<&ShortTermRecord> {
        self.records.back()
    }

    /// Marks the most recent record with `kind`.
    ///
    /// Only the newest record is ever touched, and only while its
    /// reinforcement is still unset. Returns the vision ref of the record when
    /// the attribution took place.
    pub fn attribute_last(&mut self, kind: Reinforcement) -> Option<Option<String>> {
        let last = self.records.back_mut()?;
        if last.reinforcement.is_some() {
            return None;
        }
        last.reinforcement = Some(kind);
        Some(last.vision_ref.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShortTermRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &VecDeque<ShortTermRecord> {
        &self.records
    }
}

impl Default for ShortTermMemory {
    fn default() -> Self {
        Self::new(SHORT_TERM_CAPACITY)
    }
}
