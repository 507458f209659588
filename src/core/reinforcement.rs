//! Debounce state machine for the reward and punishment buttons.
//!
//! Both lines share one machine. An edge registers only from `Idle`; a
//! registered edge of either kind locks out both kinds for the cooldown
//! window. Punishment is checked first on every sample, and reward also
//! requires the punishment line to be inactive at that moment.
//!
//! | phase          | punish edge | reward edge, punish inactive | result                      |
//! |----------------|-------------|------------------------------|-----------------------------|
//! | Idle           | yes         | any                          | Locked(Negative), emit      |
//! | Idle           | no          | yes                          | Locked(Positive), emit      |
//! | Idle           | no          | no                           | Idle                        |
//! | Locked, expired| ...         | ...                          | evaluated as Idle           |
//! | Locked, active | any         | any                          | unchanged, edges discarded  |

use super::Reinforcement;
use std::time::{Duration, Instant};

/// Instantaneous level of both lines, already mapped to "pressed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineSample {
    pub reward_active: bool,
    pub punish_active: bool,
}

impl LineSample {
    pub fn new(reward_active: bool, punish_active: bool) -> Self {
        Self { reward_active, punish_active }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CooldownLocked { until: Instant, kind: Reinforcement },
}

/// A registered, debounced button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReinforcementEvent {
    pub kind: Reinforcement,
    pub at: Instant,
}

/// Pure transition function. `now` is compared strictly against the lock
/// deadline, so an edge exactly at `until` is still suppressed.
pub fn transition(
    phase: Phase,
    previous: LineSample,
    current: LineSample,
    now: Instant,
    cooldown: Duration,
) -> (Phase, Option<Reinforcement>) {
    let unlocked = match phase {
        Phase::Idle => true,
        Phase::CooldownLocked { until, .. } => now > until,
    };
    if !unlocked {
        return (phase, None);
    }

    let punish_edge = current.punish_active && !previous.punish_active;
    let reward_edge = current.reward_active && !previous.reward_active && !current.punish_active;

    let kind = if punish_edge {
        Reinforcement::Negative
    } else if reward_edge {
        Reinforcement::Positive
    } else {
        return (Phase::Idle, None);
    };

    (Phase::CooldownLocked { until: now + cooldown, kind }, Some(kind))
}

#[derive(Debug, Clone)]
pub struct ReinforcementMachine {
    phase: Phase,
    previous: LineSample,
    cooldown: Duration,
}

impl ReinforcementMachine {
    pub fn new(initial: LineSample, cooldown: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            previous: initial,
            cooldown,
        }
    }

    /// Feeds one sample. The sample always becomes the new edge reference,
    /// including while locked, so a press held through the cooldown never
    /// fires late.
    pub fn step(&mut self, sample: LineSample, now: Instant) -> Option<ReinforcementEvent> {
        let (phase, fired) = transition(self.phase, self.previous, sample, now, self.cooldown);
        self.phase = phase;
        self.previous = sample;
        fired.map(|kind| ReinforcementEvent { kind, at: now })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}
