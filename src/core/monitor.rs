use std::time::Instant;

use anyhow::Result;
use colored::*;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::reinforcement::{LineSample, ReinforcementEvent, ReinforcementMachine};
use super::state::GlobalState;
use super::Reinforcement;
use crate::io::gpio::DigitalLines;
use crate::io::vision::NO_IMAGE;

const READ_FAILURE_REPORT_EVERY: u64 = 100;

/// What an applied event changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEvent {
    pub kind: Reinforcement,
    pub points: u64,
    pub attributed: bool,
    pub backfilled: bool,
}

/// Background sampler turning the two button lines into reinforcement.
pub struct ReinforcementMonitor {
    state: GlobalState,
    lines: Box<dyn DigitalLines>,
    machine: ReinforcementMachine,
    read_failures: u64,
}

impl ReinforcementMonitor {
    /// Takes the initial sample that seeds edge detection. Fails if the lines
    /// cannot be read at all.
    pub fn new(state: GlobalState, lines: Box<dyn DigitalLines>) -> Result<Self> {
        let initial = read_sample(&state, lines.as_ref())?;
        let machine = ReinforcementMachine::new(initial, state.config.cooldown());
        Ok(Self {
            state,
            lines,
            machine,
            read_failures: 0,
        })
    }

    /// Starts the sampler on its own task. Without hardware, or when the
    /// lines cannot be read at start-up, returns `None` and the robot runs
    /// without reinforcement.
    pub fn spawn(
        state: GlobalState,
        lines: Option<Box<dyn DigitalLines>>,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let Some(lines) = lines else {
            println!("{} GPIO not available, reinforcement monitoring disabled", "⚠️".yellow());
            return None;
        };
        match Self::new(state, lines) {
            Ok(monitor) => Some(tokio::spawn(monitor.run(cancel))),
            Err(e) => {
                eprintln!("{} Reinforcement monitor not started: {:#}", "⚠️".yellow(), e);
                None
            }
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        println!("{}", "🎛️  Reinforcement monitor: ONLINE".green().bold());
        let mut interval = tokio::time::interval(self.state.config.sample_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                tick = interval.tick() => {
                    self.tick(tick.into_std()).await;
                }
            }
        }
        println!("{}", "🎛️  Reinforcement monitor stopped.".blue());
    }

    /// One sampling step at `now`. Read and persistence failures are logged
    /// and never stop the sampler.
    pub async fn tick(&mut self, now: Instant) -> Option<ReinforcementEvent> {
        let sample = match read_sample(&self.state, self.lines.as_ref()) {
            Ok(s) => {
                if self.read_failures > 0 {
                    println!("{} GPIO reads recovered after {} failures", "✅".green(), self.read_failures);
                    self.read_failures = 0;
                }
                s
            }
            Err(e) => {
                if self.read_failures % READ_FAILURE_REPORT_EVERY == 0 {
                    eprintln!("{} Error in reinforcement monitoring: {:#}", "❌".red(), e);
                }
                self.read_failures += 1;
                return None;
            }
        };

        let event = self.machine.step(sample, now)?;
        if let Err(e) = self.apply(event).await {
            eprintln!("{} Failed to persist {} reinforcement: {:#}", "❌".red(), event.kind, e);
        }
        Some(event)
    }

    /// Applies an event to shared state. In-memory changes always happen and
    /// every touched document is saved; the returned error reports the first
    /// failed save.
    pub async fn apply(&self, event: ReinforcementEvent) -> Result<AppliedEvent> {
        apply_event(&self.state, event.kind).await
    }
}

/// Counts the event, attributes it to the newest short-term record and
/// optionally back-fills the matching movement entry. Everything touched is
/// saved while the brain lock is held.
pub async fn apply_event(state: &GlobalState, kind: Reinforcement) -> Result<AppliedEvent> {
    let store = &state.store;
    let mut brain = state.brain.lock().await;

    let points = brain.learning.register(kind);
    let attributed_to = brain.short_term.attribute_last(kind);

    let mut backfilled = false;
    if state.config.backfill_movement_reward {
        if let Some(Some(vision)) = &attributed_to {
            if vision != NO_IMAGE {
                if let Some(entry) = brain.movement.iter_mut().rev().find(|e| &e.vision_ref == vision) {
                    entry.reward += kind.delta();
                    backfilled = true;
                }
            }
        }
    }

    let counter = match kind {
        Reinforcement::Positive => "reward_points",
        Reinforcement::Negative => "punishment_points",
    };
    store.log(&format!("reinforcement={} | {}={}", kind, counter, points));
    println!("{} Reinforcement {} ({}={})", "🔔".cyan(), kind, counter, points);

    // Each document is saved independently; one failure must not skip the others.
    let attributed = attributed_to.is_some();
    let short_term_saved = if attributed {
        store.save_short_term(&brain.short_term)
    } else {
        Ok(())
    };
    let movement_saved = if backfilled {
        store.save_movement_memory(&brain.movement)
    } else {
        Ok(())
    };
    let learning_saved = store.save_learning_state(&mut brain.learning);
    short_term_saved.and(movement_saved).and(learning_saved)?;

    Ok(AppliedEvent { kind, points, attributed, backfilled })
}

fn read_sample(state: &GlobalState, lines: &dyn DigitalLines) -> Result<LineSample> {
    let config = &state.config;
    let reward_level = lines.read(config.reward_pin)?;
    let punish_level = lines.read(config.punish_pin)?;
    if config.log_line_samples {
        state.store.log(&format!(
            "debug_gpio_state | reward_pin={} | punish_pin={}",
            reward_level as u8, punish_level as u8
        ));
    }
    Ok(LineSample::new(
        reward_level != config.active_low,
        punish_level != config.active_low,
    ))
}
