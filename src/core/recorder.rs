use super::state::GlobalState;
use super::Move;
use crate::memory::{MovementMemoryEntry, ShortTermRecord};
use anyhow::{Context, Result};

/// One completed listen/speak exchange, ready to be remembered.
#[derive(Debug, Clone, Default)]
pub struct Interaction {
    pub stamp: String,
    pub input_audio_ref: Option<String>,
    pub output_audio_ref: Option<String>,
    pub spoke: bool,
    pub movement: Option<Move>,
    pub vision_ref: Option<String>,
}

impl Interaction {
    fn audit_line(&self) -> String {
        let mut parts = vec![format!("spoke={}", self.spoke)];
        if let Some(input) = &self.input_audio_ref {
            parts.push(format!("input=\"{}\"", input));
        }
        if let Some(output) = &self.output_audio_ref {
            parts.push(format!("output=\"{}\"", output));
        }
        if let Some(m) = self.movement {
            parts.push(format!("move={}", m));
        }
        parts.join(" | ")
    }
}

/// Appends the chosen move to movement memory and, once it is saved,
/// announces it on the audit log, which is what the motor dispatcher follows.
/// A move that could not be saved is never driven.
pub async fn record_movement(state: &GlobalState, vision_ref: &str, movement: Move) -> Result<()> {
    {
        let mut brain = state.brain.lock().await;
        brain.movement.push(MovementMemoryEntry::new(vision_ref, movement));
        state
            .store
            .save_movement_memory(&brain.movement)
            .context("Failed to save movement memory")?;
    }
    state.store.log(&format!("vision={} | move={}", vision_ref, movement));
    Ok(())
}

/// Appends the interaction to short-term memory (evicting past capacity) and
/// persists it before releasing the lock, so the next reinforcement tick sees
/// the record complete.
pub async fn record_interaction(state: &GlobalState, interaction: Interaction) -> Result<()> {
    let line = interaction.audit_line();
    let record = ShortTermRecord {
        timestamp: interaction.stamp,
        input_audio_ref: interaction.input_audio_ref,
        output_audio_ref: interaction.output_audio_ref,
        spoke: interaction.spoke,
        reinforcement: None,
        vision_ref: interaction.vision_ref,
    };

    {
        let mut brain = state.brain.lock().await;
        brain.short_term.push(record);
        state
            .store
            .save_short_term(&brain.short_term)
            .context("Failed to save short-term memory")?;
    }
    state.store.log(&line);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{BobertConfig, Brain};
    use crate::memory::PersistentStore;
    use std::fs;

    fn test_state(dir: &std::path::Path) -> GlobalState {
        let config = BobertConfig { data_dir: dir.to_path_buf(), ..BobertConfig::default() };
        let store = PersistentStore::from_config(&config);
        GlobalState::new(config, store, Brain::default())
    }

    #[tokio::test]
    async fn test_record_movement_persists_and_logs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let state = test_state(dir.path());

        record_movement(&state, "cam_abc.jpg", Move::Right).await?;

        let on_disk = state.store.load_movement_memory();
        assert_eq!(on_disk, vec![MovementMemoryEntry::new("cam_abc.jpg", Move::Right)]);
        let log = fs::read_to_string(state.store.log_path())?;
        assert!(log.trim_end().ends_with("| vision=cam_abc.jpg | move=right"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unsaved_movement_is_not_announced() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let state = test_state(dir.path());
        fs::create_dir_all(dir.path().join("movement_memory.json"))?;

        assert!(record_movement(&state, "cam_abc.jpg", Move::Right).await.is_err());

        let log = fs::read_to_string(state.store.log_path()).unwrap_or_default();
        assert!(!log.contains("move="));
        Ok(())
    }

    #[tokio::test]
    async fn test_record_interaction_bounds_memory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let state = test_state(dir.path());

        for i in 0..12 {
            record_interaction(&state, Interaction {
                stamp: format!("t{}", i),
                movement: Some(Move::Left),
                vision_ref: Some(format!("cam_{}.jpg", i)),
                ..Default::default()
            })
            .await?;
        }

        let brain = state.brain.lock().await;
        assert_eq!(brain.short_term.len(), 10);
        assert_eq!(brain.short_term.iter().next().unwrap().timestamp, "t2");

        let on_disk = state.store.load_short_term(10);
        assert_eq!(on_disk.len(), 10);
        assert_eq!(on_disk.last().unwrap().reinforcement, None);
        Ok(())
    }

    #[test]
    fn test_audit_line_shape() {
        let interaction = Interaction {
            stamp: "t".into(),
            input_audio_ref: Some("logs/t/t_input.wav".into()),
            output_audio_ref: None,
            spoke: false,
            movement: Some(Move::Forward),
            vision_ref: None,
        };
        assert_eq!(interaction.audit_line(), "spoke=false | input=\"logs/t/t_input.wav\" | move=forward");
    }
}
