use super::{now_iso, LearningState, MovementMemoryEntry, ShortTermMemory, ShortTermRecord};
use crate::core::state::BobertConfig;
use anyhow::{Context, Result};
use colored::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable home of the three JSON documents and the audit log.
///
/// - Loads never fail: a missing or malformed document reads as its default.
/// - Saves replace the whole document through a temp file + rename, so a
///   crash mid-write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct PersistentStore {
    root: PathBuf,
    learning_state_path: PathBuf,
    movement_memory_path: PathBuf,
    short_term_path: PathBuf,
    log_path: PathBuf,
}

impl PersistentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(&BobertConfig {
            data_dir: root.into(),
            ..BobertConfig::default()
        })
    }

    pub fn from_config(config: &BobertConfig) -> Self {
        let root = config.data_dir.clone();
        Self {
            learning_state_path: root.join(&config.learning_state_file),
            movement_memory_path: root.join(&config.movement_memory_file),
            short_term_path: root.join(&config.short_term_file),
            log_path: root.join(&config.log_file),
            root,
        }
    }

    pub fn root(&self) -> &Path { &self.root }
    pub fn log_path(&self) -> &Path { &self.log_path }

    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create data dir {:?}", self.root))
    }

    pub fn load_learning_state(&self) -> LearningState {
        read_json_or_default(&self.learning_state_path)
    }

    /// Stamps `last_updated` and writes the document.
    pub fn save_learning_state(&self, state: &mut LearningState) -> Result<()> {
        state.touch();
        write_json_atomic(&self.learning_state_path, state)
    }

    /// Entries that fail to parse are skipped one by one rather than
    /// discarding the whole history.
    pub fn load_movement_memory(&self) -> Vec<MovementMemoryEntry> {
        let raw: Vec<Value> = read_json_or_default(&self.movement_memory_path);
        let total = raw.len();
        let entries: Vec<MovementMemoryEntry> = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        if entries.len() < total {
            eprintln!(
                "{} Skipped {} unreadable entries in {:?}",
                "⚠️".yellow(),
                total - entries.len(),
                self.movement_memory_path
            );
        }
        entries
    }

    pub fn save_movement_memory(&self, memory: &[MovementMemoryEntry]) -> Result<()> {
        write_json_atomic(&self.movement_memory_path, &memory)
    }

    pub fn load_short_term(&self, capacity: usize) -> ShortTermMemory {
        let records: Vec<ShortTermRecord> = read_json_or_default(&self.short_term_path);
        ShortTermMemory::from_records(records, capacity)
    }

    pub fn save_short_term(&self, memory: &ShortTermMemory) -> Result<()> {
        write_json_atomic(&self.short_term_path, memory.records())
    }

    /// Appends `<timestamp> | <entry>` to the audit log.
    pub fn append_log(&self, entry: &str) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open log {:?}", self.log_path))?;
        writeln!(file, "{} | {}", now_iso(), entry)?;
        Ok(())
    }

    /// Fire-and-forget variant for call sites that must never stop on a
    /// logging failure.
    pub fn log(&self, entry: &str) {
        if let Err(e) = self.append_log(entry) {
            eprintln!("{} Failed to write to log: {:#}", "❌".red(), e);
        }
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return T::default(),
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{} Malformed document {:?} ({}), using defaults", "⚠️".yellow(), path, e);
            T::default()
        }
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let json = serde_json::to_string_pretty(value)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let write = || -> Result<()> {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(json.as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        e.context(format!("Failed to save {:?}", path))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Move, Reinforcement};

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::new(dir.path());

        assert_eq!(store.load_learning_state(), LearningState::default());
        assert!(store.load_movement_memory().is_empty());
        assert!(store.load_short_term(10).is_empty());
    }

    #[test]
    fn test_load_malformed_returns_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PersistentStore::new(dir.path());
        fs::write(dir.path().join("learning_state.json"), "{ not json")?;
        fs::write(dir.path().join("movement_memory.json"), "[1, 2,")?;
        fs::write(dir.path().join("learning_log.json"), "\"oops\"")?;

        assert_eq!(store.load_learning_state(), LearningState::default());
        assert!(store.load_movement_memory().is_empty());
        assert!(store.load_short_term(10).is_empty());
        Ok(())
    }

    #[test]
    fn test_save_refreshes_last_updated_and_roundtrips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PersistentStore::new(dir.path());

        let mut state = LearningState::default();
        state.register(Reinforcement::Negative);
        store.save_learning_state(&mut state)?;
        assert!(state.last_updated.is_some());

        let loaded = store.load_learning_state();
        assert_eq!(loaded.punishment_points, 1);
        assert_eq!(loaded.last_updated, state.last_updated);

        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn test_movement_memory_skips_bad_entries() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PersistentStore::new(dir.path());
        fs::write(
            dir.path().join("movement_memory.json"),
            r#"[{"vision": "a.jpg", "move": "left", "reward": 2},
                {"vision": "b.jpg", "move": "null"},
                {"vision": "c.jpg", "move": "right"}]"#,
        )?;

        let memory = store.load_movement_memory();
        assert_eq!(memory.len(), 2);
        assert_eq!(memory[0].movement, Move::Left);
        assert_eq!(memory[0].reward, 2);
        assert_eq!(memory[1].reward, 0);
        Ok(())
    }

    #[test]
    fn test_append_log_format() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PersistentStore::new(dir.path());
        store.append_log("vision=cam_1.jpg | move=left")?;
        store.append_log("status=online")?;

        let content = fs::read_to_string(store.log_path())?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let (ts, rest) = lines[0].split_once(" | ").unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert_eq!(rest, "vision=cam_1.jpg | move=left");
        Ok(())
    }
}
