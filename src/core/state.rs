use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::memory::{LearningState, MovementMemoryEntry, PersistentStore, ShortTermMemory};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BobertConfig {
    pub data_dir: PathBuf,
    pub log_file: String,
    pub learning_state_file: String,
    pub movement_memory_file: String,
    pub short_term_file: String,

    pub reward_pin: u32,
    pub punish_pin: u32,
    pub gpio_base: u32,
    pub active_low: bool,
    pub sample_interval_ms: u64,
    pub cooldown_secs: f64,
    pub memory_capacity: usize,

    pub tick_interval_ms: u64,
    pub sample_rate: u32,
    pub listen_secs: f64,
    pub speak_secs: f64,
    pub speak_probability: f64,

    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_device: String,

    pub serial_ports: Vec<String>,
    pub baud_rate: u32,
    pub dispatch_poll_ms: u64,

    pub backfill_movement_reward: bool,
    pub log_line_samples: bool,
}

impl Default for BobertConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("logs"),
            log_file: "touchbert_cleaned_log.txt".to_string(),
            learning_state_file: "learning_state.json".to_string(),
            movement_memory_file: "movement_memory.json".to_string(),
            short_term_file: "learning_log.json".to_string(),
            reward_pin: 12,
            punish_pin: 16,
            gpio_base: 0,
            active_low: true,
            sample_interval_ms: 50,
            cooldown_secs: 5.0,
            memory_capacity: crate::memory::SHORT_TERM_CAPACITY,
            tick_interval_ms: 1000,
            sample_rate: 16000,
            listen_secs: 1.0,
            speak_secs: 1.0,
            speak_probability: 0.5,
            camera_width: 320,
            camera_height: 240,
            camera_device: "/dev/video0".to_string(),
            serial_ports: vec![
                "/dev/ttyUSB0".to_string(),
                "/dev/ttyUSB1".to_string(),
                "/dev/ttyACM0".to_string(),
                "/dev/ttyACM1".to_string(),
            ],
            baud_rate: 9600,
            dispatch_poll_ms: 1000,
            backfill_movement_reward: false,
            log_line_samples: false,
        }
    }
}

impl BobertConfig {
    /// Resolves the effective configuration: `.env`, then the data dir's
    /// `config.toml`, then environment overrides. Never fails; a broken
    /// config file falls back to defaults with a warning.
    pub fn load() -> Self {
        dotenvy::from_filename(".env").ok();
        let data_dir = env::var("BOBERT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default().data_dir);
        let mut config = Self::load_from(&data_dir.join(CONFIG_FILE));
        config.data_dir = data_dir;
        config.apply_env_overrides();
        config
    }

    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{} Invalid config {:?}: {}. Using defaults.", "⚠️".yellow(), path, e);
                Self::default()
            }
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(pin) = env_parse::<u32>("BOBERT_REWARD_PIN") {
            self.reward_pin = pin;
        }
        if let Some(pin) = env_parse::<u32>("BOBERT_PUNISH_PIN") {
            self.punish_pin = pin;
        }
        if let Some(secs) = env_parse::<f64>("BOBERT_COOLDOWN_SECS") {
            self.cooldown_secs = secs;
        }
    }

    pub fn write_default(dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        let config = Self {
            data_dir: dir.to_path_buf(),
            ..Self::default()
        };
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, toml::to_string_pretty(&config)?)?;
        Ok(path)
    }

    /// Human-readable problems with the effective configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.reward_pin == self.punish_pin {
            warnings.push(format!("reward_pin and punish_pin are both {}", self.reward_pin));
        }
        if self.memory_capacity == 0 {
            warnings.push("memory_capacity is 0, short-term memory will hold a single record".to_string());
        }
        if !(self.cooldown_secs > 0.0) {
            warnings.push(format!("cooldown_secs = {} disables debouncing", self.cooldown_secs));
        }
        if Duration::from_millis(self.sample_interval_ms) >= self.cooldown() {
            warnings.push("sample_interval_ms is not shorter than the cooldown".to_string());
        }
        if !(0.0..=1.0).contains(&self.speak_probability) {
            warnings.push(format!("speak_probability = {} is outside [0, 1]", self.speak_probability));
        }
        if !is_raspberry_pi() {
            warnings.push("This doesn't appear to be a Raspberry Pi; GPIO and camera may not work".to_string());
        }
        warnings
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs.max(0.0))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn is_raspberry_pi() -> bool {
    fs::read_to_string("/proc/cpuinfo")
        .map(|c| c.contains("BCM"))
        .unwrap_or(false)
}

/// Everything the control loop and the reinforcement sampler both mutate.
#[derive(Debug, Clone, Default)]
pub struct Brain {
    pub learning: LearningState,
    pub short_term: ShortTermMemory,
    pub movement: Vec<MovementMemoryEntry>,
}

impl Brain {
    pub fn load(store: &PersistentStore, capacity: usize) -> Self {
        Self {
            learning: store.load_learning_state(),
            short_term: store.load_short_term(capacity),
            movement: store.load_movement_memory(),
        }
    }

    /// Writes all three documents. Each is independently atomic.
    pub fn flush(&mut self, store: &PersistentStore) -> Result<()> {
        store.save_learning_state(&mut self.learning)?;
        store.save_short_term(&self.short_term)?;
        store.save_movement_memory(&self.movement)?;
        Ok(())
    }
}

/// Shared handle passed to every activity. `brain` is the single
/// synchronization boundary for in-memory state.
#[derive(Clone)]
pub struct GlobalState {
    pub config: Arc<BobertConfig>,
    pub store: Arc<PersistentStore>,
    pub brain: Arc<Mutex<Brain>>,
}

impl GlobalState {
    pub fn new(config: BobertConfig, store: PersistentStore, brain: Brain) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            brain: Arc::new(Mutex::new(brain)),
        }
    }

    /// Loads (or defaults) every document under the configured data dir and
    /// writes the learning state back so it exists on disk from the start.
    pub fn bootstrap(config: BobertConfig) -> Result<Self> {
        let store = PersistentStore::from_config(&config);
        store.ensure_root()?;
        let mut brain = Brain::load(&store, config.memory_capacity);
        if let Err(e) = store.save_learning_state(&mut brain.learning) {
            eprintln!("{} Failed to save learning state: {:#}", "❌".red(), e);
        }
        Ok(Self::new(config, store, brain))
    }
}
