use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use colored::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use super::recorder::{self, Interaction};
use super::selector::select_move;
use super::state::GlobalState;
use super::Move;
use crate::io::audio::{AudioClip, AudioDevice};
use crate::io::vision::VisionCapture;

/// Sensor collaborators the control loop drives each tick.
#[derive(Clone)]
pub struct Senses {
    pub vision: Arc<dyn VisionCapture>,
    pub audio: Option<Arc<dyn AudioDevice>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Calm,
    Curious,
    Excited,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Calm => "calm",
            Mood::Curious => "curious",
            Mood::Excited => "excited",
        }
    }
}

/// Mood from the mean absolute level of what was heard.
pub fn summarize_mood(level: f64) -> Mood {
    if level > 0.2 {
        Mood::Excited
    } else if level > 0.05 {
        Mood::Curious
    } else {
        Mood::Calm
    }
}

pub fn choose_to_speak<R: Rng>(rng: &mut R, probability: f64) -> bool {
    if !(probability > 0.0) {
        return false;
    }
    rng.gen_bool(probability.min(1.0))
}

/// A random contiguous slice of `input` lasting `len` samples, or all of it
/// when it is shorter.
pub fn response_window<R: Rng>(rng: &mut R, input: &AudioClip, len: usize) -> AudioClip {
    if input.samples.len() <= len {
        return input.clone();
    }
    let start = rng.gen_range(0..=input.samples.len() - len);
    input.window(start, len)
}

/// Filesystem-safe UTC stamp naming one interaction's artifacts.
pub fn interaction_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H_%M_%S_%6f").to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub movement: Move,
    pub vision_ref: String,
    pub spoke: bool,
    pub mood: Option<Mood>,
}

pub async fn control_loop(state: GlobalState, senses: Senses, cancel: CancellationToken) {
    state.store.log("Bobert is online. Listening, thinking, maybe speaking.");
    if senses.audio.is_none() {
        println!("{} No audio device available, running without listening", "⚠️".yellow());
    }
    println!("{}", "🤖 Control loop: ONLINE".green().bold());

    let mut rng = StdRng::from_entropy();
    let pause = state.config.tick_interval();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            res = tick_once(&state, &senses, &mut rng) => {
                if let Err(e) = res {
                    eprintln!("{} Error in main loop: {:#}", "❌".red(), e);
                }
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
    println!("{}", "🤖 Control loop stopped.".blue());
}

/// Trips `cancel` when `signal` fires. A signal handler that could not be
/// installed is reported and leaves the robot running.
pub async fn cancel_on_signal<F>(signal: F, cancel: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            println!("\n{}", "Shutting down Bobert...".yellow());
            cancel.cancel();
        }
        Err(e) => eprintln!("{} Ctrl-C handler unavailable, stop with SIGTERM: {}", "⚠️".yellow(), e),
    }
}

/// select → capture → record movement → listen / maybe speak → record
/// interaction → summarize.
pub async fn tick_once<R: Rng + Send>(
    state: &GlobalState,
    senses: &Senses,
    rng: &mut R,
) -> Result<TickReport> {
    let config = &state.config;
    let store = &state.store;

    let movement = {
        let brain = state.brain.lock().await;
        select_move(&brain.movement)
    };
    let vision_ref = senses.vision.capture().await;
    if let Err(e) = recorder::record_movement(state, &vision_ref, movement).await {
        eprintln!("{} {:#}", "❌".red(), e);
    }

    let heard = match &senses.audio {
        Some(audio) => {
            store.log("status=starting_recording");
            let clip = audio
                .record(std::time::Duration::from_secs_f64(config.listen_secs.max(0.0)))
                .await;
            store.log("status=recording_finished");
            match clip {
                Ok(c) => Some(c),
                Err(e) => {
                    eprintln!("{} Failed to record audio: {:#}", "❌".red(), e);
                    None
                }
            }
        }
        None => None,
    };

    let mut spoke = false;
    let mut spoken = None;
    if let (Some(audio), Some(input)) = (&senses.audio, &heard) {
        if choose_to_speak(rng, config.speak_probability) {
            let len = (config.speak_secs.max(0.0) * input.sample_rate as f64) as usize;
            let response = response_window(rng, input, len);
            match audio.play(&response).await {
                Ok(()) => spoke = true,
                Err(e) => eprintln!("{} Failed to play audio: {:#}", "❌".red(), e),
            }
            spoken = Some(response);
        }
    }

    let stamp = interaction_stamp();
    let dir = config.data_dir.join(&stamp);
    let input_audio_ref = heard
        .as_ref()
        .and_then(|clip| save_clip(clip, dir.join(format!("{}_input.wav", stamp))));
    let output_audio_ref = match (&spoken, spoke) {
        (Some(clip), true) => save_clip(clip, dir.join(format!("{}_output.wav", stamp))),
        _ => None,
    };

    recorder::record_interaction(state, Interaction {
        stamp,
        input_audio_ref,
        output_audio_ref,
        spoke,
        movement: Some(movement),
        vision_ref: Some(vision_ref.clone()),
    })
    .await?;

    let mood = heard.as_ref().map(|clip| {
        let level = clip.mean_level();
        let mood = summarize_mood(level);
        store.log(&format!("emotion={} | avg_volume={:.4} | status=idle", mood.as_str(), level));
        mood
    });

    Ok(TickReport { movement, vision_ref, spoke, mood })
}

fn save_clip(clip: &AudioClip, path: PathBuf) -> Option<String> {
    match clip.write_wav(&path) {
        Ok(()) => Some(path.to_string_lossy().to_string()),
        Err(e) => {
            eprintln!("{} Failed to log interaction audio: {:#}", "❌".red(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{BobertConfig, Brain};
    use crate::memory::{MovementMemoryEntry, PersistentStore};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StillCamera;

    #[async_trait]
    impl VisionCapture for StillCamera {
        async fn capture(&self) -> String {
            "cam_test.jpg".to_string()
        }
    }

    struct LoudMic;

    #[async_trait]
    impl AudioDevice for LoudMic {
        async fn record(&self, duration: Duration) -> Result<AudioClip> {
            let n = (duration.as_secs_f64() * 100.0) as usize;
            Ok(AudioClip::new(vec![16000; n], 100))
        }
        async fn play(&self, _clip: &AudioClip) -> Result<()> {
            Ok(())
        }
    }

    fn state_with(dir: &std::path::Path, speak_probability: f64) -> GlobalState {
        let config = BobertConfig {
            data_dir: dir.to_path_buf(),
            speak_probability,
            listen_secs: 1.0,
            speak_secs: 0.5,
            ..BobertConfig::default()
        };
        let store = PersistentStore::from_config(&config);
        GlobalState::new(config, store, Brain::default())
    }

    #[test]
    fn test_mood_thresholds() {
        assert_eq!(summarize_mood(0.0), Mood::Calm);
        assert_eq!(summarize_mood(0.05), Mood::Calm);
        assert_eq!(summarize_mood(0.1), Mood::Curious);
        assert_eq!(summarize_mood(0.5), Mood::Excited);
    }

    #[test]
    fn test_speak_probability_edges() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(!choose_to_speak(&mut rng, 0.0));
        assert!(!choose_to_speak(&mut rng, f64::NAN));
        assert!(choose_to_speak(&mut rng, 1.0));
        assert!(choose_to_speak(&mut rng, 3.0));
    }

    #[test]
    fn test_response_window_is_contiguous() {
        let mut rng = StdRng::seed_from_u64(1);
        let input = AudioClip::new((0..100).collect(), 100);
        let out = response_window(&mut rng, &input, 10);
        assert_eq!(out.samples.len(), 10);
        assert!(out.samples.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(response_window(&mut rng, &input, 500), input);
    }

    #[tokio::test]
    async fn test_tick_records_everything() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let state = state_with(dir.path(), 1.0);
        let senses = Senses { vision: Arc::new(StillCamera), audio: Some(Arc::new(LoudMic)) };
        let mut rng = StdRng::seed_from_u64(3);

        let report = tick_once(&state, &senses, &mut rng).await?;
        assert_eq!(report.movement, Move::Left);
        assert!(report.spoke);
        assert_eq!(report.mood, Some(Mood::Excited));

        assert_eq!(
            state.store.load_movement_memory(),
            vec![MovementMemoryEntry::new("cam_test.jpg", Move::Left)]
        );
        let stm = state.store.load_short_term(10);
        let record = stm.last().unwrap();
        assert_eq!(record.vision_ref.as_deref(), Some("cam_test.jpg"));
        assert!(record.spoke);
        assert!(std::path::Path::new(record.input_audio_ref.as_ref().unwrap()).exists());
        assert!(std::path::Path::new(record.output_audio_ref.as_ref().unwrap()).exists());

        let log = std::fs::read_to_string(state.store.log_path())?;
        assert!(log.contains("| vision=cam_test.jpg | move=left"));
        assert!(log.contains("emotion=excited"));
        Ok(())
    }

    #[tokio::test]
    async fn test_tick_without_audio_degrades() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let state = state_with(dir.path(), 1.0);
        let senses = Senses { vision: Arc::new(StillCamera), audio: None };
        let mut rng = StdRng::seed_from_u64(3);

        let report = tick_once(&state, &senses, &mut rng).await?;
        assert!(!report.spoke);
        assert_eq!(report.mood, None);
        let stm = state.store.load_short_term(10);
        assert_eq!(stm.last().unwrap().input_audio_ref, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), 0.0);
        let senses = Senses { vision: Arc::new(StillCamera), audio: None };
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(control_loop(state.clone(), senses, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(!state.brain.lock().await.movement.is_empty());
    }

    #[tokio::test]
    async fn test_failed_signal_handler_does_not_cancel() {
        let cancel = CancellationToken::new();
        let broken = async { Err(std::io::Error::new(std::io::ErrorKind::Other, "no handler")) };
        cancel_on_signal(broken, cancel.clone()).await;
        assert!(!cancel.is_cancelled());

        cancel_on_signal(async { Ok(()) }, cancel.clone()).await;
        assert!(cancel.is_cancelled());
    }
}
