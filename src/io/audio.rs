use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Mono 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Mean absolute amplitude in `[0, 1]`.
    pub fn mean_level(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|s| (*s as f64).abs() / 32768.0).sum();
        sum / self.samples.len() as f64
    }

    /// Copy of `len` samples starting at `start`, clamped to the clip.
    pub fn window(&self, start: usize, len: usize) -> AudioClip {
        let start = start.min(self.samples.len());
        let end = start.saturating_add(len).min(self.samples.len());
        AudioClip::new(self.samples[start..end].to_vec(), self.sample_rate)
    }

    /// Writes a canonical 44-byte-header PCM WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data_len = (self.samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&(self.sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in &self.samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        let mut file = fs::File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        file.write_all(&out)?;
        Ok(())
    }
}

#[async_trait]
pub trait AudioDevice: Send + Sync {
    /// Blocks (asynchronously) for `duration` while recording.
    async fn record(&self, duration: Duration) -> Result<AudioClip>;
    /// Blocks until the clip has finished playing.
    async fn play(&self, clip: &AudioClip) -> Result<()>;
}

/// ALSA capture/playback through `arecord`/`aplay` raw streams.
pub struct AlsaAudio {
    sample_rate: u32,
}

impl AlsaAudio {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Checks that the ALSA tools are installed.
    pub async fn probe(sample_rate: u32) -> Result<Self> {
        for tool in ["arecord", "aplay"] {
            let ok = Command::new(tool)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false);
            if !ok {
                return Err(anyhow!("{} not available", tool));
            }
        }
        Ok(Self::new(sample_rate))
    }

    fn format_args(&self, cmd: &mut Command) {
        cmd.args(["-q", "-t", "raw", "-f", "S16_LE", "-c", "1", "-r"])
            .arg(self.sample_rate.to_string());
    }
}

#[async_trait]
impl AudioDevice for AlsaAudio {
    async fn record(&self, duration: Duration) -> Result<AudioClip> {
        let wanted = (duration.as_secs_f64() * self.sample_rate as f64) as usize;
        let mut cmd = Command::new("arecord");
        self.format_args(&mut cmd);
        cmd.arg("-s")
            .arg(wanted.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = cmd.output().await.context("Failed to run arecord")?;
        if !output.status.success() {
            return Err(anyhow!("arecord exited with {}", output.status));
        }
        let samples = output
            .stdout
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Ok(AudioClip::new(samples, self.sample_rate))
    }

    async fn play(&self, clip: &AudioClip) -> Result<()> {
        let mut cmd = Command::new("aplay");
        self.format_args(&mut cmd);
        let mut child = cmd
            .stdin(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to run aplay")?;

        let bytes: Vec<u8> = clip.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&bytes).await?;
        }
        let status = child.wait().await?;
        if !status.success() {
            return Err(anyhow!("aplay exited with {}", status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_level() {
        let clip = AudioClip::new(vec![16384, -16384, 0, 0], 16000);
        assert!((clip.mean_level() - 0.25).abs() < 1e-9);
        assert_eq!(AudioClip::default().mean_level(), 0.0);
    }

    #[test]
    fn test_window_clamps() {
        let clip = AudioClip::new((0..10).collect(), 10);
        assert_eq!(clip.window(8, 5).samples, vec![8, 9]);
        assert!(clip.window(20, 5).samples.is_empty());
        assert_eq!(clip.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_wav_header() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/clip.wav");
        AudioClip::new(vec![1, -1, 300], 16000).write_wav(&path)?;

        let bytes = fs::read(&path)?;
        assert_eq!(bytes.len(), 44 + 6);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 16000);
        assert_eq!(u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]), 6);
        Ok(())
    }
}
