use anyhow::{anyhow, Context, Result};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SYSFS_GPIO: &str = "/sys/class/gpio";

/// Non-blocking access to digital input lines. Returns the raw electrical
/// level (`true` = high); polarity is applied by the caller.
pub trait DigitalLines: Send + Sync {
    fn read(&self, pin: u32) -> Result<bool>;
}

/// Input pins driven through the Linux sysfs GPIO interface.
///
/// Pins exported by `open` are unexported again on drop.
pub struct SysfsLines {
    root: PathBuf,
    base: u32,
    exported: Vec<u32>,
}

impl SysfsLines {
    /// Opens the pins on the blocking pool, since exporting waits for udev.
    pub async fn open(pins: &[u32], base: u32) -> Result<Self> {
        Self::open_in_background(PathBuf::from(SYSFS_GPIO), pins.to_vec(), base).await
    }

    pub async fn open_in_background(root: PathBuf, pins: Vec<u32>, base: u32) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::open_at(&root, &pins, base))
            .await
            .context("GPIO setup task failed")?
    }

    /// Blocking: sleeps after each export. Not for use on an async worker.
    pub fn open_at(root: &Path, pins: &[u32], base: u32) -> Result<Self> {
        if !root.join("export").exists() {
            return Err(anyhow!("GPIO interface not found at {:?}", root));
        }
        let mut lines = Self {
            root: root.to_path_buf(),
            base,
            exported: Vec::new(),
        };
        for &pin in pins {
            lines.setup_input(pin)?;
        }
        Ok(lines)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", self.base + pin))
    }

    fn setup_input(&mut self, pin: u32) -> Result<()> {
        let line = self.base + pin;
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            fs::write(self.root.join("export"), line.to_string())
                .with_context(|| format!("Failed to export GPIO {}", line))?;
            self.exported.push(pin);
            // udev needs a moment to fix permissions on the new node
            std::thread::sleep(Duration::from_millis(100));
        }
        fs::write(dir.join("direction"), "in")
            .with_context(|| format!("Failed to set GPIO {} as input", line))?;
        Ok(())
    }
}

impl DigitalLines for SysfsLines {
    fn read(&self, pin: u32) -> Result<bool> {
        let path = self.pin_dir(pin).join("value");
        let raw = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(anyhow!("Unexpected GPIO value {:?} on {:?}", other, path)),
        }
    }
}

impl Drop for SysfsLines {
    fn drop(&mut self) {
        for pin in &self.exported {
            let line = self.base + pin;
            if let Err(e) = fs::write(self.root.join("unexport"), line.to_string()) {
                eprintln!("{} Failed to release GPIO {}: {}", "⚠️".yellow(), line, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(pins: &[u32]) -> Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("export"), "")?;
        fs::write(dir.path().join("unexport"), "")?;
        for pin in pins {
            let pin_dir = dir.path().join(format!("gpio{}", pin));
            fs::create_dir_all(&pin_dir)?;
            fs::write(pin_dir.join("value"), "1\n")?;
        }
        Ok(dir)
    }

    #[test]
    fn test_reads_levels() -> Result<()> {
        let dir = fake_sysfs(&[12, 16])?;
        let lines = SysfsLines::open_at(dir.path(), &[12, 16], 0)?;
        assert!(lines.read(12)?);
        fs::write(dir.path().join("gpio16/value"), "0\n")?;
        assert!(!lines.read(16)?);
        assert_eq!(fs::read_to_string(dir.path().join("gpio12/direction"))?, "in");
        Ok(())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_open_does_not_stall_the_runtime() -> Result<()> {
        let dir = fake_sysfs(&[12])?;
        // gpio16 only appears while the export settles, and only if this
        // runtime thread is free to create it.
        let node = dir.path().join("gpio16");
        let udev = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            fs::create_dir_all(&node)
        });

        let lines = SysfsLines::open_in_background(dir.path().to_path_buf(), vec![12, 16], 0).await?;
        udev.await??;
        assert_eq!(fs::read_to_string(dir.path().join("gpio16/direction"))?, "in");
        assert_eq!(fs::read_to_string(dir.path().join("export"))?, "16");

        drop(lines);
        assert_eq!(fs::read_to_string(dir.path().join("unexport"))?, "16");
        Ok(())
    }

    #[test]
    fn test_missing_interface_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SysfsLines::open_at(&dir.path().join("nope"), &[12], 0).is_err());
    }

    #[test]
    fn test_garbage_value_is_read_error() -> Result<()> {
        let dir = fake_sysfs(&[524])?;
        let lines = SysfsLines::open_at(dir.path(), &[12], 512)?;
        fs::write(dir.path().join("gpio524/value"), "x")?;
        assert!(lines.read(12).is_err());
        Ok(())
    }
}
