use anyhow::{anyhow, Context, Result};
use colored::*;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::process::Command;

/// Write-only handle on the motor controller's serial line.
pub struct SerialLine {
    port: String,
    file: File,
}

impl SerialLine {
    /// Opens the first port in `candidates` that accepts a writer.
    pub fn open_first(candidates: &[String], baud: u32) -> Result<Self> {
        for port in candidates {
            match Self::open(port, baud) {
                Ok(line) => return Ok(line),
                Err(e) => eprintln!("{} Failed to connect to {}: {:#}", "⚠️".yellow(), port, e),
            }
        }
        Err(anyhow!("No serial ports available (tried {})", candidates.join(", ")))
    }

    pub fn open(port: &str, baud: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(port)
            .with_context(|| format!("Cannot open {}", port))?;
        // Line settings are best effort; a plain file or pty rejects them.
        let configured = Command::new("stty")
            .args(["-F", port])
            .arg(baud.to_string())
            .args(["raw", "-echo"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !configured {
            eprintln!("{} Could not set {} baud on {}", "⚠️".yellow(), baud, port);
        }
        Ok(Self { port: port.to_string(), file })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn send(&mut self, cmd: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.file.write_all(cmd.encode_utf8(&mut buf).as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}
