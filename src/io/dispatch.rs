//! Follows the audit log and forwards the latest `move=` to the motors.

use anyhow::{Context, Result};
use colored::*;
use regex::Regex;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::OnceLock;

use crate::core::Move;
use crate::io::serial::SerialLine;

/// Command sent when no recognizable move is found.
pub const NEUTRAL: char = 'n';

/// How much of the end of the log a scan looks at.
pub const TAIL_BYTES: u64 = 64 * 1024;

pub trait CommandSink {
    fn send(&mut self, cmd: char) -> Result<()>;
}

impl CommandSink for SerialLine {
    fn send(&mut self, cmd: char) -> Result<()> {
        SerialLine::send(self, cmd)
    }
}

impl CommandSink for Vec<char> {
    fn send(&mut self, cmd: char) -> Result<()> {
        self.push(cmd);
        Ok(())
    }
}

fn move_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)move="?([^\s"|]*)"?"#).ok()).as_ref()
}

pub fn command_for(m: Option<Move>) -> char {
    match m {
        Some(Move::Left) => 'l',
        Some(Move::Forward) => 'f',
        Some(Move::Right) => 'r',
        None => NEUTRAL,
    }
}

/// Maps the last `move=` token on a line to a motor command.
pub fn parse_move_command(line: &str) -> char {
    let Some(re) = move_re() else {
        return NEUTRAL;
    };
    let token = re
        .captures_iter(line)
        .last()
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str());
    command_for(token.and_then(Move::parse))
}

/// Command for the most recent log line mentioning `move=`, if any.
pub fn latest_move_command(log: &str) -> Option<char> {
    log.lines()
        .rev()
        .find(|l| l.to_ascii_lowercase().contains("move="))
        .map(parse_move_command)
}

/// Reads the last `max_bytes` of the log as text. Invalid UTF-8 is replaced,
/// and a line cut by the window start is dropped. `None` when the log does
/// not exist yet.
pub fn read_log_tail(path: &Path, max_bytes: u64) -> Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to open log {:?}", path)),
    };
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat log {:?}", path))?
        .len();
    let start = len.saturating_sub(max_bytes);
    file.seek(SeekFrom::Start(start))
        .with_context(|| format!("Failed to seek log {:?}", path))?;

    let mut bytes = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read log {:?}", path))?;

    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if start > 0 {
        if let Some(cut) = text.find('\n') {
            text.drain(..=cut);
        }
    }
    Ok(Some(text))
}

pub struct Dispatcher<S: CommandSink> {
    sink: S,
    last_sent: Option<char>,
}

impl<S: CommandSink> Dispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink, last_sent: None }
    }

    /// Re-reads the log and sends the current command if it changed.
    /// Returns the command actually written.
    pub fn scan(&mut self, log_path: &Path) -> Result<Option<char>> {
        let Some(log) = read_log_tail(log_path, TAIL_BYTES)? else {
            return Ok(None);
        };
        let Some(cmd) = latest_move_command(&log) else {
            return Ok(None);
        };
        if self.last_sent == Some(cmd) {
            return Ok(None);
        }
        self.sink.send(cmd)?;
        self.last_sent = Some(cmd);
        println!("{} Sent command: {}", "🛞".cyan(), cmd);
        Ok(Some(cmd))
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
