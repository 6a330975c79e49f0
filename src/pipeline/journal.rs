// Session event journal
// Append-only JSONL log of the events a session delivered, for offline inspection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::events::types::StreamEvent;

/// Errors that can occur during journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One delivered event, stamped with wall-clock time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// When the event was written
    pub timestamp: DateTime<Utc>,

    /// Session that produced the event
    pub session_id: Uuid,

    pub event: StreamEvent,
}

impl JournalEntry {
    /// Create an entry stamped with the current time
    pub fn new(session_id: Uuid, event: StreamEvent) -> Self {
        JournalEntry {
            timestamp: Utc::now(),
            session_id,
            event,
        }
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Writer for one session's journal file
pub struct EventJournal {
    file_path: PathBuf,
    session_id: Uuid,
}

impl EventJournal {
    pub fn new(file_path: PathBuf, session_id: Uuid) -> Self {
        EventJournal {
            file_path,
            session_id,
        }
    }

    /// Append one event, creating the file if needed
    pub fn write(&self, event: &StreamEvent) -> Result<(), JournalError> {
        self.write_batch(std::slice::from_ref(event))
    }

    /// Append several events with a single open and flush
    pub fn write_batch(&self, events: &[StreamEvent]) -> Result<(), JournalError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        for event in events {
            let entry = JournalEntry::new(self.session_id, event.clone());
            file.write_all(entry.to_json_line()?.as_bytes())?;
        }

        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

/// Read all entries from a journal file
pub fn read_journal(path: &Path) -> Result<Vec<JournalEntry>, JournalError> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }

    Ok(entries)
}
