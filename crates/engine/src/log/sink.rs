//! JSONL event sink
//!
//! One owned writer per session; `seq` is assigned here, at emission, which
//! makes it the total order for the whole log. Every append flushes - the
//! log is training data and a crash must not lose adjudicated events. A
//! write failure is fatal to the session.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use aeonisk_domain::SessionId;
use aeonisk_shared::EventRecord;

use crate::error::SessionError;

/// Append-only JSONL sink with exclusive ownership.
pub struct EventLog {
    writer: BufWriter<File>,
    path: PathBuf,
    seq: u64,
    session_id: SessionId,
}

impl EventLog {
    /// Create `{output_dir}/session_{uuid}.jsonl`, creating the directory
    /// as needed.
    pub fn create(output_dir: &Path, session_id: SessionId) -> Result<Self, SessionError> {
        fs::create_dir_all(output_dir)
            .map_err(|e| SessionError::LogWrite(format!("create {}: {e}", output_dir.display())))?;
        let path = output_dir.join(format!("session_{session_id}.jsonl"));
        let file = File::create(&path)
            .map_err(|e| SessionError::LogWrite(format!("create {}: {e}", path.display())))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            seq: 0,
            session_id,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Next sequence number that will be assigned.
    pub fn next_seq(&self) -> u64 {
        self.seq + 1
    }

    /// Assign `seq`, append one line, flush. Returns the assigned seq.
    pub fn emit(&mut self, mut record: EventRecord) -> Result<u64, SessionError> {
        self.seq += 1;
        record.seq = self.seq;

        let line = serde_json::to_string(&record)
            .map_err(|e| SessionError::LogWrite(format!("serialize event: {e}")))?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush())
            .map_err(|e| SessionError::LogWrite(format!("append {}: {e}", self.path.display())))?;

        tracing::trace!(seq = self.seq, event = record.event_type.as_str(), "event");
        Ok(self.seq)
    }
}

/// Read a JSONL log back into records.
pub fn read_log(path: &Path) -> Result<Vec<EventRecord>, SessionError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| SessionError::LogWrite(format!("read {}: {e}", path.display())))?;
    let mut records = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: EventRecord = serde_json::from_str(line).map_err(|e| {
            SessionError::LogWrite(format!("{}:{}: bad event: {e}", path.display(), lineno + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}
