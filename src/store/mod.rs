//! Append-only transcript persistence.
//!
//! Transcripts are stored as JSONL files, one per call: the first line is a
//! metadata header (with `_type: "metadata"`), followed by one JSON object
//! per stored entry. All writes are fire-and-forget — failures are logged
//! and never propagated into the live conversation path.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::{json, Value};
use tracing::warn;

use crate::session::{SessionSummary, Turn};
use crate::utils::{ensure_dir, safe_filename};

/// Appends conversation records to per-call JSONL files.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: ensure_dir(dir),
        }
    }

    /// Default transcript directory (`~/.voxloop/transcripts`).
    pub fn default_dir() -> PathBuf {
        crate::config::loader::get_data_dir().join("transcripts")
    }

    /// Append a turn record for `call_id`.
    pub fn store_turn(&self, call_id: &str, turn: &Turn) {
        let mut record = match serde_json::to_value(turn) {
            Ok(Value::Object(map)) => map,
            _ => return,
        };
        record.insert("_type".to_string(), json!("turn"));
        self.append(call_id, &Value::Object(record));
    }

    /// Append a synthesis metrics record for `call_id`.
    pub fn store_synthesis_metrics(
        &self,
        call_id: &str,
        job_id: &str,
        status: &str,
        chunk_count: usize,
        byte_len: usize,
    ) {
        self.append(
            call_id,
            &json!({
                "_type": "synthesis",
                "jobId": job_id,
                "status": status,
                "chunks": chunk_count,
                "bytes": byte_len,
                "timestamp": Local::now().to_rfc3339(),
            }),
        );
    }

    /// Append the final session summary on teardown.
    pub fn store_summary(&self, summary: &SessionSummary) {
        let mut record = match serde_json::to_value(summary) {
            Ok(Value::Object(map)) => map,
            _ => return,
        };
        record.insert("_type".to_string(), json!("summary"));
        self.append(&summary.call_id, &Value::Object(record));
    }

    /// Read back all records for a call (tests and transcript export).
    pub fn load_records(&self, call_id: &str) -> Vec<Value> {
        let path = self.path_for(call_id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    fn path_for(&self, call_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", safe_filename(call_id)))
    }

    fn append(&self, call_id: &str, record: &Value) {
        let path = self.path_for(call_id);

        if !path.exists() {
            let header = json!({
                "_type": "metadata",
                "callId": call_id,
                "createdAt": Local::now().to_rfc3339(),
            });
            if let Err(e) = fs::write(&path, format!("{}\n", header)) {
                warn!("Failed to create transcript file for {}: {}", call_id, e);
                return;
            }
        }

        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to serialize transcript record for {}: {}", call_id, e);
                return;
            }
        };

        let result = OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            warn!("Failed to append transcript record for {}: {}", call_id, e);
        }
    }
}
