//! Request journal: a bounded in-memory record of recent gateway activity,
//! appended to a JSONL file so it survives restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const MAX_RECORDS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub component: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl RequestRecord {
    pub fn new(level: Level, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }
}

pub struct RequestLog {
    records: VecDeque<RequestRecord>,
    file_path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl RequestLog {
    /// Open (or create) the journal file and reload its most recent records.
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut records = VecDeque::with_capacity(MAX_RECORDS);
        if file_path.exists() {
            let reader = BufReader::new(File::open(&file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                // unreadable lines are skipped, not fatal
                if let Ok(record) = serde_json::from_str::<RequestRecord>(&line) {
                    push_bounded(&mut records, record);
                }
            }
        }

        let writer = BufWriter::new(append_handle(&file_path)?);
        Ok(Self {
            records,
            file_path: Some(file_path),
            writer: Some(writer),
        })
    }

    /// A journal that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            records: VecDeque::new(),
            file_path: None,
            writer: None,
        }
    }

    pub fn append(&mut self, record: RequestRecord) {
        if let Some(writer) = self.writer.as_mut() {
            match serde_json::to_string(&record) {
                Ok(line) => {
                    if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
                        tracing::warn!(error = %e, "Failed to write request journal");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to serialize journal record"),
            }
        }
        push_bounded(&mut self.records, record);
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<RequestRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    /// Rewrite the file so it holds exactly the in-memory records.
    pub fn compact(&mut self) -> std::io::Result<()> {
        let Some(path) = self.file_path.clone() else {
            return Ok(());
        };

        self.writer = None;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut writer = BufWriter::new(file);
        for record in &self.records {
            let line = serde_json::to_string(record)?;
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;

        self.writer = Some(BufWriter::new(append_handle(&path)?));
        Ok(())
    }
}

fn push_bounded(records: &mut VecDeque<RequestRecord>, record: RequestRecord) {
    if records.len() >= MAX_RECORDS {
        records.pop_front();
    }
    records.push_back(record);
}

fn append_handle(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Cheaply cloneable handle shared by all request handlers.
#[derive(Clone)]
pub struct SharedRequestLog(Arc<Mutex<RequestLog>>);

impl SharedRequestLog {
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(RequestLog::open(file_path)?))))
    }

    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(RequestLog::in_memory())))
    }

    pub fn append(&self, record: RequestRecord) {
        if let Ok(mut log) = self.0.lock() {
            log.append(record);
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.append(RequestRecord::new(Level::Info, component, message));
    }

    pub fn warn(&self, component: impl Into<String>, message: impl Into<String>) {
        self.append(RequestRecord::new(Level::Warn, component, message));
    }

    pub fn with_context(
        &self,
        level: Level,
        component: impl Into<String>,
        message: impl Into<String>,
        context: serde_json::Value,
    ) {
        self.append(RequestRecord::new(level, component, message).with_context(context));
    }

    /// One record per translated request.
    pub fn request(&self, protocol: &str, requested_model: &str, model_id: &str, stream: bool) {
        self.with_context(
            Level::Info,
            protocol,
            "request",
            json!({
                "requested_model": requested_model,
                "model_id": model_id,
                "stream": stream,
            }),
        );
    }

    pub fn completion(&self, protocol: &str, model_id: &str, input_tokens: u32, output_tokens: u32) {
        self.with_context(
            Level::Info,
            protocol,
            "completion",
            json!({
                "model_id": model_id,
                "input_tokens": input_tokens,
                "output_tokens": output_tokens,
            }),
        );
    }

    pub fn failure(&self, protocol: &str, model_id: &str, status: u16, kind: &str, detail: &str) {
        self.with_context(
            Level::Error,
            protocol,
            "failure",
            json!({
                "model_id": model_id,
                "status": status,
                "kind": kind,
                "detail": detail,
            }),
        );
    }

    pub fn recent(&self, limit: usize) -> Vec<RequestRecord> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }

    pub fn compact(&self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut log) => log.compact(),
            Err(_) => Err(std::io::Error::other("request journal lock poisoned")),
        }
    }
}
