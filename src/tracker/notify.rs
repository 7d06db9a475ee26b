use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::tracker::*;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum OpsLevel {
    Info,
    Error,
}

impl std::fmt::Display for OpsLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpsLevel::Info => write!(f, "Info"),
            OpsLevel::Error => write!(f, "Error"),
        }
    }
}

/// Formats a message for the operations channel.
pub fn format_ops_message(app_name: &str, level: OpsLevel, msg: &str) -> String {
    format!("*{}* - `{}` - {}", app_name, level, msg)
}

/// The outbound side: messages to the participants and to the operations channel.
pub trait Outbox {
    fn send_text(&mut self, chat_id: i64, msg: &str) -> TrackerResult<()>;

    fn post_ops(&mut self, level: OpsLevel, msg: &str) -> TrackerResult<()>;

    /// Shares a file (a summary table) with the operations channel.
    fn post_file(&mut self, path: &Path) -> TrackerResult<()>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
enum OutboxEntry<'a> {
    Chat { chat_id: i64, text: &'a str },
    Ops { level: OpsLevel, text: String },
    File { path: String },
}

/// Appends every outgoing message as a JSON line. A delivery agent picks them up from there.
#[derive(Debug, Clone)]
pub struct FileOutbox {
    path: PathBuf,
    app_name: String,
}

impl FileOutbox {
    pub fn new(path: &Path, app_name: &str) -> FileOutbox {
        FileOutbox {
            path: path.to_path_buf(),
            app_name: app_name.to_string(),
        }
    }

    fn append(&self, entry: &OutboxEntry) -> TrackerResult<()> {
        let p = self.path.display().to_string();
        let line = serde_json::to_string(entry).context(SerializingJsonSnafu { path: p.clone() })?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(WritingOutputSnafu { path: p.clone() })?;
        writeln!(f, "{}", line).context(WritingOutputSnafu { path: p })
    }
}

impl Outbox for FileOutbox {
    fn send_text(&mut self, chat_id: i64, msg: &str) -> TrackerResult<()> {
        self.append(&OutboxEntry::Chat { chat_id, text: msg })?;
        info!("Message to chat_id: {}, message: {}", chat_id, msg);
        Ok(())
    }

    fn post_ops(&mut self, level: OpsLevel, msg: &str) -> TrackerResult<()> {
        let text = format_ops_message(&self.app_name, level, msg);
        info!("Operations channel: {}", text);
        self.append(&OutboxEntry::Ops { level, text })
    }

    fn post_file(&mut self, path: &Path) -> TrackerResult<()> {
        info!("Operations channel: file {:?}", path);
        self.append(&OutboxEntry::File {
            path: path.display().to_string(),
        })
    }
}

/// Keeps the messages in memory.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingOutbox {
    pub chat: Vec<(i64, String)>,
    pub ops: Vec<(OpsLevel, String)>,
    pub files: Vec<PathBuf>,
}

#[cfg(test)]
impl Outbox for RecordingOutbox {
    fn send_text(&mut self, chat_id: i64, msg: &str) -> TrackerResult<()> {
        self.chat.push((chat_id, msg.to_string()));
        Ok(())
    }

    fn post_ops(&mut self, level: OpsLevel, msg: &str) -> TrackerResult<()> {
        self.ops.push((level, msg.to_string()));
        Ok(())
    }

    fn post_file(&mut self, path: &Path) -> TrackerResult<()> {
        self.files.push(path.to_path_buf());
        Ok(())
    }
}
