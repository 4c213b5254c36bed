use std::path::Path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    pub title: String,
    pub format: String,
}

impl HistoryEntry {
    pub fn now(title: &str, format: &str) -> Self {
        Self {
            date: chrono::Local::now().format(DATE_FORMAT).to_string(),
            title: title.to_string(),
            format: format.to_string(),
        }
    }
}

/// Completed downloads, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub entries: Vec<HistoryEntry>,
}

impl History {
    pub fn load(path: &Path) -> History {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return History::default(),
        };

        match serde_json::from_str::<Vec<HistoryEntry>>(&content) {
            Ok(entries) => History { entries },
            Err(e) => {
                log::warn!("History file {:?} is unreadable, starting over: {}", path, e);
                History::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write history to {:?}", path))
    }

    pub fn push_front(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
    }

    /// Appends a completed download to the history file.
    pub fn record(path: &Path, entry: HistoryEntry) -> Result<()> {
        let mut history = History::load(path);
        log::info!("Recording download of '{}' ({})", entry.title, entry.format);
        history.push_front(entry);
        history.save(path)
    }

    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "No downloads recorded yet.".to_string();
        }
        self.entries
            .iter()
            .map(|e| format!("{} - {} ({})", e.date, e.title, e.format))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
