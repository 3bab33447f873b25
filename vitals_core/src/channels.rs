//! Built-in channel providers.
//!
//! - [`LogChannel`] writes notifications to the tracing log. Plain text, no
//!   actions, nothing to retract.
//! - [`OutboxChannel`] appends JSON lines to an outbox file under an
//!   exclusive lock, for a separate delivery agent to pick up. Retraction
//!   appends a tombstone line for the original handle.

use crate::config::{ChannelSettings, Config};
use crate::dispatch::{ChannelProvider, Dispatcher, RemovalOutcome};
use crate::{Clock, Domain, Notification, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub struct LogChannel {
    settings: ChannelSettings,
}

impl LogChannel {
    pub fn new(settings: ChannelSettings) -> Self {
        Self { settings }
    }
}

impl ChannelProvider for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn is_enabled(&self, user_id: &str, domain: Domain) -> bool {
        self.settings.allows(user_id, domain)
    }

    fn supports_actions(&self) -> bool {
        false
    }

    fn max_actions(&self) -> usize {
        0
    }

    fn send(&self, user_id: &str, notification: &Notification) -> Result<String> {
        let handle = Uuid::new_v4().to_string();
        tracing::info!(
            user = user_id,
            domain = %notification.domain(),
            "{}: {}",
            notification.title,
            notification.body
        );
        Ok(handle)
    }
}

/// One line of the outbox file
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboxEntry {
    Sent {
        handle: String,
        user_id: String,
        recorded_at: DateTime<Utc>,
        notification: Notification,
    },
    Retracted {
        handle: String,
        recorded_at: DateTime<Utc>,
    },
}

pub struct OutboxChannel {
    path: PathBuf,
    settings: ChannelSettings,
    clock: Arc<dyn Clock>,
}

impl OutboxChannel {
    /// `clock` stamps `recorded_at` on every entry
    pub fn new(path: impl Into<PathBuf>, settings: ChannelSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            settings,
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &OutboxEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(entry)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        Ok(())
    }
}

impl ChannelProvider for OutboxChannel {
    fn name(&self) -> &str {
        "outbox"
    }

    fn is_enabled(&self, user_id: &str, domain: Domain) -> bool {
        self.settings.allows(user_id, domain)
    }

    fn supports_actions(&self) -> bool {
        self.settings.max_actions > 0
    }

    fn max_actions(&self) -> usize {
        self.settings.max_actions
    }

    fn supports_removal(&self) -> bool {
        true
    }

    fn send(&self, user_id: &str, notification: &Notification) -> Result<String> {
        let handle = Uuid::new_v4().to_string();
        self.append(&OutboxEntry::Sent {
            handle: handle.clone(),
            user_id: user_id.to_string(),
            recorded_at: self.clock.now(),
            notification: notification.clone(),
        })?;
        tracing::debug!("Queued notification {} in outbox", handle);
        Ok(handle)
    }

    fn remove(&self, handle: &str) -> Result<RemovalOutcome> {
        self.append(&OutboxEntry::Retracted {
            handle: handle.to_string(),
            recorded_at: self.clock.now(),
        })?;
        tracing::debug!("Retracted notification {} from outbox", handle);
        Ok(RemovalOutcome::Removed)
    }
}

/// Read every entry from an outbox file
///
/// Unparseable lines are logged and skipped.
pub fn read_outbox(path: &Path) -> Result<Vec<OutboxEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut entries = Vec::new();
    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OutboxEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!("Failed to parse outbox entry at line {}: {}", line_num + 1, e),
        }
    }

    file.unlock()?;
    Ok(entries)
}

/// Sent entries that have not been retracted, in send order
pub fn live_notifications(entries: &[OutboxEntry]) -> Vec<&OutboxEntry> {
    let retracted: HashSet<&str> = entries
        .iter()
        .filter_map(|e| match e {
            OutboxEntry::Retracted { handle, .. } => Some(handle.as_str()),
            _ => None,
        })
        .collect();

    entries
        .iter()
        .filter(|e| match e {
            OutboxEntry::Sent { handle, .. } => !retracted.contains(handle.as_str()),
            OutboxEntry::Retracted { .. } => false,
        })
        .collect()
}

/// Build a dispatcher from the `[channels]` config section
pub fn dispatcher_from_config(config: &Config, clock: Arc<dyn Clock>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    if config.channels.log.enabled {
        dispatcher.add_provider(Box::new(LogChannel::new(config.channels.log.clone())));
    }
    if config.channels.outbox.enabled {
        dispatcher.add_provider(Box::new(OutboxChannel::new(
            config.outbox_path(),
            config.channels.outbox.clone(),
            clock,
        )));
    }
    if dispatcher.provider_names().is_empty() {
        tracing::warn!("No notification channels enabled; reminders will not be delivered");
    }
    dispatcher
}
