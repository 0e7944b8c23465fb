//! XML daily log persister.
//!
//! Same layout as the JSON log: one document per calendar day, rewritten
//! through a temporary sibling on every append.

use super::json::write_atomic;
use super::{LogEntry, LogPersister};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// Root element of a daily log file
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "Logs")]
struct LogDocument {
    #[serde(rename = "LogEntry", default)]
    entries: Vec<LogEntry>,
}

/// Appends `LogEntry` records to one XML document per calendar day
pub struct XmlLogPersister {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl XmlLogPersister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Daily file holding entries stamped at `timestamp` (`YYYY-MM-DD.xml`)
    pub fn file_for(&self, timestamp: DateTime<Utc>) -> PathBuf {
        let day = timestamp.with_timezone(&Local).format("%Y-%m-%d");
        self.dir.join(format!("{day}.xml"))
    }

    /// Read every entry of the day containing `timestamp`
    pub async fn read_day(&self, timestamp: DateTime<Utc>) -> Result<Vec<LogEntry>> {
        read_document(&self.file_for(timestamp)).await
    }
}

#[async_trait]
impl LogPersister for XmlLogPersister {
    async fn append(&self, entry: &LogEntry) -> Result<()> {
        let path = self.file_for(entry.timestamp);

        let _guard = self.lock.lock().await;
        let mut entries = read_document(&path).await?;
        entries.push(entry.clone());
        let xml = to_xml(LogDocument { entries })?;
        write_atomic(&path, xml.as_bytes()).await?;
        Ok(())
    }
}

fn to_xml(document: LogDocument) -> Result<String> {
    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut body);
    serializer.indent(' ', 2);
    document
        .serialize(serializer)
        .map_err(|e| EngineError::Xml(e.to_string()))?;

    Ok(format!("{XML_DECLARATION}{body}\n"))
}

async fn read_document(path: &Path) -> Result<Vec<LogEntry>> {
    match fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
        Ok(content) => {
            let document: LogDocument = quick_xml::de::from_str(&content)
                .map_err(|e| EngineError::Xml(format!("{}: {e}", path.display())))?;
            Ok(document.entries)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
