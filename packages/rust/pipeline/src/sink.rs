//! Append-only JSONL result sink.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use courier_shared::{CourierError, Result, ResultRecord};

/// Durable, append-only store of one JSON record per processed contact.
///
/// Records are never mutated or compacted. Appends go through a single
/// open handle behind a mutex so concurrent workers cannot interleave
/// partial lines.
pub struct ResultSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResultSink {
    /// Open the sink at `path`, creating the file and parent directories
    /// as needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CourierError::io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CourierError::io(&path, e))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one record with a generated timestamp as a single JSON line.
    pub async fn append(&self, record: &ResultRecord) -> Result<()> {
        let mut value =
            serde_json::to_value(record).map_err(|e| CourierError::Sink(e.to_string()))?;

        match &mut value {
            Value::Object(map) => {
                map.insert(
                    "timestamp".into(),
                    Value::String(Utc::now().to_rfc3339()),
                );
            }
            _ => {
                return Err(CourierError::Sink(
                    "record did not serialize to an object".into(),
                ));
            }
        }

        let mut line =
            serde_json::to_string(&value).map_err(|e| CourierError::Sink(e.to_string()))?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CourierError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| CourierError::io(&self.path, e))?;

        Ok(())
    }
}
