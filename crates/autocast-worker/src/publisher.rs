//! Local directory publisher.
//!
//! Each published video becomes `<id>.mp4` plus a `<id>.json` sidecar with
//! the normalized metadata. The sidecar is written last so a present
//! sidecar always means a complete video.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use autocast_models::{PublishMetadata, PublishedVideoId, VideoBytes};

use crate::error::PublishError;
use crate::stages::Publisher;

/// Sidecar written next to every published video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub video_id: PublishedVideoId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub size_bytes: u64,
    pub published_at: DateTime<Utc>,
}

/// Publishes into a local output directory.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    output_dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn video_path(&self, id: &PublishedVideoId) -> PathBuf {
        self.output_dir.join(format!("{}.mp4", id))
    }

    pub fn record_path(&self, id: &PublishedVideoId) -> PathBuf {
        self.output_dir.join(format!("{}.json", id))
    }
}

fn io_to_publish(context: &str, e: std::io::Error) -> PublishError {
    match e.kind() {
        ErrorKind::PermissionDenied | ErrorKind::InvalidInput => {
            PublishError::rejected(format!("{}: {}", context, e))
        }
        _ => PublishError::transient(format!("{}: {}", context, e)),
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(
        &self,
        video: &VideoBytes,
        metadata: &PublishMetadata,
    ) -> Result<PublishedVideoId, PublishError> {
        if video.is_empty() {
            return Err(PublishError::rejected("video is empty"));
        }
        let metadata = metadata.normalized();
        if metadata.title.is_empty() {
            return Err(PublishError::rejected("title is empty"));
        }

        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| io_to_publish("create output directory", e))?;

        let id = PublishedVideoId::from_string(Uuid::new_v4().to_string());
        fs::write(self.video_path(&id), video.as_slice())
            .await
            .map_err(|e| io_to_publish("write video", e))?;

        let record = PublishRecord {
            video_id: id.clone(),
            title: metadata.title,
            description: metadata.description,
            tags: metadata.tags,
            size_bytes: video.len() as u64,
            published_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| PublishError::rejected(format!("serialize metadata: {}", e)))?;
        fs::write(self.record_path(&id), json)
            .await
            .map_err(|e| io_to_publish("write metadata", e))?;

        info!(
            video_id = %id,
            size_bytes = record.size_bytes,
            path = %self.video_path(&id).display(),
            "Video published"
        );
        Ok(id)
    }
}
