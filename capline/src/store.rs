//! Durable job documents in sled with merge-patch updates.
//!
//! Documents are stored as JSON under their video id. Every write is a JSON merge patch
//! (RFC 7396) applied atomically to the stored value, so fields a patch does not mention are
//! never lost or torn.

use crate::job::{JobDocument, JobPatch};
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::path::Path;
use thiserror::Error;

const JOBS_TREE: &str = "jobs";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job store error: {0}")]
    Sled(#[from] sled::Error),

    #[error("job document encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored job {id:?} is not valid JSON: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Job document store backed by a sled tree.
#[derive(Clone)]
pub struct JobStore {
    db: sled::Db,
    jobs: sled::Tree,
}

impl JobStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let jobs = db.open_tree(JOBS_TREE)?;
        Ok(Self { db, jobs })
    }

    pub fn get(&self, video_id: &str) -> Result<Option<JobDocument>> {
        self.jobs
            .get(video_id.as_bytes())?
            .map(|bytes| decode(video_id, &bytes))
            .transpose()
    }

    /// Look up several documents, preserving input order.
    pub fn get_many(&self, video_ids: &[String]) -> Result<Vec<(String, Option<JobDocument>)>> {
        video_ids
            .iter()
            .map(|id| Ok((id.clone(), self.get(id)?)))
            .collect()
    }

    /// Merge `patch` into the document for `video_id`, creating it if absent.
    ///
    /// Stamps `updatedAt`, flushes to disk, and returns the merged document.
    pub async fn persist(&self, video_id: &str, patch: &JobPatch) -> Result<JobDocument> {
        let doc = self.merge(video_id, patch)?;
        self.db.flush_async().await?;

        tracing::debug!(video_id, status = %doc.caption_status, "job persisted");
        Ok(doc)
    }

    fn merge(&self, video_id: &str, patch: &JobPatch) -> Result<JobDocument> {
        let mut patch = serde_json::to_value(patch)?;
        if let Value::Object(map) = &mut patch {
            map.insert("updatedAt".to_string(), json!(Utc::now()));
        }

        let mut corrupt = None;
        let merged = self.jobs.update_and_fetch(video_id.as_bytes(), |old| {
            let mut doc = match old {
                None => json!({ "videoId": video_id }),
                Some(bytes) => match serde_json::from_slice::<Value>(bytes) {
                    Ok(doc) => doc,
                    Err(e) => {
                        // keep the stored bytes untouched
                        corrupt = Some(e);
                        return Some(bytes.to_vec());
                    }
                },
            };
            merge_patch(&mut doc, &patch);
            serde_json::to_vec(&doc).ok().or_else(|| old.map(<[u8]>::to_vec))
        })?;

        if let Some(source) = corrupt {
            return Err(StoreError::Corrupt {
                id: video_id.to_string(),
                source,
            });
        }

        match merged {
            Some(bytes) => decode(video_id, &bytes),
            None => Ok(JobDocument::new(video_id, "")),
        }
    }
}

fn decode(video_id: &str, bytes: &[u8]) -> Result<JobDocument> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        id: video_id.to_string(),
        source,
    })
}

/// Apply an RFC 7396 JSON merge patch to `target`.
///
/// Objects merge recursively, `null` removes a member, and any other value replaces the target.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
