//! Review queue: items awaiting a human decision, read for health checks only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HubError, Result};
use crate::persist::read_json;

/// One queued review item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// `pending` when absent.
    #[serde(default)]
    pub status: Option<String>,
}

impl ReviewItem {
    pub fn is_pending(&self) -> bool {
        self.status.as_deref().is_none_or(|s| s == "pending")
    }
}

/// Source of pending review items.
pub trait ReviewQueue: Send + Sync {
    /// Items still awaiting review.
    ///
    /// # Errors
    ///
    /// Returns an error when the queue cannot be read.
    fn pending_items(&self) -> Result<Vec<ReviewItem>>;
}

/// Review queue stored as a JSON array.
#[derive(Debug, Clone)]
pub struct JsonReviewQueue {
    path: PathBuf,
}

impl JsonReviewQueue {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReviewQueue for JsonReviewQueue {
    fn pending_items(&self) -> Result<Vec<ReviewItem>> {
        let items = read_json::<Vec<ReviewItem>>(&self.path)
            .map_err(|e| HubError::Review(e.to_string()))?
            .unwrap_or_default();
        Ok(items.into_iter().filter(ReviewItem::is_pending).collect())
    }
}
