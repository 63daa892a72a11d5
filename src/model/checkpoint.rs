//! Sync checkpoint model.

use serde::{Deserialize, Serialize};

/// Where this device last left off.
///
/// `head` is the commit the working tree matched after the last completed
/// reconcile; `synced_at` is the second that cycle started. Both are `None`
/// on a device that has never synced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub head: Option<String>,
    pub synced_at: Option<i64>,
}

impl SyncCheckpoint {
    #[must_use]
    pub fn is_first_sync(&self) -> bool {
        self.head.is_none() && self.synced_at.is_none()
    }
}
