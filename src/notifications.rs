//! Notification requests emitted by evaluation flows
//!
//! Emission is fire-and-forget from the caller's point of view: callers log
//! a failed `emit` and carry on.

use crate::error::Result;
use crate::storage::StorageBackend;
use crate::types::{new_row_id, Notification};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Destination for notification requests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, target_user_id: &str, title: &str, message: &str, kind: &str) -> Result<()>;
}

/// Persists notifications as unread rows in the store
pub struct StoredNotificationSink {
    storage: Arc<dyn StorageBackend>,
}

impl StoredNotificationSink {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl NotificationSink for StoredNotificationSink {
    async fn emit(&self, target_user_id: &str, title: &str, message: &str, kind: &str) -> Result<()> {
        let notification = Notification {
            id: new_row_id(),
            user_id: target_user_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            kind: kind.to_string(),
            read: false,
            created_at: Utc::now(),
        };

        self.storage.insert_notification(&notification).await?;
        debug!("Stored {} notification for user {}", kind, target_user_id);
        Ok(())
    }
}

/// Logs notifications without delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn emit(&self, target_user_id: &str, title: &str, message: &str, kind: &str) -> Result<()> {
        info!(
            user = target_user_id,
            kind = kind,
            "Notification: {} - {}",
            title,
            message
        );
        Ok(())
    }
}
