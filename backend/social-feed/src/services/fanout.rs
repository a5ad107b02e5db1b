use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::profiles::ProfileDirectory;
use crate::domain::{NotificationEvent, NotificationKind, Post};
use crate::error::ServiceResult;
use crate::metrics;
use crate::repository::NotificationRepository;

/// Writes one self-contained inbox record per qualifying action
///
/// Sender display metadata is resolved at emission and copied into the event, so
/// later profile edits never rewrite past notifications.
pub struct NotificationFanout {
    notifications: NotificationRepository,
    profiles: Arc<ProfileDirectory>,
}

impl NotificationFanout {
    pub fn new(notifications: NotificationRepository, profiles: Arc<ProfileDirectory>) -> Self {
        Self {
            notifications,
            profiles,
        }
    }

    /// Append a `kind` event to `receiver_id`'s inbox
    ///
    /// Returns the new event id, or `None` when the event was suppressed because
    /// the sender is the receiver.
    pub async fn emit(
        &self,
        kind: NotificationKind,
        sender_id: &str,
        receiver_id: &str,
        related_post: Option<&Post>,
        message: Option<String>,
    ) -> ServiceResult<Option<String>> {
        if sender_id == receiver_id {
            debug!(kind = kind.as_str(), user = %sender_id, "Self-notification suppressed");
            metrics::record_notification(kind.as_str(), "suppressed");
            return Ok(None);
        }

        let result = self
            .write(kind, sender_id, receiver_id, related_post, message)
            .await;

        match &result {
            Ok(id) => {
                info!(
                    kind = kind.as_str(),
                    sender = %sender_id,
                    receiver = %receiver_id,
                    notification_id = %id,
                    "Notification sent"
                );
                metrics::record_notification(kind.as_str(), "sent");
            }
            Err(e) => {
                warn!(
                    kind = kind.as_str(),
                    sender = %sender_id,
                    receiver = %receiver_id,
                    error = %e,
                    "Notification write failed"
                );
                metrics::record_notification(kind.as_str(), "failed");
            }
        }

        result.map(Some)
    }

    async fn write(
        &self,
        kind: NotificationKind,
        sender_id: &str,
        receiver_id: &str,
        related_post: Option<&Post>,
        message: Option<String>,
    ) -> ServiceResult<String> {
        let sender = self.profiles.fresh_display_info(sender_id).await?;

        let event = NotificationEvent {
            id: String::new(),
            kind,
            receiver_id: receiver_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_display_name: sender.display_name,
            sender_icon_ref: sender.icon_ref,
            related_post_id: related_post.map(|p| p.id.clone()),
            related_image_ref: related_post.map(|p| p.image_ref.clone()),
            message,
            created_at: Utc::now(),
        };

        self.notifications.append(&event).await
    }
}
