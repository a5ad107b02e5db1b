use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::store::Collection;

/// Counters are a denormalized cache: a dangling decrement may leave a negative or
/// null value behind, which reads back as 0.
fn non_negative_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.unwrap_or(0).max(0) as u64)
}

/// Post entity - one published image with its caption and counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Document id, assigned by the store on publish
    #[serde(default, skip_serializing)]
    pub id: String,
    pub author_id: String,
    pub image_ref: String,
    #[serde(default)]
    pub caption: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "non_negative_count")]
    pub like_count: u64,
    #[serde(default, deserialize_with = "non_negative_count")]
    pub comment_count: u64,
}

impl Post {
    pub fn new(
        author_id: impl Into<String>,
        image_ref: impl Into<String>,
        caption: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            author_id: author_id.into(),
            image_ref: image_ref.into(),
            caption: caption.into(),
            created_at,
            like_count: 0,
            comment_count: 0,
        }
    }
}

/// Numeric fields on a post that edge toggles and comments adjust
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    LikeCount,
    CommentCount,
}

impl CounterField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterField::LikeCount => "likeCount",
            CounterField::CommentCount => "commentCount",
        }
    }
}

/// A counter adjustment applied alongside an edge write: `+delta` on create, `-delta` on delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDelta {
    pub field: CounterField,
    pub delta: i64,
}

/// The three binary relations stored as composite-key edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// user -> post
    Like,
    /// user -> user
    Follow,
    /// user -> user
    Block,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Like => "like",
            Relation::Follow => "follow",
            Relation::Block => "block",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            Relation::Like => Collection::Likes,
            Relation::Follow => Collection::Follows,
            Relation::Block => Collection::Blocks,
        }
    }

    /// Counter kept on the object's post, if the relation has one
    pub fn counter(&self) -> Option<CounterDelta> {
        match self {
            Relation::Like => Some(CounterDelta {
                field: CounterField::LikeCount,
                delta: 1,
            }),
            Relation::Follow | Relation::Block => None,
        }
    }

    /// Notification kind emitted when an edge of this relation is created
    pub fn notification_kind(&self) -> Option<NotificationKind> {
        match self {
            Relation::Like => Some(NotificationKind::Like),
            Relation::Follow => Some(NotificationKind::Follow),
            Relation::Block => None,
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge entity - one directed (subject, object) pair of a relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub subject_id: String,
    pub object_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(subject_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            object_id: object_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
        }
    }

    /// Inbox line for an event of this kind
    pub fn describe(&self, message: Option<&str>) -> String {
        match self {
            NotificationKind::Like => "liked your post".to_string(),
            NotificationKind::Comment => match message {
                Some(text) if !text.is_empty() => format!("commented: {}", text),
                _ => "commented on your post".to_string(),
            },
            NotificationKind::Follow => "started following you".to_string(),
        }
    }
}

/// NotificationEvent entity - a self-contained inbox record.
/// Sender display fields are snapshots taken at emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub kind: NotificationKind,
    pub receiver_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    #[serde(default)]
    pub sender_icon_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// User profile document, read for display metadata only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// Resolved display metadata for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub user_id: String,
    pub display_name: String,
    pub icon_ref: String,
}

/// Comment entity - commenter display fields are snapshots taken at write time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub author_icon_ref: String,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportReason {
    Inappropriate,
    Spam,
    Other,
}

/// Report entity - write-only moderation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub reporter_id: String,
    pub post_id: String,
    pub target_user_id: String,
    pub reason: ReportReason,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Post as shown to the current user
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub post: Post,
    pub author: DisplayInfo,
    pub liked_by_me: bool,
    pub author_followed_by_me: bool,
}
