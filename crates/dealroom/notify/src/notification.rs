use chrono::{DateTime, Utc};
use dealroom_types::DealId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of state change a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ParticipantAdded,
    ParticipantRemoved,
    DocumentUploaded,
    DocumentVerified,
    DocumentReleased,
    DocumentRejected,
    TaskCompleted,
    DealClosed,
    DealReopened,
    DealStatusChanged,
    TimelineAdvanced,
    TimelineReplaced,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ParticipantAdded => "participant_added",
            NotificationKind::ParticipantRemoved => "participant_removed",
            NotificationKind::DocumentUploaded => "document_uploaded",
            NotificationKind::DocumentVerified => "document_verified",
            NotificationKind::DocumentReleased => "document_released",
            NotificationKind::DocumentRejected => "document_rejected",
            NotificationKind::TaskCompleted => "task_completed",
            NotificationKind::DealClosed => "deal_closed",
            NotificationKind::DealReopened => "deal_reopened",
            NotificationKind::DealStatusChanged => "deal_status_changed",
            NotificationKind::TimelineAdvanced => "timeline_advanced",
            NotificationKind::TimelineReplaced => "timeline_replaced",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(type, title, message, link?)` message for the outbound sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<DealId>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            link: None,
            deal_id: None,
            created_at: Utc::now(),
        }
    }

    /// Scope the notification to a deal and link to its page.
    pub fn for_deal(mut self, deal_id: &DealId) -> Self {
        self.link = Some(format!("/deals/{}", deal_id.as_str()));
        self.deal_id = Some(deal_id.clone());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}
