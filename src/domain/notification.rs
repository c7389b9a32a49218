use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::report::ReportStatus;

pub const STATUS_CHANGE: &str = "status_change";
pub const NEW_COMMENT: &str = "new_comment";
pub const ANNOUNCEMENT: &str = "announcement";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub title_en: String,
    pub title_ar: String,
    pub body_en: String,
    pub body_ar: String,
    pub report_id: Option<Uuid>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Content of a notification before it is addressed to a recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub notification_type: String,
    pub title_en: String,
    pub title_ar: String,
    pub body_en: String,
    pub body_ar: String,
    #[serde(default)]
    pub report_id: Option<Uuid>,
}

impl NotificationPayload {
    /// Fixed bilingual copy for a report moving into `status`.
    pub fn status_change(report_id: Uuid, status: ReportStatus) -> Self {
        let (body_en, body_ar) = match status {
            ReportStatus::New => (
                "Your report has been reopened and is awaiting review.",
                "تمت إعادة فتح بلاغك وهو بانتظار المراجعة.",
            ),
            ReportStatus::Received => (
                "Your report has been received by the municipality.",
                "تم استلام بلاغك من قبل البلدية.",
            ),
            ReportStatus::InProgress => (
                "Work on your report is now in progress.",
                "جاري العمل على بلاغك الآن.",
            ),
            ReportStatus::Resolved => (
                "Your report has been resolved. Thank you for helping your city.",
                "تم حل بلاغك. شكراً لمساهمتك في تحسين مدينتك.",
            ),
            ReportStatus::Rejected => (
                "Your report was reviewed and could not be accepted.",
                "تمت مراجعة بلاغك ولم يتم قبوله.",
            ),
        };

        Self {
            notification_type: STATUS_CHANGE.to_string(),
            title_en: "Report status updated".to_string(),
            title_ar: "تم تحديث حالة البلاغ".to_string(),
            body_en: body_en.to_string(),
            body_ar: body_ar.to_string(),
            report_id: Some(report_id),
        }
    }

    pub fn new_comment(report_id: Uuid) -> Self {
        Self {
            notification_type: NEW_COMMENT.to_string(),
            title_en: "New comment".to_string(),
            title_ar: "تعليق جديد".to_string(),
            body_en: "Someone commented on a report you follow.".to_string(),
            body_ar: "علّق أحدهم على بلاغ تتابعه.".to_string(),
            report_id: Some(report_id),
        }
    }
}
