use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{EngineError, Result};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
pub const MAX_SHORT_TEXT_LEN: usize = 500;
pub const MAX_PHOTOS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    New,
    Received,
    InProgress,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "received" => Some(Self::Received),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Received => "received",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub title_en: String,
    pub title_ar: Option<String>,
    pub description_en: String,
    pub description_ar: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub municipality: Option<String>,
    pub category: String,
    pub sub_category: Option<String>,
    pub status: ReportStatus,
    pub severity: Severity,
    pub confirmations_count: i32,
    pub subscribed_user_ids: Vec<Uuid>,
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub photo_urls: Vec<String>,
    pub resolution_photo_url: Option<String>,
    pub resolution_note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportHistoryEntry {
    pub id: Uuid,
    pub report_id: Uuid,
    pub old_status: ReportStatus,
    pub new_status: ReportStatus,
    pub changed_by: Option<Uuid>,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A report ranked by engagement.
#[derive(Debug, Clone, Serialize)]
pub struct TrendingReport {
    #[serde(flatten)]
    pub report: Report,
    pub comments_count: i64,
    pub trending_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyReport {
    #[serde(flatten)]
    pub report: Report,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReport {
    pub title_en: String,
    #[serde(default)]
    pub title_ar: Option<String>,
    pub description_en: String,
    #[serde(default)]
    pub description_ar: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    pub category: String,
    #[serde(default)]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

impl NewReport {
    pub fn validate(&self) -> Result<()> {
        require_text("title_en", &self.title_en, MAX_TITLE_LEN)?;
        require_text("description_en", &self.description_en, MAX_DESCRIPTION_LEN)?;
        require_text("category", &self.category, MAX_SHORT_TEXT_LEN)?;
        optional_text("title_ar", self.title_ar.as_deref(), MAX_TITLE_LEN)?;
        optional_text("description_ar", self.description_ar.as_deref(), MAX_DESCRIPTION_LEN)?;
        optional_text("address", self.address.as_deref(), MAX_SHORT_TEXT_LEN)?;
        optional_text("municipality", self.municipality.as_deref(), MAX_SHORT_TEXT_LEN)?;
        optional_text("sub_category", self.sub_category.as_deref(), MAX_SHORT_TEXT_LEN)?;
        validate_coordinates(self.latitude, self.longitude)?;

        if self.photo_urls.len() > MAX_PHOTOS {
            return Err(EngineError::validation(format!(
                "at most {} photos are allowed",
                MAX_PHOTOS
            )));
        }

        Ok(())
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(EngineError::validation("latitude must be between -90 and 90"));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(EngineError::validation(
            "longitude must be between -180 and 180",
        ));
    }
    Ok(())
}

fn require_text(field: &str, value: &str, max_len: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{} is required", field)));
    }
    optional_text(field, Some(value), max_len)
}

fn optional_text(field: &str, value: Option<&str>, max_len: usize) -> Result<()> {
    match value {
        Some(value) if value.chars().count() > max_len => Err(EngineError::validation(format!(
            "{} must be at most {} characters",
            field, max_len
        ))),
        _ => Ok(()),
    }
}

/// A single column assignment accepted by a report update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Id(Option<Uuid>),
    Status(ReportStatus),
    Severity(Severity),
}

/// Allow-listed changes to a report, in the order they were accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportChanges {
    fields: Vec<(&'static str, FieldValue)>,
}

impl ReportChanges {
    pub const ALLOWED_FIELDS: &'static [&'static str] = &[
        "status",
        "severity",
        "category",
        "sub_category",
        "title_en",
        "title_ar",
        "description_en",
        "description_ar",
        "address",
        "municipality",
        "assigned_to",
        "resolution_photo_url",
        "resolution_note",
    ];

    /// Filters a raw field map through the allow-list.
    ///
    /// Unknown keys are dropped. If nothing is left the update is rejected
    /// with [`EngineError::NoValidFields`].
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self> {
        let mut changes = Self::default();

        for &column in Self::ALLOWED_FIELDS {
            let Some(value) = fields.get(column) else {
                continue;
            };
            let parsed = match column {
                "status" => FieldValue::Status(parse_status(value)?),
                "severity" => FieldValue::Severity(parse_severity(value)?),
                "assigned_to" => FieldValue::Id(parse_optional_id(column, value)?),
                "category" | "title_en" | "description_en" => {
                    let text = parse_required_text(column, value)?;
                    FieldValue::Text(Some(text))
                }
                _ => FieldValue::Text(parse_optional_text(column, value)?),
            };
            changes.fields.push((column, parsed));
        }

        if changes.fields.is_empty() {
            return Err(EngineError::NoValidFields);
        }

        Ok(changes)
    }

    pub fn fields(&self) -> &[(&'static str, FieldValue)] {
        &self.fields
    }

    pub fn status(&self) -> Option<ReportStatus> {
        self.fields.iter().find_map(|(_, value)| match value {
            FieldValue::Status(status) => Some(*status),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn text_limit(column: &str) -> usize {
    match column {
        "title_en" | "title_ar" => MAX_TITLE_LEN,
        "description_en" | "description_ar" | "resolution_note" => MAX_DESCRIPTION_LEN,
        _ => MAX_SHORT_TEXT_LEN,
    }
}

fn parse_status(value: &Value) -> Result<ReportStatus> {
    value
        .as_str()
        .and_then(ReportStatus::from_db)
        .ok_or_else(|| EngineError::validation("invalid status"))
}

fn parse_severity(value: &Value) -> Result<Severity> {
    value
        .as_str()
        .and_then(Severity::from_db)
        .ok_or_else(|| EngineError::validation("invalid severity"))
}

fn parse_required_text(column: &str, value: &Value) -> Result<String> {
    let text = value
        .as_str()
        .ok_or_else(|| EngineError::validation(format!("{} must be a string", column)))?;
    require_text(column, text, text_limit(column))?;
    Ok(text.to_string())
}

fn parse_optional_text(column: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => {
            optional_text(column, Some(text), text_limit(column))?;
            Ok(Some(text.clone()))
        }
        _ => Err(EngineError::validation(format!(
            "{} must be a string or null",
            column
        ))),
    }
}

fn parse_optional_id(column: &str, value: &Value) -> Result<Option<Uuid>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Uuid::parse_str(text)
            .map(Some)
            .map_err(|_| EngineError::validation(format!("{} must be a UUID", column))),
        _ => Err(EngineError::validation(format!(
            "{} must be a UUID or null",
            column
        ))),
    }
}

/// Recipients of a status change: creator and subscribers, deduplicated in
/// first-seen order, never including the actor.
pub fn status_change_recipients(
    created_by: Option<Uuid>,
    subscribers: &[Uuid],
    actor_id: Uuid,
) -> Vec<Uuid> {
    let mut recipients: Vec<Uuid> = Vec::with_capacity(subscribers.len() + 1);
    for user_id in created_by.iter().chain(subscribers.iter()) {
        if *user_id != actor_id && !recipients.contains(user_id) {
            recipients.push(*user_id);
        }
    }
    recipients
}
