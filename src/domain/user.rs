use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Citizen,
    Staff,
    Admin,
}

impl UserRole {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "citizen" => Some(Self::Citizen),
            "staff" => Some(Self::Staff),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Staff and admins triage reports and are excluded from gamification
    /// sweeps.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Staff | Self::Admin)
    }
}

/// Points, counters and badges held by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationProfile {
    pub id: Uuid,
    pub display_name: String,
    pub role: UserRole,
    pub points: i64,
    pub achievements: Vec<String>,
    pub reports_count: i32,
    pub reports_confirmed: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub id: Uuid,
    pub display_name: String,
    pub points: i64,
    pub badges_count: i32,
}
