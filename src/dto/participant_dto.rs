use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct Participant {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub phone: Option<String>,
    /// `None` means "no rating", which is not the same as an explicit 0.
    pub skill: Option<f64>,
    pub preferred_team: Option<String>,
    pub team_assigned: Option<String>,
    pub checkin_at: DateTime<Utc>,
}

impl Participant {
    /// Skill used for sums and averages.
    pub fn skill_or_zero(&self) -> f64 {
        self.skill.unwrap_or(0.0)
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckIn {
    pub name: String,
    pub phone: Option<String>,
    pub skill: Option<f64>,
    pub preferred_team: Option<String>,
}

#[derive(Serialize)]
pub struct ParticipantUpdate {
    pub r#type: String,
    pub event_id: String,
    pub participants: Vec<Participant>,
}
