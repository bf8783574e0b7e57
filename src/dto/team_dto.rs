use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::dto::participant_dto::Participant;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub color: String,
    pub members: Vec<Participant>,
    pub total_skill: f64,
}

impl Team {
    /// Sum of member skills derived from scratch, ignoring `total_skill`.
    pub fn recomputed_skill(&self) -> f64 {
        self.members.iter().map(Participant::skill_or_zero).sum()
    }

    pub fn average_skill(&self) -> Option<f64> {
        if self.members.is_empty() {
            None
        } else {
            Some(self.total_skill / self.members.len() as f64)
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Policy {
    #[default]
    Balanced,
    Random,
    Mixed,
}

impl Policy {
    pub fn as_str(self) -> &'static str {
        match self {
            Policy::Balanced => "balanced",
            Policy::Random => "random",
            Policy::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignTeams {
    pub team_count: i64,
    #[serde(default)]
    pub policy: Policy,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct TeamAssignment {
    pub event_id: String,
    pub policy: Policy,
    pub teams: Json<Vec<Team>>,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct TeamsUpdate {
    pub r#type: String,
    pub event_id: String,
    pub teams: Vec<Team>,
}
