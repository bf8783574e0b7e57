use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub date: String,
    pub location: Option<String>,
    pub expected_attendees: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEvent {
    pub name: String,
    pub date: String,
    pub location: Option<String>,
    pub expected_attendees: Option<i64>,
}
