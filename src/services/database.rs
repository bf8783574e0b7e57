use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::info;

use crate::dto::{
    event_dto::Event,
    participant_dto::Participant,
    team_dto::{Policy, Team, TeamAssignment},
};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        date TEXT NOT NULL,
        location TEXT,
        expected_attendees INTEGER,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS participants (
        id TEXT PRIMARY KEY NOT NULL,
        event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        phone TEXT,
        skill REAL,
        preferred_team TEXT,
        team_assigned TEXT,
        checkin_at TEXT NOT NULL,
        UNIQUE (event_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS team_assignments (
        event_id TEXT PRIMARY KEY NOT NULL REFERENCES events(id) ON DELETE CASCADE,
        policy TEXT NOT NULL,
        teams TEXT NOT NULL,
        assigned_at TEXT NOT NULL
    )
    "#,
];

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Database schema is ready.");
    Ok(())
}

pub async fn insert_event(pool: &SqlitePool, event: &Event) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO events (id, name, date, location, expected_attendees, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.id)
    .bind(&event.name)
    .bind(&event.date)
    .bind(&event.location)
    .bind(event.expected_attendees)
    .bind(event.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_event(pool: &SqlitePool, event_id: &str) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
        .bind(event_id)
        .fetch_optional(pool)
        .await
}

pub async fn insert_participant(
    pool: &SqlitePool,
    participant: &Participant,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO participants (
            id, event_id, name, phone, skill, preferred_team, team_assigned, checkin_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&participant.id)
    .bind(&participant.event_id)
    .bind(&participant.name)
    .bind(&participant.phone)
    .bind(participant.skill)
    .bind(&participant.preferred_team)
    .bind(&participant.team_assigned)
    .bind(participant.checkin_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// True when `e` came from a UNIQUE constraint, e.g. a name checked in twice.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_error| db_error.is_unique_violation())
}

pub async fn fetch_participants(
    pool: &SqlitePool,
    event_id: &str,
) -> Result<Vec<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>(
        "SELECT * FROM participants WHERE event_id = ? ORDER BY checkin_at, id",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await
}

pub async fn participant_name_exists(
    pool: &SqlitePool,
    event_id: &str,
    name: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM participants WHERE event_id = ? AND name = ?")
            .bind(event_id)
            .bind(name)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

/// Replaces the event's assignment and the `team_assigned` of its
/// participants in one transaction.
pub async fn save_assignment(
    pool: &SqlitePool,
    event_id: &str,
    policy: Policy,
    teams: &[Team],
    participants: &[Participant],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO team_assignments (event_id, policy, teams, assigned_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(event_id) DO UPDATE SET
            policy = excluded.policy,
            teams = excluded.teams,
            assigned_at = excluded.assigned_at
        "#,
    )
    .bind(event_id)
    .bind(policy)
    .bind(Json(teams))
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    for participant in participants {
        sqlx::query("UPDATE participants SET team_assigned = ? WHERE id = ? AND event_id = ?")
            .bind(&participant.team_assigned)
            .bind(&participant.id)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

pub async fn fetch_assignment(
    pool: &SqlitePool,
    event_id: &str,
) -> Result<Option<TeamAssignment>, sqlx::Error> {
    sqlx::query_as::<_, TeamAssignment>(
        "SELECT event_id, policy, teams, assigned_at FROM team_assignments WHERE event_id = ?",
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
}
