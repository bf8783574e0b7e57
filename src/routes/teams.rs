use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{info, error};

use crate::dto::team_dto::{AssignTeams, Team};
use crate::routes::events::require_event;
use crate::services::database::{fetch_assignment, fetch_participants, save_assignment};
use crate::services::team_assignment::{assign_teams, stamp_team_assignments, AssignmentError};
use crate::services::websocket::{send_participant_update, send_teams_update};

/// Upper bound on teams per request, well above what the check-in UI offers.
pub const MAX_TEAM_COUNT: i64 = 64;

/**
 * GET the teams of the latest assignment, or nothing if teams were never made.
 */
pub async fn get_teams(
    Extension(pool): Extension<SqlitePool>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Team>>, (StatusCode, String)> {
    info!("Fetching teams for {}.", event_id);
    require_event(&pool, &event_id).await?;

    match fetch_assignment(&pool, &event_id).await {
        Ok(Some(assignment)) => Ok(Json(assignment.teams.0)),
        Ok(None) => Ok(Json(Vec::new())),
        Err(e) => {
            error!("DB query error: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Failed to load teams.".to_string()))
        }
    }
}

/**
 * POST request to split the checked in participants into teams.
 * Replaces any previous assignment for the event.
 */
pub async fn create_teams(
    Extension(pool): Extension<SqlitePool>,
    Extension(tx): Extension<broadcast::Sender<String>>,
    Path(event_id): Path<String>,
    Json(payload): Json<AssignTeams>,
) -> Result<Json<Vec<Team>>, (StatusCode, String)> {
    if payload.team_count > MAX_TEAM_COUNT {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("At most {} teams can be made at once.", MAX_TEAM_COUNT),
        ));
    }

    let team_count = usize::try_from(payload.team_count)
        .map_err(|_| AssignmentError::InvalidTeamCount(payload.team_count))
        .map_err(bad_request)?;

    require_event(&pool, &event_id).await?;

    let mut participants = fetch_participants(&pool, &event_id).await.map_err(|e| {
        error!("DB query error: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load participants.".to_string())
    })?;

    info!(
        "Assigning {} participants of {} to {} teams ({}).",
        participants.len(),
        event_id,
        team_count,
        payload.policy
    );

    let teams = assign_teams(&participants, team_count, payload.policy, &mut rand::rng())
        .map_err(bad_request)?;

    stamp_team_assignments(&mut participants, &teams);

    if let Err(e) = save_assignment(&pool, &event_id, payload.policy, &teams, &participants).await {
        error!("Failed to save teams: {}", e);
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "Failed to save teams.".to_string()));
    }

    send_teams_update(&tx, &event_id, &teams);
    send_participant_update(&pool, &tx, &event_id).await;

    Ok(Json(teams))
}

fn bad_request(e: AssignmentError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}
