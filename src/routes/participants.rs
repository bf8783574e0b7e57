use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{info, error, warn};
use uuid::Uuid;

use crate::dto::participant_dto::{CheckIn, Participant};
use crate::routes::events::require_event;
use crate::services::database::{
    fetch_participants, insert_participant, is_unique_violation, participant_name_exists,
};
use crate::services::websocket::send_participant_update;

/**
 * GET the participants checked in to an event.
 */
pub async fn get_participants(
    Extension(pool): Extension<SqlitePool>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Participant>>, (StatusCode, String)> {
    require_event(&pool, &event_id).await?;

    let participants = fetch_participants(&pool, &event_id).await.map_err(|e| {
        error!("DB query error: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load participants.".to_string())
    })?;

    Ok(Json(participants))
}

/**
 * POST request to check a participant in.
 */
pub async fn check_in(
    Extension(pool): Extension<SqlitePool>,
    Extension(tx): Extension<broadcast::Sender<String>>,
    Path(event_id): Path<String>,
    Json(payload): Json<CheckIn>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Please enter a name.".to_string()));
    }

    if let Some(skill) = payload.skill {
        if !skill.is_finite() || skill < 0.0 {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Skill has to be a non-negative number, got {}", skill),
            ));
        }
    }

    require_event(&pool, &event_id).await?;

    match participant_name_exists(&pool, &event_id, &name).await {
        Ok(true) => {
            warn!("Duplicate check-in for '{}' at {}", name, event_id);
            return Err(duplicate_check_in(&name));
        }
        Ok(false) => {}
        Err(e) => {
            error!("DB query error: {}", e);
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "There was a database issue.".to_string()));
        }
    }

    let participant = Participant {
        id: format!("participant_{}", Uuid::new_v4().simple()),
        event_id: event_id.clone(),
        name,
        phone: payload.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        skill: payload.skill,
        preferred_team: payload.preferred_team,
        team_assigned: None,
        checkin_at: Utc::now(),
    };

    // The name check above is only a fast path, the UNIQUE constraint decides.
    if let Err(e) = insert_participant(&pool, &participant).await {
        if is_unique_violation(&e) {
            warn!("Duplicate check-in for '{}' at {}", participant.name, event_id);
            return Err(duplicate_check_in(&participant.name));
        }

        error!("Failed to check in {}: {}", participant.name, e);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Check-in failed, please try again.".to_string(),
        ));
    }

    info!("Checked in {} at {}.", participant.name, event_id);
    send_participant_update(&pool, &tx, &event_id).await;

    Ok((StatusCode::CREATED, Json(participant)))
}

fn duplicate_check_in(name: &str) -> (StatusCode, String) {
    (StatusCode::CONFLICT, format!("{} is already checked in.", name))
}
