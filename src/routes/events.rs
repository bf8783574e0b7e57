use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, error};
use uuid::Uuid;

use crate::dto::event_dto::{CreateEvent, Event};
use crate::services::database::{fetch_event, insert_event};

/**
 * POST request to create a new event.
 */
pub async fn create_event(
    Extension(pool): Extension<SqlitePool>,
    Json(payload): Json<CreateEvent>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let name = payload.name.trim();
    let date = payload.date.trim();

    if name.is_empty() || date.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "An event needs both a name and a date.".to_string(),
        ));
    }

    let event = Event {
        id: format!("event_{}", Uuid::new_v4().simple()),
        name: name.to_string(),
        date: date.to_string(),
        location: payload.location.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
        expected_attendees: payload.expected_attendees,
        created_at: Utc::now(),
    };

    info!("Creating event {} ({}).", event.name, event.id);

    insert_event(&pool, &event).await.map_err(|e| {
        error!("Failed to create event: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Could not create the event {}", event.name),
        )
    })?;

    Ok((StatusCode::CREATED, Json(event)))
}

/**
 * GET request for a single event.
 */
pub async fn get_event(
    Extension(pool): Extension<SqlitePool>,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, (StatusCode, String)> {
    require_event(&pool, &event_id).await.map(Json)
}

/// Loads the event or turns its absence into a 404.
pub async fn require_event(pool: &SqlitePool, event_id: &str) -> Result<Event, (StatusCode, String)> {
    match fetch_event(pool, event_id).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Event was not found.".to_string())),
        Err(e) => {
            error!("DB query error: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Failed to load the event.".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::testing::memory_pool;

    fn new_event(name: &str, date: &str) -> Json<CreateEvent> {
        Json(CreateEvent {
            name: name.to_string(),
            date: date.to_string(),
            location: Some("   ".to_string()),
            expected_attendees: Some(20),
        })
    }

    #[tokio::test]
    async fn created_events_can_be_read_back() {
        let pool = memory_pool().await;

        let response = create_event(Extension(pool.clone()), new_event(" Friday Futsal ", "2026-10-23"))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let (id,): (String,) = sqlx::query_as("SELECT id FROM events")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(id.starts_with("event_"));

        let Json(event) = get_event(Extension(pool), Path(id.clone())).await.unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.name, "Friday Futsal");
        assert_eq!(event.location, None);
        assert_eq!(event.expected_attendees, Some(20));
    }

    #[tokio::test]
    async fn events_need_a_name_and_a_date() {
        let pool = memory_pool().await;

        for payload in [new_event("  ", "2026-10-23"), new_event("Friday Futsal", "")] {
            let result = create_event(Extension(pool.clone()), payload).await;
            assert_eq!(result.err().map(|(status, _)| status), Some(StatusCode::BAD_REQUEST));
        }
    }

    #[tokio::test]
    async fn unknown_events_are_not_found() {
        let pool = memory_pool().await;

        let result = get_event(Extension(pool), Path("event_404".to_string())).await;
        assert_eq!(result.err().map(|(status, _)| status), Some(StatusCode::NOT_FOUND));
    }
}
