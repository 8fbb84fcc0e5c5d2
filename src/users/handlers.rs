use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    users::{
        dto::{UserPayload, UserRecord},
        services::UserService,
    },
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user))
        .route("/users/by-username/:username", get(get_user_by_username))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", put(update_user).delete(delete_user))
}

fn service(state: &AppState) -> UserService {
    UserService::new(state.users.clone())
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<UserPayload>,
) -> ApiResult<(StatusCode, HeaderMap, Json<UserRecord>)> {
    if let Err(msg) = payload.validate() {
        warn!(username = %payload.username, %msg, "invalid create payload");
        return Err(ApiError::bad_request(msg));
    }

    let record = service(&state).create(payload).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/users/{}", record.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }

    Ok((StatusCode::CREATED, headers, Json(record)))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserRecord>>> {
    let records = service(&state).list().await?;
    Ok(Json(records))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserRecord>> {
    let record = service(&state).get(id).await?;
    Ok(Json(record))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UserPayload>,
) -> ApiResult<Json<UserRecord>> {
    if let Err(msg) = payload.validate() {
        warn!(%id, %msg, "invalid update payload");
        return Err(ApiError::bad_request(msg));
    }

    let record = service(&state).update(id, payload).await?;
    Ok(Json(record))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    service(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_user_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<UserRecord>> {
    let record = service(&state).get_by_username(&username).await?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(username: &str, email: &str) -> UserPayload {
        UserPayload {
            username: username.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn create_returns_201_with_location_header() {
        let state = AppState::fake();
        let (status, headers, Json(record)) =
            create_user(State(state), Json(payload("alice", "alice@x.com")))
                .await
                .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            headers.get(axum::http::header::LOCATION).unwrap(),
            &format!("/users/{}", record.id)
        );
        assert!(record.active);
    }

    #[tokio::test]
    async fn create_rejects_invalid_payload_before_the_service_runs() {
        let state = AppState::fake();
        let err = create_user(State(state.clone()), Json(payload("alice", "bad-email")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        // Nothing was persisted.
        let Json(all) = list_users(State(state)).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn get_unknown_id_maps_to_not_found() {
        let state = AppState::fake();
        let err = get_user(State(state), Path(99)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_create_maps_to_conflict() {
        let state = AppState::fake();
        create_user(State(state.clone()), Json(payload("alice", "alice@x.com")))
            .await
            .unwrap();

        let err = create_user(State(state), Json(payload("alice", "other@x.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_returns_204_and_removes_the_user() {
        let state = AppState::fake();
        let (_, _, Json(record)) =
            create_user(State(state.clone()), Json(payload("alice", "alice@x.com")))
                .await
                .unwrap();

        let status = delete_user(State(state.clone()), Path(record.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = get_user(State(state), Path(record.id)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn lookup_by_username_roundtrip() {
        let state = AppState::fake();
        create_user(State(state.clone()), Json(payload("alice", "alice@x.com")))
            .await
            .unwrap();

        let Json(record) = get_user_by_username(State(state), Path("alice".to_string()))
            .await
            .unwrap();
        assert_eq!(record.username, "alice");
    }
}
