use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    error::AppError,
    models::{
        check_in::{CheckInSession, SessionEndedResponse, SessionSnapshot},
        user::User,
    },
    services::UpdateOutcome,
    state::AppState,
    types::FamilyId,
};

pub async fn start_session(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(family_id): Path<FamilyId>,
    payload: Result<Json<SessionSnapshot>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckInSession>), AppError> {
    let Json(snapshot) = payload?;
    let session = state.engine.start(family_id, &user, snapshot).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn update_session(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(family_id): Path<FamilyId>,
    payload: Result<Json<SessionSnapshot>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(snapshot) = payload?;
    let response = match state.engine.update(family_id, &user, snapshot).await? {
        UpdateOutcome::Accepted(session) => (StatusCode::ACCEPTED, Json(session)).into_response(),
        UpdateOutcome::Ended(reason) => {
            (StatusCode::OK, Json(SessionEndedResponse::new(reason))).into_response()
        }
    };
    Ok(response)
}

pub async fn end_session(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(family_id): Path<FamilyId>,
) -> Result<Json<SessionEndedResponse>, AppError> {
    let reason = state.engine.end(family_id, &user).await?;
    Ok(Json(SessionEndedResponse::new(reason)))
}
