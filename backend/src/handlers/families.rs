use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppError,
    models::{
        family::{CreateFamilyRequest, FamilyResponse, JoinLinkResponse, JoinPreviewResponse},
        user::User,
    },
    state::AppState,
    types::FamilyId,
    validation::validate_payload,
};

pub async fn create_family(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Json<CreateFamilyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FamilyResponse>), AppError> {
    let Json(payload) = payload?;
    validate_payload(&payload)?;

    let family = state.families.create_family(&user, payload.name).await?;
    let view = state.families.view(family).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_family(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(family_id): Path<FamilyId>,
) -> Result<Json<FamilyResponse>, AppError> {
    Ok(Json(state.families.get_family(family_id, &user).await?))
}

pub async fn invite(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(family_id): Path<FamilyId>,
) -> Result<(StatusCode, Json<JoinLinkResponse>), AppError> {
    let link = state.families.issue_join_link(family_id, &user).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn preview_join(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<JoinPreviewResponse>, AppError> {
    Ok(Json(state.families.preview_join(&token).await?))
}

pub async fn join(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(token): Path<String>,
) -> Result<Json<FamilyResponse>, AppError> {
    Ok(Json(state.families.redeem(&token, &user).await?))
}

pub async fn leave(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(family_id): Path<FamilyId>,
) -> Result<StatusCode, AppError> {
    state.families.leave(family_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
