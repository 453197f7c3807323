use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use vigil_types::api::{CreateCardRequest, MoveRequest, PartitionQuery, Placement, UpdateCardRequest};
use vigil_types::models::Column;

use crate::error::{ApiResult, blocking};
use crate::permissions::Actor;
use crate::state::AppState;

pub async fn list_prayers(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Query(query): Query<PartitionQuery>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    let column = query.column.unwrap_or(Column::Active);
    let cards = blocking(move || state.positions.list(&actor, group_id, column)).await?;
    Ok(Json(cards))
}

pub async fn create_prayer(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateCardRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = req.validate()?;
    let card = blocking(move || state.positions.create_card(&actor, group_id, content)).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn update_prayer(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<UpdateCardRequest>,
) -> ApiResult<impl IntoResponse> {
    let update = req.validate()?;
    let card = blocking(move || state.positions.update_card(&actor, card_id, update)).await?;
    Ok(Json(card))
}

pub async fn move_prayer(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<impl IntoResponse> {
    let placement = Placement {
        column: Some(req.column),
        index: req.index,
    };
    let card = blocking(move || state.positions.move_card(&actor, card_id, placement)).await?;
    Ok(Json(card))
}

pub async fn bump_prayer(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    let card = blocking(move || state.positions.bump_card(&actor, card_id)).await?;
    Ok(Json(card))
}

pub async fn delete_prayer(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    blocking(move || state.positions.delete_card(&actor, card_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn join_prayer(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    let joined = blocking(move || state.positions.join_card(&actor, card_id)).await?;
    Ok(Json(json!({ "joined": joined })))
}
