use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use vigil_types::api::{CommentsClosedRequest, CreateCommentRequest, CreateCommentResponse, EditCommentRequest};

use crate::comments::CommentOutcome;
use crate::error::{ApiResult, blocking};
use crate::permissions::Actor;
use crate::state::AppState;

/// Reason reported when a comment targets a closed thread.
pub const COMMENTS_CLOSED: &str = "comments_closed";

pub async fn list_comments(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    let comments = blocking(move || state.comments.list(&actor, card_id)).await?;
    Ok(Json(comments))
}

/// Closed threads answer 200 with `ok: false` rather than an error status.
pub async fn create_comment(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let (body, parent_comment_id) = req.validate()?;
    let outcome = blocking(move || state.comments.create(&actor, card_id, body, parent_comment_id)).await?;

    let response = match outcome {
        CommentOutcome::Created(comment) => (
            StatusCode::CREATED,
            Json(CreateCommentResponse {
                ok: true,
                comment: Some(comment),
                reason: None,
            }),
        ),
        CommentOutcome::Closed => (
            StatusCode::OK,
            Json(CreateCommentResponse {
                ok: false,
                comment: None,
                reason: Some(COMMENTS_CLOSED.to_string()),
            }),
        ),
    };
    Ok(response)
}

pub async fn edit_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<EditCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let body = req.validate()?;
    let comment = blocking(move || state.comments.edit(&actor, comment_id, &body)).await?;
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<impl IntoResponse> {
    blocking(move || state.comments.delete(&actor, comment_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_comments_closed(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CommentsClosedRequest>,
) -> ApiResult<impl IntoResponse> {
    let card = blocking(move || state.comments.set_closed(&actor, card_id, req.closed)).await?;
    Ok(Json(card))
}
