use axum::{
    Router, middleware,
    routing::{get, patch, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{prayers, threads};

/// Board routes. Every route here requires a valid credential.
pub fn protected_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/groups/{group_id}/prayers",
            get(prayers::list_prayers).post(prayers::create_prayer),
        )
        .route(
            "/prayers/{id}",
            patch(prayers::update_prayer).delete(prayers::delete_prayer),
        )
        .route("/prayers/{id}/move", post(prayers::move_prayer))
        .route("/prayers/{id}/bump", post(prayers::bump_prayer))
        .route("/prayers/{id}/participants", post(prayers::join_prayer))
        .route(
            "/prayers/{id}/comments",
            get(threads::list_comments).post(threads::create_comment),
        )
        .route("/prayers/{id}/comments-closed", put(threads::set_comments_closed))
        .route(
            "/comments/{id}",
            patch(threads::edit_comment).delete(threads::delete_comment),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}
