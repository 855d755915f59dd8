use axum::{
    Extension, Json,
    extract::{OriginalUri, Query, State},
    response::IntoResponse,
};
use tracing::info;

use courier_types::api::StatusMessage;

use crate::convert;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::pagination::{PageQuery, PageRequest};
use crate::state::{AppState, with_db};

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user.db_id();
    let row = with_db(&state, move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(convert::user(row)))
}

/// Delete the caller's account. Messages, notifications and history go with it.
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user.db_id();
    with_db(&state, move |db| db.delete_user(&uid)).await?;
    info!("Deleted user {} ({})", user.username, user.id);
    Ok(Json(StatusMessage::new("User deleted successfully.")))
}

pub async fn list_users(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::from_query(&page)?;
    let (count, rows) = with_db(&state, move |db| db.list_users(page.limit(), page.offset())).await?;
    let results = rows.into_iter().map(convert::user).collect();
    Ok(Json(page.into_page(&uri, count, results)?))
}
