use axum::{
    Extension, Json,
    extract::{OriginalUri, Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use courier_types::api::{MarkAllReadResponse, StatusMessage};

use crate::convert;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::pagination::{PageQuery, PageRequest};
use crate::state::{AppState, with_db};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<NotificationQuery>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::from_query(&page)?;
    let uid = user.db_id();
    let (count, rows) = with_db(&state, move |db| {
        db.notifications_for_user(&uid, query.unread, page.limit(), page.offset())
    })
    .await?;

    let results = rows.into_iter().map(convert::notification).collect();
    Ok(Json(page.into_page(&uri, count, results)?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user.db_id();
    if !with_db(&state, move |db| db.mark_notification_read(&uid, id)).await? {
        return Err(ApiError::not_found("Notification does not exist."));
    }
    Ok(Json(StatusMessage::new("Notification marked as read.")))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user.db_id();
    let updated_count = with_db(&state, move |db| db.mark_all_notifications_read(&uid)).await?;
    Ok(Json(MarkAllReadResponse { updated_count }))
}
