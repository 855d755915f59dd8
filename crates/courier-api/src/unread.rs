use axum::{
    Extension, Json,
    body::Bytes,
    extract::{OriginalUri, Path, State},
    response::IntoResponse,
};
use tracing::{debug, info};

use courier_types::api::{
    MarkReadRequest, MarkReadResponse, UnreadConversationResponse, UnreadCountResponse,
    UnreadDirectResponse, UnreadInboxResponse, UnreadMessage,
};

use crate::cache::ResponseCache;
use crate::convert;
use crate::conversations::require_participant;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::{AppState, with_db};

/// Everything unread for the caller. Cached per user.
pub async fn inbox(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse, ApiError> {
    let key = ResponseCache::key(user.id, &uri);
    if let Some(hit) = state.cache.get(&key) {
        debug!("cache hit {}", key);
        return Ok(Json(hit));
    }

    let uid = user.db_id();
    let rows = with_db(&state, move |db| db.unread_for_user(&uid)).await?;
    let messages: Vec<UnreadMessage> = rows.into_iter().map(|r| convert::unread(r, true)).collect();

    let body = UnreadInboxResponse {
        unread_count: messages.len(),
        messages,
    };
    Ok(Json(state.cache.store(key, &body)?))
}

pub async fn direct(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user.db_id();
    let rows = with_db(&state, move |db| db.unread_direct(&uid)).await?;
    let messages: Vec<UnreadMessage> = rows.into_iter().map(|r| convert::unread(r, true)).collect();

    Ok(Json(UnreadDirectResponse {
        unread_direct_count: messages.len(),
        messages,
    }))
}

pub async fn in_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(conversation_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_participant(&state, conversation_id, &user).await?;

    let uid = user.db_id();
    let rows = with_db(&state, move |db| db.unread_in_conversation(&uid, conversation_id)).await?;
    let messages: Vec<UnreadMessage> = rows.into_iter().map(|r| convert::unread(r, false)).collect();

    Ok(Json(UnreadConversationResponse {
        conversation_id,
        unread_count: messages.len(),
        messages,
    }))
}

pub async fn count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user.db_id();
    let unread_count = with_db(&state, move |db| db.unread_count(&uid)).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

/// Mark the listed messages read, or all unread ones when the body is empty
/// or has no ids.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: MarkReadRequest = if body.iter().all(u8::is_ascii_whitespace) {
        MarkReadRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {e}")))?
    };

    let uid = user.db_id();
    let updated_count = with_db(&state, move |db| db.mark_as_read(&uid, req.message_ids.as_deref())).await?;
    info!("User {} marked {} messages read", user.username, updated_count);

    Ok(Json(MarkReadResponse {
        message: format!("{updated_count} messages marked as read."),
        updated_count,
    }))
}
