use axum::{
    Extension, Json,
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use courier_db::{MessageFilter, MessageRow, NewMessage};
use courier_types::api::{
    CreateMessageRequest, MessageResponse, ReplyRequest, StatusMessage, UpdateMessageRequest,
};

use crate::convert;
use crate::conversations::{non_empty, require_participant};
use crate::error::{ApiError, NOT_PARTICIPANT};
use crate::middleware::AuthUser;
use crate::pagination::{PageQuery, PageRequest};
use crate::state::{AppState, with_db};
use crate::threads::MAX_THREAD_DEPTH;

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub conversation: Option<i64>,
    pub sender: Option<Uuid>,
    pub sender_username: Option<String>,
    pub sent_after: Option<String>,
    pub sent_before: Option<String>,
    pub content: Option<String>,
    pub search: Option<String>,
    /// `timestamp` for oldest first, `-timestamp` (default) for newest first.
    pub ordering: Option<String>,
}

impl MessageQuery {
    fn into_filter(self) -> Result<MessageFilter, ApiError> {
        Ok(MessageFilter {
            conversation_id: self.conversation,
            sender_id: self.sender.map(|s| s.to_string()),
            sender_username: non_empty(self.sender_username),
            sent_after: self
                .sent_after
                .map(|t| convert::parse_query_time("sent_after", &t))
                .transpose()?,
            sent_before: self
                .sent_before
                .map(|t| convert::parse_query_time("sent_before", &t))
                .transpose()?,
            content: non_empty(self.content),
            search: non_empty(self.search),
            oldest_first: self.ordering.as_deref() == Some("timestamp"),
        })
    }
}

/// Fetch a message the caller may read: 404 if missing, 403 if the caller
/// is not in its conversation.
pub(crate) async fn load_message(
    state: &AppState,
    id: i64,
    user: &AuthUser,
) -> Result<MessageRow, ApiError> {
    let uid = user.db_id();
    let (message, member) = with_db(state, move |db| {
        let Some(message) = db.get_message(id)? else {
            return Ok((None, false));
        };
        let member = db.is_participant(message.conversation_id, &uid)?;
        Ok((Some(message), member))
    })
    .await?;

    let message = message.ok_or_else(|| ApiError::not_found("Message does not exist."))?;
    if !member {
        return Err(ApiError::forbidden(NOT_PARTICIPANT));
    }
    Ok(message)
}

/// Like `load_message`, and the caller must also be the sender.
async fn load_own_message(state: &AppState, id: i64, user: &AuthUser) -> Result<MessageRow, ApiError> {
    let message = load_message(state, id, user).await?;
    if message.sender_id != user.db_id() {
        return Err(ApiError::forbidden("You can only modify your own messages."));
    }
    Ok(message)
}

fn require_content(content: &str) -> Result<String, ApiError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Content cannot be empty."));
    }
    Ok(content.to_string())
}

async fn fetch_response(state: &AppState, id: i64) -> Result<MessageResponse, ApiError> {
    let row = with_db(state, move |db| db.get_message(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Message does not exist."))?;
    Ok(convert::message(row))
}

/// Validate and insert a message posted by `user` into `conversation_id`.
async fn post_message(
    state: &AppState,
    user: &AuthUser,
    conversation_id: i64,
    req: CreateMessageRequest,
) -> Result<MessageResponse, ApiError> {
    let content = require_content(&req.content)?;
    require_participant(state, conversation_id, user).await?;

    let sender = user.db_id();
    let receiver = req.receiver.map(|r| r.to_string());
    let parent = req.parent_message;
    let id = with_db(state, move |db| {
        if let Some(receiver) = &receiver {
            if !db.is_participant(conversation_id, receiver)? {
                return Ok(Err("Receiver must be a participant in this conversation."));
            }
        }
        if let Some(parent) = parent {
            match db.get_message(parent)? {
                Some(p) if p.conversation_id == conversation_id => {}
                Some(_) => return Ok(Err("Parent message belongs to a different conversation.")),
                None => return Ok(Err("Parent message does not exist.")),
            }
            if db.message_depth(parent)?.unwrap_or(0) >= MAX_THREAD_DEPTH {
                return Ok(Err("Replies cannot be nested any deeper."));
            }
        }

        let id = db.insert_message(&NewMessage {
            conversation_id,
            sender_id: &sender,
            receiver_id: receiver.as_deref(),
            parent_id: parent,
            content: &content,
        })?;
        Ok(Ok(id))
    })
    .await?
    .map_err(ApiError::bad_request)?;

    debug!("User {} posted message {} in conversation {}", user.username, id, conversation_id);
    fetch_response(state, id).await
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<MessageQuery>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::from_query(&page)?;
    let filter = query.into_filter()?;
    page_of_messages(&state, &user, &uri, filter, page).await
}

pub async fn list_conversation_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    OriginalUri(uri): OriginalUri,
    Path(conversation_id): Path<i64>,
    Query(query): Query<MessageQuery>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::from_query(&page)?;
    require_participant(&state, conversation_id, &user).await?;

    let mut filter = query.into_filter()?;
    filter.conversation_id = Some(conversation_id);
    page_of_messages(&state, &user, &uri, filter, page).await
}

async fn page_of_messages(
    state: &AppState,
    user: &AuthUser,
    uri: &axum::http::Uri,
    filter: MessageFilter,
    page: PageRequest,
) -> Result<Json<courier_types::api::Page<MessageResponse>>, ApiError> {
    let uid = user.db_id();
    let (count, rows) =
        with_db(state, move |db| db.list_messages(&uid, &filter, page.limit(), page.offset())).await?;
    let results = rows.into_iter().map(convert::message).collect();
    Ok(Json(page.into_page(uri, count, results)?))
}

pub async fn create_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation_id = req
        .conversation
        .ok_or_else(|| ApiError::bad_request("Conversation is required."))?;
    let message = post_message(&state, &user, conversation_id, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn create_conversation_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(conversation_id): Path<i64>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.conversation.is_some_and(|c| c != conversation_id) {
        return Err(ApiError::bad_request("Conversation does not match the URL."));
    }
    let message = post_message(&state, &user, conversation_id, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_message(&state, id, &user).await?;
    Ok(Json(convert::message(row)))
}

async fn apply_edit(state: &AppState, user: &AuthUser, id: i64, content: &str) -> Result<bool, ApiError> {
    let content = require_content(content)?;
    load_own_message(state, id, user).await?;

    let editor = user.db_id();
    let changed = with_db(state, move |db| db.update_message_content(id, &content, &editor)).await?;
    if changed {
        info!("User {} edited message {}", user.username, id);
    }
    Ok(changed)
}

/// PATCH and PUT. Responds with the updated message.
pub async fn update_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    apply_edit(&state, &user, id, &req.content).await?;
    Ok(Json(fetch_response(&state, id).await?))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    apply_edit(&state, &user, id, &req.content).await?;
    Ok(Json(StatusMessage::new("Message updated successfully.")))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    load_own_message(&state, id, &user).await?;
    with_db(&state, move |db| db.delete_message(id)).await?;
    info!("User {} deleted message {}", user.username, id);
    Ok(StatusCode::NO_CONTENT)
}

/// Edit history, newest first.
pub async fn message_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    load_message(&state, id, &user).await?;
    let rows = with_db(&state, move |db| db.history_for_message(id)).await?;
    let history: Vec<_> = rows.into_iter().map(convert::history).collect();
    Ok(Json(history))
}

/// Reply in the parent's conversation.
pub async fn reply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = load_message(&state, id, &user).await?;
    let message = post_message(
        &state,
        &user,
        parent.conversation_id,
        CreateMessageRequest {
            conversation: Some(parent.conversation_id),
            content: req.content,
            receiver: None,
            parent_message: Some(parent.id),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
