use std::collections::BTreeSet;

use axum::{
    Extension, Json,
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use courier_db::{ConversationFilter, ConversationOrder, Database};
use courier_types::api::{
    ConversationDetailResponse, ConversationResponse, CreateConversationRequest,
    UpdateConversationRequest,
};

use crate::convert;
use crate::error::{ApiError, NOT_PARTICIPANT};
use crate::middleware::AuthUser;
use crate::pagination::{PageQuery, PageRequest};
use crate::state::{AppState, with_db};

#[derive(Debug, Default, Deserialize)]
pub struct ConversationQuery {
    pub participant: Option<Uuid>,
    pub participant_username: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

impl ConversationQuery {
    fn into_filter(self) -> Result<ConversationFilter, ApiError> {
        Ok(ConversationFilter {
            participant_id: self.participant.map(|p| p.to_string()),
            participant_username: non_empty(self.participant_username),
            created_after: self
                .created_after
                .map(|t| convert::parse_query_time("created_after", &t))
                .transpose()?,
            created_before: self
                .created_before
                .map(|t| convert::parse_query_time("created_before", &t))
                .transpose()?,
            search: non_empty(self.search),
            // Unknown ordering fields are ignored
            order: self
                .ordering
                .as_deref()
                .and_then(ConversationOrder::parse)
                .unwrap_or_default(),
        })
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// 404 if the conversation does not exist, 403 if the caller is not in it.
pub(crate) async fn require_participant(
    state: &AppState,
    conversation_id: i64,
    user: &AuthUser,
) -> Result<(), ApiError> {
    let uid = user.db_id();
    let (exists, member) = with_db(state, move |db| {
        let exists = db.get_conversation(conversation_id)?.is_some();
        Ok((exists, exists && db.is_participant(conversation_id, &uid)?))
    })
    .await?;

    if !exists {
        return Err(ApiError::not_found("Conversation does not exist."));
    }
    if !member {
        return Err(ApiError::forbidden(NOT_PARTICIPANT));
    }
    Ok(())
}

fn load_conversation(db: &Database, id: i64) -> anyhow::Result<Option<ConversationResponse>> {
    let Some(row) = db.get_conversation(id)? else {
        return Ok(None);
    };
    let participants = db.participants_for(&[id])?;
    Ok(convert::conversations(vec![row], &participants).pop())
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<ConversationQuery>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::from_query(&page)?;
    let filter = query.into_filter()?;
    let uid = user.db_id();

    let (count, results) = with_db(&state, move |db| {
        let (count, rows) = db.list_conversations(&uid, &filter, page.limit(), page.offset())?;
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let participants = db.participants_for(&ids)?;
        Ok((count, convert::conversations(rows, &participants)))
    })
    .await?;

    Ok(Json(page.into_page(&uri, count, results)?))
}

/// The caller is always added to the participant set.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut ids: BTreeSet<String> = req.participants.iter().map(Uuid::to_string).collect();
    ids.insert(user.db_id());
    if ids.len() < 2 {
        return Err(ApiError::bad_request(
            "A conversation needs at least two distinct participants.",
        ));
    }
    let title = non_empty(req.title);

    let ids: Vec<String> = ids.into_iter().collect();
    let created = with_db(&state, move |db| {
        let existing = db.existing_user_ids(&ids)?;
        if let Some(missing) = ids.iter().find(|id| !existing.contains(id)) {
            return Ok(Err(format!("Unknown participant: {missing}")));
        }
        let id = db.create_conversation(title.as_deref(), &ids)?;
        Ok(Ok(load_conversation(db, id)?))
    })
    .await?
    .map_err(ApiError::BadRequest)?
    .ok_or_else(|| anyhow::anyhow!("conversation missing after insert"))?;

    info!(
        "User {} created conversation {} with {} participants",
        user.username, created.conversation_id, created.participant_count
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_participant(&state, id, &user).await?;

    let detail = with_db(&state, move |db| {
        let Some(conversation) = load_conversation(db, id)? else {
            return Ok(None);
        };
        let messages = db
            .messages_in_conversation(id)?
            .into_iter()
            .map(convert::message)
            .collect();
        Ok(Some(ConversationDetailResponse { conversation, messages }))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Conversation does not exist."))?;

    Ok(Json(detail))
}

pub async fn update_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_participant(&state, id, &user).await?;

    let title = req.title.map(non_empty);
    let updated = with_db(&state, move |db| {
        if let Some(title) = &title {
            db.update_conversation_title(id, title.as_deref())?;
        }
        load_conversation(db, id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Conversation does not exist."))?;

    Ok(Json(updated))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_participant(&state, id, &user).await?;

    with_db(&state, move |db| db.delete_conversation(id)).await?;
    info!("User {} deleted conversation {}", user.username, id);
    Ok(StatusCode::NO_CONTENT)
}
