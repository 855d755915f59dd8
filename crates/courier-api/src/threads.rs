use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{OriginalUri, Path, State},
    response::IntoResponse,
};
use tracing::debug;

use courier_db::MessageRow;
use courier_types::api::{
    ThreadNode, ThreadResponse, ThreadedConversationResponse, ThreadedMessage, ThreadedReply,
};

use crate::cache::ResponseCache;
use crate::convert::parse_timestamp;
use crate::conversations::require_participant;
use crate::error::ApiError;
use crate::messages::load_message;
use crate::middleware::AuthUser;
use crate::state::{AppState, with_db};

/// Top-level messages of a conversation, each with its direct replies.
/// `rows` must be oldest first.
pub fn build_threaded(conversation_id: i64, rows: &[MessageRow]) -> ThreadedConversationResponse {
    let children = children_by_parent(rows);

    let messages = rows
        .iter()
        .filter(|m| m.parent_id.is_none())
        .map(|m| ThreadedMessage {
            message_id: m.id,
            sender: m.sender_username.clone(),
            content: m.content.clone(),
            timestamp: parse_timestamp(&m.created_at),
            edited: m.edited,
            replies: children
                .get(&m.id)
                .into_iter()
                .flatten()
                .map(|r| ThreadedReply {
                    message_id: r.id,
                    sender: r.sender_username.clone(),
                    content: r.content.clone(),
                    timestamp: parse_timestamp(&r.created_at),
                    edited: r.edited,
                    parent_message_id: r.parent_id,
                })
                .collect(),
        })
        .collect();

    ThreadedConversationResponse { conversation_id, messages }
}

/// Replies nest at most this many levels below the thread root.
pub const MAX_THREAD_DEPTH: usize = 50;

/// The whole thread containing `message_id`, starting from its root.
/// `rows` must hold every message of the conversation, oldest first.
/// Anything deeper than `MAX_THREAD_DEPTH` is listed flat under the
/// deepest allowed level.
pub fn build_thread(rows: &[MessageRow], message_id: i64) -> Option<ThreadResponse> {
    let by_id: HashMap<i64, &MessageRow> = rows.iter().map(|m| (m.id, m)).collect();

    let mut root = *by_id.get(&message_id)?;
    // Bounded walk so a corrupt parent cycle cannot loop forever
    for _ in 0..rows.len() {
        match root.parent_id.and_then(|p| by_id.get(&p)) {
            Some(parent) => root = *parent,
            None => break,
        }
    }

    let children = children_by_parent(rows);

    // Breadth-first: (message, node it hangs under, depth)
    let mut seen = HashSet::from([root.id]);
    let mut order: Vec<(&MessageRow, Option<i64>, usize)> = vec![(root, None, 0)];
    let mut next = 0;
    while next < order.len() {
        let (m, host, depth) = order[next];
        next += 1;
        for &child in children.get(&m.id).into_iter().flatten() {
            if !seen.insert(child.id) {
                continue;
            }
            if depth < MAX_THREAD_DEPTH {
                order.push((child, Some(m.id), depth + 1));
            } else {
                order.push((child, host, depth));
            }
        }
    }

    // Hosts always precede their replies in `order`, so walking it
    // backwards finishes every subtree before its host is built.
    let mut built: HashMap<i64, Vec<ThreadNode>> = HashMap::new();
    let mut thread = None;
    for &(m, host, _) in order.iter().rev() {
        let mut replies = built.remove(&m.id).unwrap_or_default();
        replies.reverse();
        let node = thread_node(m, replies);
        match host {
            Some(h) => built.entry(h).or_default().push(node),
            None => thread = Some(node),
        }
    }

    Some(ThreadResponse {
        thread: thread?,
        total_messages_in_thread: order.len(),
    })
}

fn children_by_parent(rows: &[MessageRow]) -> HashMap<i64, Vec<&MessageRow>> {
    let mut children: HashMap<i64, Vec<&MessageRow>> = HashMap::new();
    for m in rows {
        if let Some(parent) = m.parent_id {
            children.entry(parent).or_default().push(m);
        }
    }
    children
}

fn thread_node(m: &MessageRow, replies: Vec<ThreadNode>) -> ThreadNode {
    ThreadNode {
        message_id: m.id,
        sender: m.sender_username.clone(),
        content: m.content.clone(),
        timestamp: parse_timestamp(&m.created_at),
        edited: m.edited,
        is_reply: m.parent_id.is_some(),
        replies,
    }
}

pub async fn threaded_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let key = ResponseCache::key(user.id, &uri);
    if let Some(hit) = state.cache.get(&key) {
        debug!("cache hit {}", key);
        return Ok(Json(hit));
    }

    require_participant(&state, id, &user).await?;
    let rows = with_db(&state, move |db| db.messages_in_conversation(id)).await?;

    let body = build_threaded(id, &rows);
    Ok(Json(state.cache.store(key, &body)?))
}

pub async fn message_thread(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let key = ResponseCache::key(user.id, &uri);
    if let Some(hit) = state.cache.get(&key) {
        debug!("cache hit {}", key);
        return Ok(Json(hit));
    }

    let message = load_message(&state, id, &user).await?;
    let conversation_id = message.conversation_id;
    let rows = with_db(&state, move |db| db.messages_in_conversation(conversation_id)).await?;

    let body = build_thread(&rows, id).ok_or_else(|| ApiError::not_found("Message does not exist."))?;
    Ok(Json(state.cache.store(key, &body)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, parent: Option<i64>) -> MessageRow {
        MessageRow {
            id,
            conversation_id: 1,
            sender_id: "u1".into(),
            sender_username: "alice".into(),
            sender_email: "alice@example.com".into(),
            receiver_id: None,
            parent_id: parent,
            content: format!("m{id}"),
            created_at: format!("2024-01-01T00:00:{id:02}.000Z"),
            edited: false,
            edited_at: None,
            read: false,
        }
    }

    //   1          5
    //   ├─ 2
    //   │  └─ 4
    //   └─ 3
    fn sample() -> Vec<MessageRow> {
        vec![row(1, None), row(2, Some(1)), row(3, Some(1)), row(4, Some(2)), row(5, None)]
    }

    #[test]
    fn threaded_view_has_one_level_of_replies() {
        let view = build_threaded(1, &sample());
        let ids: Vec<i64> = view.messages.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![1, 5]);

        let replies: Vec<i64> = view.messages[0].replies.iter().map(|r| r.message_id).collect();
        assert_eq!(replies, vec![2, 3]);
        assert_eq!(view.messages[0].replies[0].parent_message_id, Some(1));
        assert!(view.messages[1].replies.is_empty());
    }

    #[test]
    fn thread_from_any_node_starts_at_root() {
        let rows = sample();
        for id in [1, 2, 3, 4] {
            let t = build_thread(&rows, id).unwrap();
            assert_eq!(t.thread.message_id, 1);
            assert!(!t.thread.is_reply);
            assert_eq!(t.total_messages_in_thread, 4);
            assert_eq!(t.thread.replies[0].replies[0].message_id, 4);
            assert!(t.thread.replies[0].replies[0].is_reply);
        }

        let lone = build_thread(&rows, 5).unwrap();
        assert_eq!(lone.total_messages_in_thread, 1);
        assert!(build_thread(&rows, 99).is_none());
    }

    #[test]
    fn deep_chain_is_flattened_past_the_cap() {
        let mut rows = vec![row(1, None)];
        for id in 2..=5000 {
            rows.push(row(id, Some(id - 1)));
        }

        let t = build_thread(&rows, 5000).unwrap();
        assert_eq!(t.thread.message_id, 1);
        assert_eq!(t.total_messages_in_thread, 5000);

        let mut depth = 0;
        let mut node = &t.thread;
        while let Some(first) = node.replies.first() {
            if first.replies.is_empty() {
                // Every message below the cap hangs off this node, in order
                assert_eq!(node.replies.len(), 5000 - MAX_THREAD_DEPTH);
                assert_eq!(node.replies.last().unwrap().message_id, 5000);
            }
            depth += 1;
            node = first;
        }
        assert_eq!(depth, MAX_THREAD_DEPTH);

        let json = serde_json::to_string(&t).unwrap();
        let back: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back["total_messages_in_thread"], 5000);
    }

    #[test]
    fn parent_cycle_terminates() {
        let rows = vec![row(1, Some(2)), row(2, Some(1))];
        let t = build_thread(&rows, 1).unwrap();
        assert_eq!(t.total_messages_in_thread, 2);
    }
}
