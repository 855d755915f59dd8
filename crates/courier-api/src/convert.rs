//! Row to API model conversions.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use courier_db::{ConversationRow, HistoryRow, MessageRow, NotificationRow, ParticipantRow, UserRow};
use courier_types::api::{
    ConversationResponse, HistoryEntry, MessageResponse, NotificationResponse, UnreadMessage,
};
use courier_types::models::{Participant, User};

use crate::error::ApiError;

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

fn parse_uuid(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt user id '{}': {}", raw, e);
        Uuid::default()
    })
}

/// Parse a time filter from the query string into the storage format.
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date.
pub fn parse_query_time(field: &str, raw: &str) -> Result<String, ApiError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|t| t.and_utc()))
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
        })
        .map_err(|_| ApiError::bad_request(format!("Invalid datetime for '{field}'.")))?;

    Ok(parsed.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn user(row: UserRow) -> User {
    User {
        user_id: parse_uuid(&row.id),
        role: row.role.parse().unwrap_or_else(|e| {
            warn!("Unknown role for user {}: {:?}", row.id, e);
            Default::default()
        }),
        created_at: parse_timestamp(&row.created_at),
        username: row.username,
        email: row.email,
        first_name: row.first_name,
        last_name: row.last_name,
        phone_number: row.phone_number,
    }
}

pub fn participant(row: &ParticipantRow) -> Participant {
    Participant {
        user_id: parse_uuid(&row.user_id),
        username: row.username.clone(),
        email: row.email.clone(),
    }
}

/// Build conversation responses, attaching each conversation's participants.
pub fn conversations(rows: Vec<ConversationRow>, participants: &[ParticipantRow]) -> Vec<ConversationResponse> {
    rows.into_iter()
        .map(|row| {
            let members: Vec<Participant> = participants
                .iter()
                .filter(|p| p.conversation_id == row.id)
                .map(participant)
                .collect();
            ConversationResponse {
                conversation_id: row.id,
                title: row.title,
                participant_count: members.len(),
                participants: members,
                created_at: parse_timestamp(&row.created_at),
                updated_at: parse_timestamp(&row.updated_at),
            }
        })
        .collect()
}

pub fn message(row: MessageRow) -> MessageResponse {
    MessageResponse {
        message_id: row.id,
        conversation: row.conversation_id,
        sender: Participant {
            user_id: parse_uuid(&row.sender_id),
            username: row.sender_username,
            email: row.sender_email,
        },
        receiver: row.receiver_id.as_deref().map(parse_uuid),
        parent_message_id: row.parent_id,
        content: row.content,
        timestamp: parse_timestamp(&row.created_at),
        edited: row.edited,
        edited_at: row.edited_at.as_deref().map(parse_timestamp),
        read: row.read,
    }
}

pub fn history(row: HistoryRow) -> HistoryEntry {
    HistoryEntry {
        old_content: row.old_content,
        edited_by: row.edited_by_username,
        edited_at: parse_timestamp(&row.edited_at),
    }
}

pub fn unread(row: MessageRow, with_conversation: bool) -> UnreadMessage {
    UnreadMessage {
        message_id: row.id,
        timestamp: parse_timestamp(&row.created_at),
        sender: row.sender_username,
        content: row.content,
        conversation_id: with_conversation.then_some(row.conversation_id),
    }
}

pub fn notification(row: NotificationRow) -> NotificationResponse {
    NotificationResponse {
        id: row.id,
        message_id: row.message_id,
        notification_type: row.kind.parse().unwrap_or_else(|e| {
            warn!("Unknown notification kind on {}: {:?}", row.id, e);
            Default::default()
        }),
        title: row.title,
        content: row.content,
        is_read: row.is_read,
        created_at: parse_timestamp(&row.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_time_formats() {
        assert_eq!(
            parse_query_time("sent_after", "2024-05-01").unwrap(),
            "2024-05-01T00:00:00.000Z"
        );
        assert_eq!(
            parse_query_time("sent_after", "2024-05-01 13:45:00").unwrap(),
            "2024-05-01T13:45:00.000Z"
        );
        assert_eq!(
            parse_query_time("sent_after", "2024-05-01T15:45:00+02:00").unwrap(),
            "2024-05-01T13:45:00.000Z"
        );
        assert!(parse_query_time("sent_after", "yesterday").is_err());
    }

    #[test]
    fn stored_timestamps_parse() {
        let t = parse_timestamp("2024-05-01T13:45:00.123Z");
        assert_eq!(t.timestamp_subsec_millis(), 123);
        assert_eq!(parse_timestamp("garbage"), DateTime::<Utc>::default());
    }
}
