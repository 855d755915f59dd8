use rusqlite::types::Value;

/// Filters for the message list. Text filters are case-insensitive
/// substring matches. Time bounds are inclusive and compared in the storage
/// timestamp format.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub conversation_id: Option<i64>,
    pub sender_id: Option<String>,
    pub sender_username: Option<String>,
    pub sent_after: Option<String>,
    pub sent_before: Option<String>,
    pub content: Option<String>,
    /// Matches content or sender username.
    pub search: Option<String>,
    pub oldest_first: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub participant_id: Option<String>,
    pub participant_username: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    /// Matches any participant's username.
    pub search: Option<String>,
    pub order: ConversationOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationOrder {
    CreatedAsc,
    CreatedDesc,
    #[default]
    UpdatedAsc,
    UpdatedDesc,
}

impl ConversationOrder {
    /// Parse an `ordering` query value such as `created_at` or `-updated_at`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(Self::CreatedAsc),
            "-created_at" => Some(Self::CreatedDesc),
            "updated_at" => Some(Self::UpdatedAsc),
            "-updated_at" => Some(Self::UpdatedDesc),
            _ => None,
        }
    }

    pub(crate) fn sql(&self) -> &'static str {
        match self {
            Self::CreatedAsc => "c.created_at ASC, c.id ASC",
            Self::CreatedDesc => "c.created_at DESC, c.id DESC",
            Self::UpdatedAsc => "c.updated_at ASC, c.id ASC",
            Self::UpdatedDesc => "c.updated_at DESC, c.id DESC",
        }
    }
}

/// Accumulates `AND`-joined conditions with positional `?` parameters.
#[derive(Debug, Default)]
pub(crate) struct WhereClause {
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl WhereClause {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a condition containing exactly one `?` placeholder.
    pub(crate) fn push(&mut self, condition: &str, value: impl Into<Value>) {
        self.conditions.push(condition.to_string());
        self.params.push(value.into());
    }

    /// Add a condition whose `?` placeholders all bind the same value.
    pub(crate) fn push_repeated(&mut self, condition: &str, value: impl Into<Value>) {
        let value = value.into();
        for _ in 0..condition.matches('?').count() {
            self.params.push(value.clone());
        }
        self.conditions.push(condition.to_string());
    }

    pub(crate) fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub(crate) fn params(&self) -> &[Value] {
        &self.params
    }

    /// Parameters followed by LIMIT and OFFSET.
    pub(crate) fn params_with_page(&self, limit: u32, offset: u64) -> Vec<Value> {
        let mut params = self.params.clone();
        params.push(Value::Integer(i64::from(limit)));
        params.push(Value::Integer(offset as i64));
        params
    }
}

/// `LIKE` pattern for a substring match. Pair with `ESCAPE '\'`.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
