use serde::{Deserialize, Serialize};

use super::preferences::PreferenceSnapshot;

/// Cached summary of one provider thread.
///
/// Written only by the sync engine, always as a full row replace.
/// Archived/pinned/muted state is never stored here; it is joined from
/// the preference store when a [`Conversation`] is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub thread_id: i64,
    pub address: String,
    pub snippet: String,
    pub last_message_timestamp: i64,
    pub is_read: bool,
    pub resolved_sender_name: Option<String>,
    pub last_sync_timestamp: i64,
}

/// Conversation as emitted to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub thread_id: i64,
    pub address: String,
    pub display_name: String,
    pub snippet: String,
    pub last_message_timestamp: i64,
    pub is_read: bool,
    pub archived: bool,
    pub pinned: bool,
    pub muted: bool,
    pub blocked: bool,
}

impl Conversation {
    /// Build the domain view of a cached row, joining preference state.
    pub fn from_summary(summary: &ConversationSummary, prefs: &PreferenceSnapshot) -> Self {
        let display_name = summary
            .resolved_sender_name
            .clone()
            .unwrap_or_else(|| summary.address.clone());

        Self {
            thread_id: summary.thread_id,
            address: summary.address.clone(),
            display_name,
            snippet: summary.snippet.clone(),
            last_message_timestamp: summary.last_message_timestamp,
            is_read: summary.is_read,
            archived: prefs.archived_threads.contains(&summary.thread_id),
            pinned: prefs.pinned_threads.contains(&summary.thread_id),
            muted: prefs.muted_threads.contains(&summary.thread_id),
            blocked: prefs.blocked_addresses.contains(&summary.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> ConversationSummary {
        ConversationSummary {
            thread_id: 7,
            address: "+15550001".to_string(),
            snippet: "see you".to_string(),
            last_message_timestamp: 1_000,
            is_read: false,
            resolved_sender_name: None,
            last_sync_timestamp: 2_000,
        }
    }

    #[test]
    fn test_display_name_falls_back_to_address() {
        let conv = Conversation::from_summary(&summary(), &PreferenceSnapshot::default());
        assert_eq!(conv.display_name, "+15550001");
        assert!(!conv.archived);

        let mut named = summary();
        named.resolved_sender_name = Some("Alice".to_string());
        let conv = Conversation::from_summary(&named, &PreferenceSnapshot::default());
        assert_eq!(conv.display_name, "Alice");
    }

    #[test]
    fn test_preference_sets_are_joined() {
        let mut prefs = PreferenceSnapshot::default();
        prefs.archived_threads.insert(7);
        prefs.muted_threads.insert(7);
        prefs.blocked_addresses.insert("+15550001".to_string());

        let conv = Conversation::from_summary(&summary(), &prefs);
        assert!(conv.archived);
        assert!(conv.muted);
        assert!(conv.blocked);
        assert!(!conv.pinned);
    }
}
