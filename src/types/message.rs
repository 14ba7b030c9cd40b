use serde::{Deserialize, Serialize};

/// Direction of a message relative to the device owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Inbox,
    Sent,
}

impl MessageDirection {
    /// Map a provider message type column to a direction.
    ///
    /// 1 is inbox; 2 (sent), 4 (outbox), 5 (failed) and 6 (queued) are all
    /// outgoing. Drafts and unknown types have no direction.
    pub fn from_provider_type(message_type: i32) -> Option<Self> {
        match message_type {
            1 => Some(Self::Inbox),
            2 | 4 | 5 | 6 => Some(Self::Sent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inbox" => Some(Self::Inbox),
            "sent" => Some(Self::Sent),
            _ => None,
        }
    }
}

/// Cached copy of one provider message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub thread_id: i64,
    pub address: String,
    pub body: String,
    pub timestamp: i64,
    pub is_read: bool,
    pub direction: MessageDirection,
    pub subscription_id: i32,
    pub last_sync_timestamp: i64,
}

/// Message as emitted to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub thread_id: i64,
    pub address: String,
    pub body: String,
    pub timestamp: i64,
    pub is_read: bool,
    pub direction: MessageDirection,
    pub subscription_id: i32,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            thread_id: record.thread_id,
            address: record.address,
            body: record.body,
            timestamp: record.timestamp,
            is_read: record.is_read,
            direction: record.direction,
            subscription_id: record.subscription_id,
        }
    }
}
