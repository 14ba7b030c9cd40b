pub mod conversation;
pub mod message;
pub mod preferences;
pub mod responses;

pub use conversation::{Conversation, ConversationSummary};
pub use message::{Message, MessageDirection, MessageRecord};
pub use preferences::{PreferenceSnapshot, Theme};
pub use responses::ActionOutcome;
