use std::fmt;

/// Opaque provider-assigned message id.
///
/// The IMAP source formats this as `"{uidvalidity}:{uid}"` so ids stay
/// unique even if the mailbox is renumbered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable summary of a fetched message.
#[derive(Debug, Clone)]
pub struct EmailSummary {
    pub id: MessageId,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    /// Receive time, epoch seconds.
    pub received_at: i64,
}
