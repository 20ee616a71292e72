use anyhow::Result;

use crate::domain::email::MessageId;

/// Persistence for the seen-set, so a restart does not re-notify messages
/// still inside the retention horizon.
pub trait SeenStore {
    /// All persisted `(id, last_seen)` entries.
    fn load(&self) -> Result<Vec<(MessageId, i64)>>;

    /// Record ids as seen at the given epoch. Re-recording an existing id
    /// refreshes its last-seen stamp.
    fn record(&self, entries: &[(MessageId, i64)]) -> Result<()>;

    /// Remove entries whose last-seen stamp predates the horizon.
    fn evict_older_than(&self, horizon_epoch: i64) -> Result<()>;

    fn get_meta_i64(&self, key: &str) -> Result<Option<i64>>;
    fn set_meta_i64(&self, key: &str, value: i64) -> Result<()>;
}
