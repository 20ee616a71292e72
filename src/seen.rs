use std::collections::HashMap;

use crate::domain::email::{EmailSummary, MessageId};

/// Tracks message ids that have already been handed to the notifier.
///
/// Ids are inserted by [`SeenSet::filter_new`] *before* any notification is
/// attempted, so an id returned once is never returned again within the same
/// process. Each id carries the epoch at which a fetch last returned it;
/// [`SeenSet::evict_older_than`] bounds memory by dropping ids the provider
/// has stopped returning. An id present in every batch keeps a fresh stamp
/// and is never evicted, however old the message itself is.
#[derive(Debug, Default)]
pub struct SeenSet {
    // id -> last time a fetch batch contained the id
    ids: HashMap<MessageId, i64>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a set from persisted `(id, last_seen)` entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (MessageId, i64)>) -> Self {
        Self {
            ids: entries.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the messages whose id has not been seen yet, inserting those
    /// ids as a side effect; ids already present get their last-seen stamp
    /// refreshed to `now_epoch`. Calling it again with the same input yields
    /// an empty batch. Input order (newest-first or oldest-first) is
    /// preserved in the output and does not affect correctness.
    pub fn filter_new(&mut self, batch: &[EmailSummary], now_epoch: i64) -> Vec<EmailSummary> {
        let mut fresh = Vec::new();
        for msg in batch {
            if self.ids.insert(msg.id.clone(), now_epoch).is_none() {
                fresh.push(msg.clone());
            }
        }
        fresh
    }

    /// Drop ids whose last-seen stamp predates `horizon_epoch`. Ids at or
    /// inside the horizon are kept.
    pub fn evict_older_than(&mut self, horizon_epoch: i64) {
        self.ids.retain(|_, last_seen| *last_seen >= horizon_epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(id: &str, received_at: i64) -> EmailSummary {
        EmailSummary {
            id: MessageId::from(id),
            sender: "Alice <alice@example.com>".into(),
            subject: format!("subject {id}"),
            snippet: String::new(),
            received_at,
        }
    }

    #[test]
    fn filter_new_returns_only_unseen() {
        let mut seen = SeenSet::new();
        let first = seen.filter_new(
            &[email("1:a", 10), email("1:b", 11), email("1:c", 12)],
            100,
        );
        assert_eq!(first.len(), 3);

        let second = seen.filter_new(
            &[email("1:b", 11), email("1:c", 12), email("1:d", 13)],
            200,
        );
        let ids: Vec<_> = second.iter().map(|m| m.id.as_str().to_string()).collect();
        assert_eq!(ids, ["1:d"]);
    }

    #[test]
    fn filter_new_is_idempotent() {
        let mut seen = SeenSet::new();
        let batch = [email("1:a", 10), email("1:b", 11)];
        assert_eq!(seen.filter_new(&batch, 100).len(), 2);
        assert!(seen.filter_new(&batch, 100).is_empty());
        assert!(seen.filter_new(&batch, 101).is_empty());
    }

    #[test]
    fn filter_new_dedupes_within_one_batch() {
        let mut seen = SeenSet::new();
        let fresh = seen.filter_new(&[email("1:a", 10), email("1:a", 10)], 100);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn eviction_respects_the_horizon() {
        let mut seen = SeenSet::new();
        seen.filter_new(&[email("1:old", 0)], 100);
        seen.filter_new(&[email("1:edge", 0)], 200);
        seen.filter_new(&[email("1:new", 0)], 300);

        seen.evict_older_than(200);

        assert!(!seen.contains(&MessageId::from("1:old")));
        assert!(seen.contains(&MessageId::from("1:edge")));
        assert!(seen.contains(&MessageId::from("1:new")));
    }

    #[test]
    fn id_still_being_fetched_is_never_evicted() {
        // An old message that keeps appearing in the recent-N fetch window
        // gets its stamp refreshed every cycle and must stay seen.
        let mut seen = SeenSet::new();
        assert_eq!(seen.filter_new(&[email("1:a", 5)], 100).len(), 1);
        assert!(seen.filter_new(&[email("1:a", 5)], 500).is_empty());

        seen.evict_older_than(400);

        assert!(seen.contains(&MessageId::from("1:a")));
        assert!(seen.filter_new(&[email("1:a", 5)], 600).is_empty());
    }

    #[test]
    fn evicted_id_can_be_notified_again() {
        // Documented consequence of bounding memory: an id that drops out of
        // the fetch window for longer than the retention horizon is treated
        // as new if the provider returns it again.
        let mut seen = SeenSet::new();
        seen.filter_new(&[email("1:a", 5)], 100);
        seen.evict_older_than(200);
        assert_eq!(seen.filter_new(&[email("1:a", 5)], 300).len(), 1);
    }

    #[test]
    fn from_entries_round_trip() {
        let seen = SeenSet::from_entries(vec![(MessageId::from("1:a"), 10)]);
        assert_eq!(seen.len(), 1);
        assert!(seen.contains(&MessageId::from("1:a")));
    }
}
