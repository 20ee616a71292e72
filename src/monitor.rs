//! The poll loop: fetch → diff → notify → sleep.
//!
//! Single-threaded and cooperative. Transient fetch failures back off
//! exponentially; authentication failure halts the loop (re-auth is an
//! external step). Notification failures are logged per message and never
//! stop the loop. Cancellation is a flag checked between cycles and between
//! sleep slices; in-flight calls run to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::{error, info, warn};

use crate::error::FetchError;
use crate::mail::imap_client::MailSource;
use crate::notify::format;
use crate::notify::telegram::Notifier;
use crate::seen::SeenSet;
use crate::store::repo::SeenStore;

pub struct MonitorConfig {
    /// Base poll interval in seconds; also the backoff base.
    pub interval_secs: u64,
    /// How many of the newest messages to fetch per cycle.
    pub fetch_limit: u32,
    /// Backoff ceiling.
    pub max_backoff_secs: u64,
    /// Consecutive fetch failures after which a single operator alert is sent.
    pub alert_threshold: u32,
    /// Ids whose last-seen stamp is older than this are evicted to bound
    /// memory. Ids still returned by the fetch keep a fresh stamp, so only
    /// ids that have left the fetch window age out.
    pub retention_secs: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            fetch_limit: 25,
            max_backoff_secs: 300,
            alert_threshold: 5,
            retention_secs: 7 * 24 * 3600,
        }
    }
}

/// Loop-owned state; drives backoff decisions.
#[derive(Debug, Default)]
struct PollState {
    last_poll_epoch: i64,
    consecutive_failures: u32,
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `base * 2^(failures-1)`, capped at `max_secs`. `failures` starts at 1.
pub fn backoff_delay(base_secs: u64, failures: u32, max_secs: u64) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    let secs = base_secs.saturating_mul(1u64 << exp).min(max_secs);
    Duration::from_secs(secs)
}

/// Sleep in one-second slices so a cancellation flag takes effect promptly.
fn sleep_with_cancel(total: Duration, running: &AtomicBool) {
    let mut remaining = total;
    while !remaining.is_zero() && running.load(Ordering::SeqCst) {
        let step = remaining.min(Duration::from_secs(1));
        thread::sleep(step);
        remaining -= step;
    }
}

/// Run the monitor until `running` is cleared or authentication fails.
///
/// Ids are recorded in the store *before* their notification is sent:
/// a crash in between drops that notification rather than duplicating it
/// on restart (at-most-once).
pub fn run_monitor(
    source: &dyn MailSource,
    notifier: &dyn Notifier,
    store: &dyn SeenStore,
    cfg: &MonitorConfig,
    running: &AtomicBool,
) -> Result<()> {
    let mut seen = SeenSet::from_entries(store.load()?);
    // An empty store means first run: the initial fetch only seeds the
    // seen-set, pre-existing mail is not notified.
    let mut seeding = seen.is_empty();
    let mut state = PollState::default();

    info!(
        "monitor started (interval {}s, {} ids loaded)",
        cfg.interval_secs,
        seen.len()
    );
    if let Err(e) = notifier.send(&format::render_monitor_started()) {
        warn!("could not send startup message: {e}");
    }

    while running.load(Ordering::SeqCst) {
        match source.fetch_recent(cfg.fetch_limit) {
            Err(FetchError::Auth(msg)) => {
                error!("authentication failed, halting: {msg}");
                let _ = notifier.send(
                    "\u{26a0} Mail monitor halted: authentication failed. \
                     Re-authenticate and restart the monitor.",
                );
                return Err(anyhow!("authentication failed: {msg}"));
            }
            Err(e) => {
                state.consecutive_failures += 1;
                warn!(
                    "fetch failed ({} in a row): {e}",
                    state.consecutive_failures
                );
                if state.consecutive_failures == cfg.alert_threshold {
                    let _ = notifier.send(&format!(
                        "\u{26a0} Mail monitor: {} consecutive fetch failures, \
                         still retrying. Last error: {e}",
                        state.consecutive_failures
                    ));
                }
                let delay = backoff_delay(
                    cfg.interval_secs,
                    state.consecutive_failures,
                    cfg.max_backoff_secs,
                );
                sleep_with_cancel(delay, running);
                continue;
            }
            Ok(batch) => {
                state.consecutive_failures = 0;
                let now = now_epoch();
                state.last_poll_epoch = now;
                store.set_meta_i64("last_poll_epoch", state.last_poll_epoch)?;

                let fresh = seen.filter_new(&batch, now);
                // Every id in the batch gets its stamp refreshed, not just
                // the fresh ones: an id the fetch keeps returning must never
                // age past the horizon and come back as new.
                let entries: Vec<_> = batch.iter().map(|m| (m.id.clone(), now)).collect();
                store.record(&entries)?;

                if seeding {
                    seeding = false;
                    info!("seeded seen-set with {} existing messages", fresh.len());
                } else {
                    // oldest first, so the chat reads chronologically
                    for msg in fresh.iter().rev() {
                        match notifier.send(&format::render_email(msg)) {
                            Ok(()) => info!("notified {} ({})", msg.id, msg.subject),
                            Err(e) => warn!("notify failed for {}: {e}", msg.id),
                        }
                    }
                }

                let horizon = now - cfg.retention_secs;
                seen.evict_older_than(horizon);
                store.evict_older_than(horizon)?;
            }
        }

        sleep_with_cancel(Duration::from_secs(cfg.interval_secs), running);
    }

    info!("monitor stopping");
    if let Err(e) = notifier.send(&format::render_monitor_stopped()) {
        warn!("could not send shutdown message: {e}");
    }
    Ok(())
}
