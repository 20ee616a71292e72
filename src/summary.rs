//! One-shot digest: fetch recent messages and send a short summary to the
//! chat. A separate entry point from the monitor, not a runtime mode switch.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::warn;

use crate::mail::imap_client::MailSource;
use crate::notify::format;
use crate::notify::telegram::Notifier;

pub struct SummaryConfig {
    /// How many of the newest messages to fetch.
    pub limit: u32,
    /// How many of them to send as individual formatted entries.
    pub preview_count: usize,
    /// Pause between sends to stay under the bot rate limit.
    pub send_pause: Duration,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            preview_count: 5,
            send_pause: Duration::from_millis(500),
        }
    }
}

pub fn send_summary(
    source: &dyn MailSource,
    notifier: &dyn Notifier,
    cfg: &SummaryConfig,
) -> Result<()> {
    let emails = source.fetch_recent(cfg.limit)?;

    if emails.is_empty() {
        notifier
            .send("No emails found in the inbox.")
            .map_err(|e| anyhow::anyhow!("could not send summary: {e}"))?;
        return Ok(());
    }

    notifier
        .send(&format::render_digest_header(emails.len()))
        .map_err(|e| anyhow::anyhow!("could not send summary: {e}"))?;

    for email in emails.iter().take(cfg.preview_count) {
        if let Err(e) = notifier.send(&format::render_email(email)) {
            warn!("digest entry failed for {}: {e}", email.id);
        }
        thread::sleep(cfg.send_pause);
    }

    if emails.len() > cfg.preview_count {
        let remaining = emails.len() - cfg.preview_count;
        if let Err(e) = notifier.send(&format!(
            "... and {remaining} more emails.\n\nRun the monitor to get new mail in real time."
        )) {
            warn!("digest footer failed: {e}");
        }
    }

    Ok(())
}
