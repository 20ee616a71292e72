//! Rendering of notification text (Telegram HTML parse mode).

use chrono::{DateTime, Utc};

use crate::domain::email::EmailSummary;

/// Escape the three characters Telegram's HTML mode treats specially.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn render_date(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .filter(|_| epoch != 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "(unknown)".to_string())
}

/// One new-mail notification.
pub fn render_email(email: &EmailSummary) -> String {
    let mut text = format!(
        "\u{1f4e7} <b>New Email</b>\n\n\
         <b>From:</b> {}\n\
         <b>Subject:</b> {}\n\
         <b>Date:</b> {}\n",
        escape_html(&email.sender),
        escape_html(&email.subject),
        render_date(email.received_at),
    );
    if !email.snippet.is_empty() {
        text.push_str(&format!("\n<i>{}</i>\n", escape_html(&email.snippet)));
    }
    text
}

/// Header line of the one-shot digest.
pub fn render_digest_header(total: usize) -> String {
    format!("\u{1f4ec} <b>Inbox Summary</b>\n\nRecent emails: {total}\n")
}

pub fn render_monitor_started() -> String {
    "\u{1f514} <b>Mail Monitor Started</b>\n\n\
     You will receive a notification for each new email."
        .to_string()
}

pub fn render_monitor_stopped() -> String {
    "\u{1f515} Mail monitoring stopped.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::email::MessageId;

    #[test]
    fn escapes_html_entities() {
        assert_eq!(escape_html("a < b & c > d"), "a &lt; b &amp; c &gt; d");
    }

    #[test]
    fn renders_all_fields() {
        let email = EmailSummary {
            id: MessageId::from("1:7"),
            sender: "Eve <eve@example.com>".into(),
            subject: "Re: 1 < 2".into(),
            snippet: "short preview".into(),
            received_at: 1698055200,
        };
        let text = render_email(&email);
        assert!(text.contains("<b>From:</b> Eve &lt;eve@example.com&gt;"));
        assert!(text.contains("<b>Subject:</b> Re: 1 &lt; 2"));
        assert!(text.contains("2023-10-23 10:00 UTC"));
        assert!(text.contains("<i>short preview</i>"));
    }

    #[test]
    fn missing_date_renders_placeholder() {
        let email = EmailSummary {
            id: MessageId::from("1:8"),
            sender: "x".into(),
            subject: "y".into(),
            snippet: String::new(),
            received_at: 0,
        };
        let text = render_email(&email);
        assert!(text.contains("<b>Date:</b> (unknown)"));
        assert!(!text.contains("<i>"));
    }
}
