//! Telegram Bot API client used as the notification destination.
//!
//! Only `sendMessage` is needed; the response envelope is the usual
//! `{ ok, result?, description? }` wrapper.

use std::time::Duration;

use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Telegram caps message text at 4096 characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Destination for formatted notification text.
pub trait Notifier {
    fn send(&self, text: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Notifier posting to `https://api.telegram.org/bot{token}/sendMessage`
/// with HTML parse mode. The base URL can be overridden for tests.
pub struct TelegramNotifier {
    http: reqwest::blocking::Client,
    chat_id: String,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: impl Into<String>) -> Result<Self> {
        Self::with_base_url(format!("https://api.telegram.org/bot{bot_token}"), chat_id)
    }

    /// Client pointing at a custom base URL (used by tests).
    pub fn with_base_url(base_url: String, chat_id: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            chat_id: chat_id.into(),
            base_url,
        })
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, text: &str) -> Result<(), NotifyError> {
        let text = truncate_message(text);

        let req = SendMessageRequest {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "HTML",
        };

        debug!("sending {} chars to chat {}", text.chars().count(), self.chat_id);

        let resp = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&req)
            .send()
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = resp.status();
        let body: TelegramResponse = resp
            .json()
            .map_err(|e| NotifyError::Api(format!("unreadable response: {e}")))?;

        if body.ok {
            return Ok(());
        }

        let desc = body
            .description
            .unwrap_or_else(|| "unknown error".to_string());

        match status.as_u16() {
            429 => Err(NotifyError::RateLimited {
                retry_after_secs: body
                    .parameters
                    .and_then(|p| p.retry_after)
                    .unwrap_or(1),
            }),
            400 | 403 => Err(NotifyError::InvalidDestination(desc)),
            _ => Err(NotifyError::Api(desc)),
        }
    }
}

/// Truncate to the API limit at a char boundary, marking the cut.
pub fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use std::sync::mpsc;

    /// Loopback server answering exactly one request with the given status
    /// and body, handing the captured request body back over a channel.
    fn one_shot_server(status: u16, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut captured = String::new();
            request.as_reader().read_to_string(&mut captured).ok();
            tx.send(captured).ok();
            request
                .respond(tiny_http::Response::from_string(body).with_status_code(status))
                .ok();
        });
        (format!("http://{addr}"), rx)
    }

    #[test]
    fn send_truncates_and_posts_html() {
        let (base_url, rx) = one_shot_server(200, r#"{"ok":true,"result":{}}"#);
        let notifier = TelegramNotifier::with_base_url(base_url, "42").unwrap();

        let long = "x".repeat(MAX_MESSAGE_CHARS + 50);
        notifier.send(&long).unwrap();

        let posted: serde_json::Value = serde_json::from_str(&rx.recv().unwrap()).unwrap();
        assert_eq!(posted["chat_id"], "42");
        assert_eq!(posted["parse_mode"], "HTML");
        let text = posted["text"].as_str().unwrap();
        assert_eq!(text.chars().count(), MAX_MESSAGE_CHARS);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn http_429_maps_to_rate_limited_with_retry_after() {
        let (base_url, _rx) = one_shot_server(
            429,
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 7","parameters":{"retry_after":7}}"#,
        );
        let notifier = TelegramNotifier::with_base_url(base_url, "42").unwrap();

        match notifier.send("hello") {
            Err(NotifyError::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, 7);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn http_403_maps_to_invalid_destination() {
        let (base_url, _rx) = one_shot_server(
            403,
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        );
        let notifier = TelegramNotifier::with_base_url(base_url, "42").unwrap();

        match notifier.send("hello") {
            Err(NotifyError::InvalidDestination(desc)) => {
                assert!(desc.contains("blocked"));
            }
            other => panic!("expected InvalidDestination, got {other:?}"),
        }
    }

    #[test]
    fn truncate_keeps_short_text_untouched() {
        assert_eq!(truncate_message("hello"), "hello");
    }

    #[test]
    fn truncate_caps_at_limit_with_marker() {
        let long: String = "ä".repeat(MAX_MESSAGE_CHARS + 100);
        let out = truncate_message(&long);
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn response_envelope_parses_rate_limit_parameters() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":7}}"#;
        let parsed: TelegramResponse = serde_json::from_str(body).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.parameters.unwrap().retry_after, Some(7));
    }
}
