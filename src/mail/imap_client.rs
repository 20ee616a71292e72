use base64::{Engine as _, engine::general_purpose};
use log::warn;
use mailparse::MailHeaderMap;
use native_tls::TlsConnector;

use crate::auth::token_manager::TokenManager;
use crate::domain::email::{EmailSummary, MessageId};
use crate::error::FetchError;
use crate::mail::decoders::{decode_header_value, normalize_snippet};

const SNIPPET_CHARS: usize = 140;

/// Source of inbox state.
///
/// `fetch_recent` returns a finite batch of the most recent messages,
/// ordered newest-first. Implementations must keep that ordering stable so
/// callers can diff batches against their seen-set either way round.
pub trait MailSource {
    fn fetch_recent(&self, limit: u32) -> Result<Vec<EmailSummary>, FetchError>;
}

type Session = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;

/// Build canonical XOAUTH2 auth string as bytes.
fn build_xoauth2_bytes(user: &str, access_token: &str) -> Vec<u8> {
    format!("user={user}\x01auth=Bearer {access_token}\x01\x01").into_bytes()
}

struct XOAuth2 {
    response: Vec<u8>,
}

impl imap::Authenticator for XOAuth2 {
    type Response = Vec<u8>;
    fn process(&self, _challenge: &[u8]) -> Self::Response {
        self.response.clone()
    }
}

fn map_imap_err(e: imap::Error) -> FetchError {
    match e {
        imap::Error::Parse(e) => FetchError::Fatal(e.to_string()),
        other => FetchError::Transient(other.to_string()),
    }
}

/// A refresh rejected by the authorization server means the stored grant is
/// dead and the operator must re-authenticate; anything else (network, IO)
/// is worth retrying.
fn classify_token_error(e: &anyhow::Error) -> FetchError {
    let msg = format!("{e:#}");
    if msg.contains("invalid_grant") || msg.contains("Server returned error response") {
        FetchError::Auth(msg)
    } else {
        FetchError::Transient(msg)
    }
}

/// IMAP-backed [`MailSource`] authenticating with XOAUTH2.
pub struct ImapMailSource {
    server: String,
    user: String,
    tokens: TokenManager,
}

impl ImapMailSource {
    pub fn new(server: impl Into<String>, user: impl Into<String>, tokens: TokenManager) -> Self {
        Self {
            server: server.into(),
            user: user.into(),
            tokens,
        }
    }

    fn connect_and_auth(&self, access_token: &str) -> Result<Session, FetchError> {
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        let mut client = imap::connect((self.server.as_str(), 993), self.server.as_str(), &tls)
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let raw_payload = build_xoauth2_bytes(&self.user, access_token);

        // Servers disagree on whether the SASL payload should arrive raw or
        // pre-encoded; try raw first, fall back to base64.
        let auth_raw = XOAuth2 {
            response: raw_payload.clone(),
        };
        match client.authenticate("XOAUTH2", &auth_raw) {
            Ok(session) => return Ok(session),
            Err((_e, returned_client)) => {
                client = returned_client;
            }
        }

        let auth_b64 = XOAuth2 {
            response: general_purpose::STANDARD.encode(&raw_payload).into_bytes(),
        };
        match client.authenticate("XOAUTH2", &auth_b64) {
            Ok(session) => Ok(session),
            Err((e, _)) => Err(FetchError::Auth(format!("XOAUTH2 rejected: {e}"))),
        }
    }

    fn fetch_one(
        &self,
        session: &mut Session,
        uid_validity: u32,
        uid: u32,
    ) -> Result<Option<EmailSummary>, FetchError> {
        let fetches = session
            .uid_fetch(uid.to_string(), "(UID ENVELOPE BODY.PEEK[])")
            .map_err(map_imap_err)?;

        // Message may have been expunged between search and fetch.
        let Some(f) = fetches.iter().next() else {
            return Ok(None);
        };

        let envelope_subject = f
            .envelope()
            .and_then(|env| env.subject)
            .map(decode_header_value);

        let sender = f
            .envelope()
            .and_then(|env| env.from.as_ref())
            .and_then(|froms| froms.first())
            .map(|addr| {
                let name = addr
                    .name
                    .as_deref()
                    .map(decode_header_value)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());

                let address = match (addr.mailbox.as_deref(), addr.host.as_deref()) {
                    (Some(m), Some(h)) => Some(format!(
                        "{}@{}",
                        String::from_utf8_lossy(m),
                        String::from_utf8_lossy(h)
                    )),
                    (Some(m), None) => Some(String::from_utf8_lossy(m).into_owned()),
                    _ => None,
                };

                match (name, address) {
                    (Some(n), Some(a)) => format!("{n} <{a}>"),
                    (Some(n), None) => n,
                    (None, Some(a)) => a,
                    (None, None) => "(unknown sender)".to_string(),
                }
            })
            .unwrap_or_else(|| "(unknown sender)".to_string());

        let (snippet, received_at, header_subject) = match f.body() {
            Some(raw) => parse_body(raw),
            None => {
                warn!("uid {uid}: server returned no body; using empty snippet");
                (String::new(), 0, None)
            }
        };
        // A message without a parseable Date still gets a display date;
        // fetch time is close enough to arrival time.
        let received_at = if received_at > 0 {
            received_at
        } else {
            chrono::Utc::now().timestamp()
        };

        let subject = envelope_subject
            .filter(|s| !s.trim().is_empty())
            .or(header_subject)
            .unwrap_or_else(|| "(no subject)".to_string());

        Ok(Some(EmailSummary {
            id: MessageId(format!("{uid_validity}:{uid}")),
            sender,
            subject,
            snippet,
            received_at,
        }))
    }
}

impl MailSource for ImapMailSource {
    /// Newest-first batch of the `limit` highest UIDs in INBOX.
    fn fetch_recent(&self, limit: u32) -> Result<Vec<EmailSummary>, FetchError> {
        let access = self
            .tokens
            .get_access_token()
            .map_err(|e| classify_token_error(&e))?;

        let mut session = self.connect_and_auth(&access)?;
        let mailbox = session.select("INBOX").map_err(map_imap_err)?;
        let uid_validity = mailbox.uid_validity.unwrap_or(0);

        let mut uids: Vec<u32> = session
            .uid_search("ALL")
            .map_err(map_imap_err)?
            .into_iter()
            .collect();
        uids.sort_unstable_by(|a, b| b.cmp(a)); // newest first
        uids.dedup();
        uids.truncate(limit as usize);

        let mut out = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.fetch_one(&mut session, uid_validity, uid) {
                Ok(Some(summary)) => out.push(summary),
                Ok(None) => {}
                Err(e) => {
                    session.logout().ok();
                    return Err(e);
                }
            }
        }

        session.logout().ok();
        Ok(out)
    }
}

/// Extract (snippet, date epoch, subject fallback) from a raw RFC 822 body.
fn parse_body(raw_rfc822: &[u8]) -> (String, i64, Option<String>) {
    match mailparse::parse_mail(raw_rfc822) {
        Ok(parsed) => {
            let received_at = parsed
                .headers
                .get_first_value("Date")
                .and_then(|d| mailparse::dateparse(&d).ok())
                .unwrap_or(0);

            let subject = parsed
                .headers
                .get_first_value("Subject")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());

            let body = text_part(&parsed)
                .or_else(|| parsed.get_body().ok())
                .unwrap_or_default();

            (normalize_snippet(&body, SNIPPET_CHARS), received_at, subject)
        }
        Err(_) => (
            normalize_snippet(&String::from_utf8_lossy(raw_rfc822), SNIPPET_CHARS),
            0,
            None,
        ),
    }
}

/// Best text/plain part, recursing into multiparts; text/html stripped of
/// tags as a last resort.
fn text_part(p: &mailparse::ParsedMail) -> Option<String> {
    let mime = p.ctype.mimetype.to_ascii_lowercase();
    if mime == "text/plain" {
        return p.get_body().ok();
    }

    for sp in &p.subparts {
        if let Some(t) = text_part(sp) {
            return Some(t);
        }
    }

    if mime == "text/html"
        && let Ok(html) = p.get_body()
    {
        return Some(strip_tags(&html));
    }

    None
}

fn strip_tags(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_body_prefers_text_plain_and_reads_date() {
        let raw = b"Date: Mon, 23 Oct 2023 10:00:00 +0000\r\n\
                    Subject: hi\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    hello there\r\n";
        let (snippet, received_at, subject) = parse_body(raw);
        assert_eq!(snippet, "hello there");
        assert_eq!(received_at, 1698055200);
        assert_eq!(subject.as_deref(), Some("hi"));
    }

    #[test]
    fn parse_body_strips_html_when_no_plain_part() {
        let raw = b"Content-Type: text/html\r\n\
                    \r\n\
                    <p>hello <b>bold</b></p>\r\n";
        let (snippet, _, _) = parse_body(raw);
        assert_eq!(snippet, "hello bold");
    }

    #[test]
    fn xoauth2_payload_shape() {
        let bytes = build_xoauth2_bytes("me@example.com", "tok");
        assert_eq!(
            bytes,
            b"user=me@example.com\x01auth=Bearer tok\x01\x01".to_vec()
        );
    }
}
