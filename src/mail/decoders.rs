/// Decode a raw header value that may contain RFC 2047 encoded words.
/// mailparse expects a full "Key: value" header line, so one is synthesized.
pub fn decode_header_value(raw: &[u8]) -> String {
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw);
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Collapse a body into a single-line snippet of at most `max_chars`.
pub fn normalize_snippet(s: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(line);
        if out.chars().count() >= max_chars {
            break;
        }
    }
    out.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_header_value_handles_plain_ascii() {
        assert_eq!(decode_header_value(b"Hello world"), "Hello world");
    }

    #[test]
    fn decode_header_value_decodes_rfc2047_words() {
        // "Grüße" encoded as a UTF-8 Q-encoded word
        let raw = b"=?utf-8?Q?Gr=C3=BC=C3=9Fe?=";
        assert_eq!(decode_header_value(raw), "Gr\u{fc}\u{df}e");
    }

    #[test]
    fn normalize_snippet_collapses_lines_and_truncates() {
        let body = "first line\n\n   second line   \nthird";
        assert_eq!(normalize_snippet(body, 100), "first line second line third");
        assert_eq!(normalize_snippet(body, 10), "first line");
    }
}
