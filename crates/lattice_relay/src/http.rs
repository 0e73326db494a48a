//! Minimal HTTP/1.1-shaped framing for the API face: a request line,
//! headers, an optional body sized by `Content-Length`. Responses and push
//! frames are serialized the same way. This is not a web server; it parses
//! exactly what the API face speaks.

use std::collections::HashMap;

#[derive(Debug, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A full request was consumed off the buffer.
    Request(Request),
    /// Need more bytes.
    Partial,
    /// Unrecoverable framing error; close the connection.
    Bad(&'static str),
}

/// Try to pop one request off the inbound buffer.
pub fn parse_request(buf: &mut Vec<u8>) -> ParseOutcome {
    let Some(head_end) = find_head_end(buf) else {
        // An absurdly long header section is an attack, not a client.
        if buf.len() > 64 * 1024 {
            return ParseOutcome::Bad("header section too large");
        }
        return ParseOutcome::Partial;
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return ParseOutcome::Bad("malformed request line");
    };
    let method = method.to_owned();
    let path = path.to_owned();

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return ParseOutcome::Bad("malformed header");
        };
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    let content_length: usize = match headers.get("content-length") {
        None => 0,
        Some(v) => match v.parse() {
            Ok(n) => n,
            Err(_) => return ParseOutcome::Bad("bad content-length"),
        },
    };

    let body_start = head_end + 4;
    if buf.len() < body_start + content_length {
        return ParseOutcome::Partial;
    }

    let body = buf[body_start..body_start + content_length].to_vec();
    buf.drain(..body_start + content_length);

    ParseOutcome::Request(Request {
        method,
        path,
        headers,
        body,
    })
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

/// Serialize a response with a JSON body.
pub fn response(code: u16, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        code,
        status_text(code),
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

/// Serialize a push frame: `EVENT: <name>` + JSON body.
pub fn event_frame(name: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "EVENT: {}\r\nContent-Length: {}\r\n\r\n",
        name,
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let mut buf = b"GET /buffers HTTP/1.1\r\nAuthorization: Bearer s3cret\r\n\r\n".to_vec();
        match parse_request(&mut buf) {
            ParseOutcome::Request(req) => {
                assert_eq!(req.method, "GET");
                assert_eq!(req.path, "/buffers");
                assert_eq!(req.headers.get("authorization").unwrap(), "Bearer s3cret");
                assert!(req.body.is_empty());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn parse_post_with_body() {
        let body = br#"{"nicks":true}"#;
        let mut buf = format!(
            "POST /sync HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        buf.extend_from_slice(body);
        buf.extend_from_slice(b"GET /buffers HTTP/1.1\r\n\r\n");

        match parse_request(&mut buf) {
            ParseOutcome::Request(req) => {
                assert_eq!(req.method, "POST");
                assert_eq!(req.body, body);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // The second request is still queued.
        match parse_request(&mut buf) {
            ParseOutcome::Request(req) => assert_eq!(req.path, "/buffers"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn partial_until_body_complete() {
        let mut buf = b"POST /input HTTP/1.1\r\nContent-Length: 10\r\n\r\n12345".to_vec();
        assert_eq!(parse_request(&mut buf), ParseOutcome::Partial);
        buf.extend_from_slice(b"67890");
        assert!(matches!(parse_request(&mut buf), ParseOutcome::Request(_)));
    }

    #[test]
    fn bad_requests() {
        let mut buf = b"\r\n\r\n".to_vec();
        assert!(matches!(parse_request(&mut buf), ParseOutcome::Bad(_)));

        let mut buf = b"GET /x HTTP/1.1\r\nContent-Length: nope\r\n\r\n".to_vec();
        assert!(matches!(parse_request(&mut buf), ParseOutcome::Bad(_)));
    }

    #[test]
    fn frames() {
        let resp = response(200, br#"{"ok":true}"#);
        let text = String::from_utf8(resp).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("{\"ok\":true}"));

        let frame = event_frame("buffer_line_added", b"{}");
        let text = String::from_utf8(frame).unwrap();
        assert!(text.starts_with("EVENT: buffer_line_added\r\n"));
    }
}
