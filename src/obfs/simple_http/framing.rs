//! Wire framing for the HTTP disguise.
//!
//! The client hides the first few payload bytes in the request path of a
//! synthetic `GET`, the server answers with a fixed response header. Both
//! sides discard the peer's header block up to the first blank line.

use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;

/// Host header sent when none is configured.
pub const DEFAULT_HOST: &str = "www.baidu.com:80";

/// End of an HTTP header block.
pub const HEADER_TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// Upper bound on bytes accumulated while looking for the terminator.
pub const MAX_HEADER_SCAN: usize = 8192;

/// Size of each underlying read during the header scan.
pub const SCAN_CHUNK: usize = 8192;

/// First writes up to this length are carried entirely in the request path.
pub const INLINE_HEAD_MAX: usize = 16;

/// Head length drawn for longer first writes.
pub const HEAD_LEN_RANGE: Range<usize> = 8..16;

pub const USER_AGENTS: [&str; 12] = [
    "Mozilla/5.0 (Windows NT 6.3; WOW64; rv:40.0) Gecko/20100101 Firefox/40.0",
    "Mozilla/5.0 (Windows NT 6.3; WOW64; rv:40.0) Gecko/20100101 Firefox/44.0",
    "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2228.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/535.11 (KHTML, like Gecko) Ubuntu/11.10 Chromium/27.0.1453.93 Chrome/27.0.1453.93 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:35.0) Gecko/20100101 Firefox/35.0",
    "Mozilla/5.0 (compatible; WOW64; MSIE 10.0; Windows NT 6.2)",
    "Mozilla/5.0 (Windows; U; Windows NT 6.1; en-US) AppleWebKit/533.20.25 (KHTML, like Gecko) Version/5.0.4 Safari/533.20.27",
    "Mozilla/4.0 (compatible; MSIE 7.0; Windows NT 6.3; Trident/7.0; .NET4.0E; .NET4.0C)",
    "Mozilla/5.0 (Windows NT 6.3; Trident/7.0; rv:11.0) like Gecko",
    "Mozilla/5.0 (Linux; Android 4.4; Nexus 5 Build/BuildID) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/30.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPad; CPU OS 5_0 like Mac OS X) AppleWebKit/534.46 (KHTML, like Gecko) Version/5.1 Mobile/9A334 Safari/7534.48.3",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 5_0 like Mac OS X) AppleWebKit/534.46 (KHTML, like Gecko) Version/5.1 Mobile/9A334 Safari/7534.48.3",
];

const REQUEST_TRAILER: &str = "Accept: text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8\r\n\
Accept-Language: en-US,en;q=0.8\r\n\
Accept-Encoding: gzip, deflate\r\n\
DNT: 1\r\n\
Connection: keep-alive\r\n\
\r\n";

const RESPONSE_HEADER: &str = "HTTP/1.1 200 OK\r\n\
Server: nginx\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Connection: keep-alive\r\n\
\r\n";

/// Percent-escape the hex form of `head`: every byte becomes `%xx`.
pub fn encode_header(head: &[u8]) -> String {
    let mut out = String::with_capacity(head.len() * 3);
    for (i, digit) in hex::encode(head).chars().enumerate() {
        if i % 2 == 0 {
            out.push('%');
        }
        out.push(digit);
    }
    out
}

/// Inverse of [`encode_header`]. Accepts either hex case.
pub fn decode_header(path: &str) -> Option<Vec<u8>> {
    let bytes = path.as_bytes();
    if bytes.len() % 3 != 0 {
        return None;
    }

    let mut digits = Vec::with_capacity(bytes.len() / 3 * 2);
    for group in bytes.chunks_exact(3) {
        if group[0] != b'%' {
            return None;
        }
        digits.extend_from_slice(&group[1..]);
    }
    hex::decode(digits).ok()
}

/// How many leading payload bytes go into the request path.
pub fn head_len<R: Rng + ?Sized>(payload_len: usize, rng: &mut R) -> usize {
    if payload_len > INLINE_HEAD_MAX {
        rng.gen_range(HEAD_LEN_RANGE)
    } else {
        payload_len
    }
}

/// Build the first client frame: synthetic request header, then the body.
pub fn build_request<R: Rng + ?Sized>(payload: &[u8], host: &str, rng: &mut R) -> Bytes {
    let (head, body) = payload.split_at(head_len(payload.len(), rng));
    let user_agent = USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())];

    let header = format!(
        "GET /{} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\n{}",
        encode_header(head),
        host,
        user_agent,
        REQUEST_TRAILER
    );

    let mut frame = BytesMut::with_capacity(header.len() + body.len());
    frame.put_slice(header.as_bytes());
    frame.put_slice(body);
    frame.freeze()
}

/// Build the first server frame: fixed response header, then the payload.
pub fn build_response(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(RESPONSE_HEADER.len() + payload.len());
    frame.put_slice(RESPONSE_HEADER.as_bytes());
    frame.put_slice(payload);
    frame.freeze()
}

/// Offset of the first header terminator in `buf`.
pub fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Recover the payload head carried in a disguised request line.
pub fn parse_request_head(header: &[u8]) -> Option<Vec<u8>> {
    let line_end = header.windows(2).position(|w| w == b"\r\n")?;
    let line = std::str::from_utf8(&header[..line_end]).ok()?;

    let mut parts = line.split(' ');
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if parts.next().is_some() || method != "GET" || !version.starts_with("HTTP/1.") {
        return None;
    }

    decode_header(target.strip_prefix('/')?)
}
