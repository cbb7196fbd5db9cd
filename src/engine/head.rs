use crate::request::RequestLine;
use std::io::{self, Read};

const MAX_HEAD_LEN: usize = 64 * 1024;
const READ_CHUNK: usize = 4096;

/// Result of reading one request head off the wire.
pub(crate) struct ParsedHead {
    pub(crate) line: RequestLine,
    pub(crate) headers: Vec<(String, String)>,
    /// Bytes already read past the head terminator; the start of the request body (or of the
    /// next pipelined request, for a body-less method).
    pub(crate) trailing: Vec<u8>,
}

/// Read and parse one HTTP/1.1 request head from `stream`, growing `buf` (which may already
/// hold bytes pipelined from a previous exchange on the same keep-alive connection) as needed.
///
/// returns `Ok(None)` only when the peer closed the connection before sending any bytes of a new
/// request, which is the ordinary way a keep-alive connection ends.
pub(crate) fn read_head(
    stream: &mut impl Read,
    buf: &mut Vec<u8>,
) -> io::Result<Option<ParsedHead>> {
    loop {
        if let Some(head_end) = find_head_end(buf) {
            let mut header_storage = [httparse::EMPTY_HEADER; 64];
            let mut parsed = httparse::Request::new(&mut header_storage);
            let status = parsed
                .parse(&buf[..head_end])
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            if !status.is_complete() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "incomplete request head",
                ));
            }

            let line = RequestLine {
                version: format!("HTTP/1.{}", parsed.version.unwrap_or(1)),
                method: parsed.method.unwrap_or("").to_string(),
                url: parsed.path.unwrap_or("").to_string(),
            };
            let headers = parsed
                .headers
                .iter()
                .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
                .collect();
            let trailing = buf.split_off(head_end);

            return Ok(Some(ParsedHead {
                line,
                headers,
                trailing,
            }));
        }

        if buf.len() >= MAX_HEAD_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request head exceeded maximum size",
            ));
        }

        let was_empty = buf.is_empty();
        let mut chunk = [0u8; READ_CHUNK];
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            if was_empty {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-head",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}
