use crate::body::{BodyError, Output, Reader, WriteOutcome};
use crate::response::{reason_phrase, Response};
use bytes::Bytes;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const CALLBACK_CHUNK_SIZE: usize = 8 * 1024;

enum ResponseEntry {
    BasicAuthChallenge {
        realm: String,
        response: Response,
    },
    Memory {
        response: Response,
        bytes: Bytes,
    },
    File {
        response: Response,
        file: File,
        len: u64,
    },
    Callback {
        response: Response,
        reader: Box<dyn Reader>,
    },
}

/// The response sink for one exchange: a FIFO queue of deferred sends, flushed to the wire in
/// order exactly once.
///
/// see [`Connection::send_bytes`], [`Connection::send_reader`], and [`Connection::send_file`] for
/// the three ways a handler can enqueue a response, and [`Connection::send_queue`] for flushing.
#[derive(Default)]
pub struct Connection {
    queue: Mutex<VecDeque<ResponseEntry>>,
    response_sent: AtomicBool,
}

impl Connection {
    /// A connection with an empty response queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a send of an in-memory buffer. `bytes` is reference-counted and never copied.
    pub fn send_bytes(&self, response: Response, bytes: impl Into<Bytes>) {
        self.enqueue(response, |response| ResponseEntry::Memory {
            response,
            bytes: bytes.into(),
        });
    }

    /// Enqueue a send that pulls the body from a handler-provided [`Output`] in chunks of at
    /// most 8 KiB, using chunked transfer-encoding since the length is unknown up front.
    pub fn send_reader(&self, response: Response, output: Output) {
        self.enqueue(response, |response| ResponseEntry::Callback {
            response,
            reader: output.into_reader(),
        });
    }

    /// Enqueue a send of an entire file. the file's length is resolved via an end-seek right
    /// now, and the open file handle is held until the queue is flushed.
    pub fn send_file(&self, response: Response, path: impl AsRef<Path>) -> io::Result<()> {
        let mut file = File::open(path)?;
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        self.enqueue(response, |response| ResponseEntry::File {
            response,
            file,
            len,
        });
        Ok(())
    }

    fn enqueue(&self, response: Response, make_entry: impl FnOnce(Response) -> ResponseEntry) {
        let entry = if response.status_code() == 401 {
            let realm = response.realm_id().unwrap_or("").to_string();
            ResponseEntry::BasicAuthChallenge { realm, response }
        } else {
            make_entry(response)
        };
        self.queue.lock().unwrap().push_back(entry);
    }

    /// True if nothing is queued to send.
    pub fn is_response_queue_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    /// True if at least one queued entry has been successfully flushed to the wire.
    pub fn has_response_sent(&self) -> bool {
        self.response_sent.load(Ordering::SeqCst)
    }

    /// Flush every queued entry, in enqueue order, to `out`. Draining the queue makes this
    /// naturally idempotent: a second call with nothing left queued is a no-op that returns
    /// `true`. Returns the logical AND of each entry's send outcome.
    pub fn send_queue<W: Write>(&self, out: &mut W) -> bool {
        let mut queue = self.queue.lock().unwrap();
        let mut all_ok = true;
        while let Some(entry) = queue.pop_front() {
            match Self::dispatch(entry, out) {
                Ok(()) => self.response_sent.store(true, Ordering::SeqCst),
                Err(err) => {
                    log::error!("error sending queued response: {err}");
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    fn dispatch<W: Write>(entry: ResponseEntry, out: &mut W) -> io::Result<()> {
        match entry {
            ResponseEntry::BasicAuthChallenge { realm, response } => {
                let www_authenticate = format!("Basic realm=\"{}\"", realm.replace('"', "\\\""));
                write_head(
                    out,
                    &response,
                    Some(0),
                    false,
                    Some(("WWW-Authenticate", &www_authenticate)),
                )?;
                Ok(())
            }
            ResponseEntry::Memory { response, bytes } => {
                write_head(out, &response, Some(bytes.len() as u64), false, None)?;
                out.write_all(&bytes)
            }
            ResponseEntry::File {
                response,
                mut file,
                len,
            } => {
                write_head(out, &response, Some(len), false, None)?;
                io::copy(&mut file, out)?;
                Ok(())
            }
            ResponseEntry::Callback {
                response,
                mut reader,
            } => {
                write_head(out, &response, None, true, None)?;
                let mut buf = vec![0u8; CALLBACK_CHUNK_SIZE];
                loop {
                    match reader.read(&mut buf) {
                        Ok(WriteOutcome::Accepted(n)) => {
                            write!(out, "{:x}\r\n", n)?;
                            out.write_all(&buf[..n])?;
                            out.write_all(b"\r\n")?;
                        }
                        Ok(WriteOutcome::EndOfStream) => {
                            out.write_all(b"0\r\n\r\n")?;
                            break;
                        }
                        Err(BodyError(message)) => {
                            log::error!("response body stream aborted: {message}");
                            return Err(io::Error::other(message));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn write_head<W: Write>(
    out: &mut W,
    response: &Response,
    content_length: Option<u64>,
    chunked: bool,
    extra_header: Option<(&str, &str)>,
) -> io::Result<()> {
    let status = response.status_code();
    write!(out, "HTTP/1.1 {} {}\r\n", status, reason_phrase(status))?;
    write!(
        out,
        "Date: {}\r\n",
        httpdate::fmt_http_date(std::time::SystemTime::now())
    )?;

    if let Some(content_type) = response.content_type() {
        write!(out, "Content-Type: {content_type}\r\n")?;
    }
    for (name, value) in response.headers() {
        write!(out, "{name}: {value}\r\n")?;
    }
    if let Some((name, value)) = extra_header {
        write!(out, "{name}: {value}\r\n")?;
    }
    if chunked {
        write!(out, "Transfer-Encoding: chunked\r\n")?;
    } else if let Some(len) = content_length {
        write!(out, "Content-Length: {len}\r\n")?;
    }
    write!(out, "\r\n")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::response::Response;

    fn flush_to_string(connection: &Connection) -> String {
        let mut buf = Vec::new();
        connection.send_queue(&mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn send_bytes_reports_content_length() {
        let connection = Connection::new();
        connection.send_bytes(
            Response::new(200).with_content_type(mime::TEXT_PLAIN),
            Bytes::from_static(b"hi"),
        );
        let out = flush_to_string(&connection);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Length: 2\r\n"));
        assert!(out.ends_with("\r\n\r\nhi"));
        assert!(connection.has_response_sent());
    }

    #[test]
    fn basic_auth_challenge_uses_realm() {
        let connection = Connection::new();
        connection.send_bytes(Response::new(401).with_realm("r"), Bytes::new());
        let out = flush_to_string(&connection);
        assert!(out.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(out.contains("WWW-Authenticate: Basic realm=\"r\"\r\n"));
    }

    #[test]
    fn double_flush_is_a_noop() {
        let connection = Connection::new();
        connection.send_bytes(Response::new(200), Bytes::from_static(b"x"));
        let mut first = Vec::new();
        assert!(connection.send_queue(&mut first));
        let mut second = Vec::new();
        assert!(connection.send_queue(&mut second));
        assert!(second.is_empty());
        assert!(!first.is_empty());
    }

    #[test]
    fn queue_flushes_in_enqueue_order() {
        let connection = Connection::new();
        connection.send_bytes(Response::new(200), Bytes::from_static(b"first"));
        connection.send_bytes(Response::new(200), Bytes::from_static(b"second"));
        let out = flush_to_string(&connection);
        let first_idx = out.find("first").unwrap();
        let second_idx = out.find("second").unwrap();
        assert!(first_idx < second_idx);
    }
}
