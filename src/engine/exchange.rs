use super::head::read_head;
use crate::body::{BodyError, WriteOutcome, Writer};
use crate::request::Request;
use crate::request_context::{RequestContext, RequestHandler};
use crate::response::{Response, INTERNAL_ERROR_PAGE, NOT_FOUND_PAGE};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};

const RAW_READ_SIZE: usize = 8192;

pub(crate) enum ConnectionOutcome {
    KeepAlive,
    Close,
}

enum Framing {
    None,
    FixedLength(u64),
    Chunked,
}

enum BodyFault {
    Io(io::Error),
    Writer(BodyError),
}

/// Drive the keep-alive loop for one accepted connection: read request heads off `transport`
/// until the peer closes it or a response demands the connection be closed.
pub(crate) fn serve_connection(
    transport: &mut (impl Read + Write),
    handler: &dyn RequestHandler,
    is_https: bool,
    host_port: u16,
    remote_addr: SocketAddr,
) {
    let mut buf = Vec::new();
    loop {
        match run_one_exchange(transport, &mut buf, handler, is_https, host_port, remote_addr) {
            Ok(ConnectionOutcome::KeepAlive) => continue,
            Ok(ConnectionOutcome::Close) => return,
            Err(err) => {
                log::trace!("connection {remote_addr} closed: {err}");
                return;
            }
        }
    }
}

fn run_one_exchange(
    transport: &mut (impl Read + Write),
    buf: &mut Vec<u8>,
    handler: &dyn RequestHandler,
    is_https: bool,
    host_port: u16,
    remote_addr: SocketAddr,
) -> io::Result<ConnectionOutcome> {
    let parsed = match read_head(transport, buf)? {
        None => return Ok(ConnectionOutcome::Close),
        Some(parsed) => parsed,
    };
    *buf = parsed.trailing;

    let wants_close = connection_wants_close(&parsed.line.version, &parsed.headers);
    let framing = determine_framing(&parsed.headers);

    log::trace!(
        "{} {} {} from {remote_addr}",
        parsed.line.method,
        parsed.line.url,
        parsed.line.version
    );

    let request = Request::new(
        parsed.line,
        is_https,
        host_port,
        remote_addr.ip().to_string(),
        remote_addr.port(),
        parsed.headers,
    );
    let mut request_context = RequestContext::new(request);
    let connection = request_context.connection.clone();

    let accept_result = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.accept(&mut request_context)
    }));

    let outcome = match accept_result {
        Ok(mut input) if !input.is_none() => {
            match deliver_body(transport, buf, &framing, input.writer_mut()) {
                Ok(()) => {
                    if connection.is_response_queue_empty() {
                        // S3: handler accepted the body but produced no response.
                        return Ok(ConnectionOutcome::Close);
                    }
                    ConnectionOutcome::KeepAlive
                }
                Err(BodyFault::Io(err)) => return Err(err),
                Err(BodyFault::Writer(err)) => {
                    log::error!("request body writer aborted: {err}");
                    if connection.is_response_queue_empty() {
                        enqueue_default(&connection, 500, INTERNAL_ERROR_PAGE);
                    }
                    connection.send_queue(transport);
                    return Ok(ConnectionOutcome::Close);
                }
            }
        }
        Ok(_none_input) => {
            drain_body(transport, buf, &framing)?;
            if connection.is_response_queue_empty() {
                enqueue_default(&connection, 404, NOT_FOUND_PAGE);
            }
            ConnectionOutcome::KeepAlive
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            log::error!("handler panicked: {message}");
            drain_body(transport, buf, &framing)?;
            if connection.is_response_queue_empty() {
                enqueue_default(&connection, 500, INTERNAL_ERROR_PAGE);
            }
            ConnectionOutcome::KeepAlive
        }
    };

    connection.send_queue(transport);
    transport.flush()?;

    if wants_close {
        Ok(ConnectionOutcome::Close)
    } else {
        Ok(outcome)
    }
}

fn enqueue_default(connection: &crate::connection::Connection, status: u16, page: &'static str) {
    connection.send_bytes(
        Response::new(status).with_content_type(mime::TEXT_HTML),
        page.as_bytes(),
    );
}

fn connection_wants_close(version: &str, headers: &[(String, String)]) -> bool {
    let mut explicit: Option<bool> = None;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("connection") {
            explicit = Some(value.eq_ignore_ascii_case("close"));
        }
    }
    explicit.unwrap_or(version != "HTTP/1.1")
}

fn determine_framing(headers: &[(String, String)]) -> Framing {
    let mut content_length = None;
    let mut chunked = false;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("transfer-encoding") {
            if value.to_ascii_lowercase().contains("chunked") {
                chunked = true;
            }
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value.trim().parse::<u64>().ok();
        }
    }
    if chunked {
        Framing::Chunked
    } else {
        match content_length {
            Some(0) | None => Framing::None,
            Some(n) => Framing::FixedLength(n),
        }
    }
}

fn drain_body(
    transport: &mut impl Read,
    buf: &mut Vec<u8>,
    framing: &Framing,
) -> io::Result<()> {
    match deliver_body(transport, buf, framing, None) {
        Ok(()) => Ok(()),
        Err(BodyFault::Io(err)) => Err(err),
        Err(BodyFault::Writer(_)) => unreachable!("no writer was offered"),
    }
}

/// Deliver (or, with `writer = None`, merely discard) the request body, implementing the
/// partial-accept protocol: each raw chunk read from the wire is re-offered to the writer until
/// fully consumed before another chunk is read, so a writer that accepts fewer bytes than
/// offered sees the remainder on its very next call rather than a fresh socket read.
fn deliver_body(
    transport: &mut impl Read,
    leftover: &mut Vec<u8>,
    framing: &Framing,
    writer: Option<&mut dyn Writer>,
) -> Result<(), BodyFault> {
    match framing {
        Framing::None => deliver_fixed_length(transport, leftover, 0, writer),
        Framing::FixedLength(n) => deliver_fixed_length(transport, leftover, *n, writer),
        Framing::Chunked => deliver_chunked(transport, leftover, writer),
    }
}

fn deliver_fixed_length(
    transport: &mut impl Read,
    leftover: &mut Vec<u8>,
    mut remaining: u64,
    mut writer: Option<&mut dyn Writer>,
) -> Result<(), BodyFault> {
    let mut ended = writer.is_none();

    while remaining > 0 {
        // top up `leftover` to a full raw read's worth (or to whatever is left of the body)
        // before offering anything to the writer, so a head read that happened to swallow a
        // few stray body bytes doesn't fragment the first chunk the writer sees.
        let target = remaining.min(RAW_READ_SIZE as u64) as usize;
        while leftover.len() < target {
            fill_exactly(transport, leftover, target - leftover.len()).map_err(BodyFault::Io)?;
        }

        let take = (leftover.len() as u64).min(remaining) as usize;
        let mut offset = 0;
        while offset < take && !ended {
            match writer.as_deref_mut().unwrap().write(&leftover[offset..take]) {
                Ok(WriteOutcome::Accepted(n)) => offset += n,
                Ok(WriteOutcome::EndOfStream) => ended = true,
                Err(err) => return Err(BodyFault::Writer(err)),
            }
        }

        remaining -= take as u64;
        *leftover = leftover.split_off(take);
    }

    if let Some(writer) = writer.as_deref_mut() {
        if !ended {
            writer.write(&[]).map_err(BodyFault::Writer)?;
        }
    }
    Ok(())
}

fn deliver_chunked(
    transport: &mut impl Read,
    leftover: &mut Vec<u8>,
    mut writer: Option<&mut dyn Writer>,
) -> Result<(), BodyFault> {
    let mut ended = writer.is_none();

    loop {
        let size_line = read_line(transport, leftover).map_err(BodyFault::Io)?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let chunk_size = usize::from_str_radix(size_str, 16).map_err(|_| {
            BodyFault::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid chunk size",
            ))
        })?;

        if chunk_size == 0 {
            loop {
                let trailer_line = read_line(transport, leftover).map_err(BodyFault::Io)?;
                if trailer_line.is_empty() {
                    break;
                }
            }
            break;
        }

        let mut remaining_chunk = chunk_size;
        while remaining_chunk > 0 {
            if leftover.is_empty() {
                fill_more(transport, leftover).map_err(BodyFault::Io)?;
            }
            let take = leftover.len().min(remaining_chunk);
            let mut offset = 0;
            while offset < take && !ended {
                match writer.as_deref_mut().unwrap().write(&leftover[offset..take]) {
                    Ok(WriteOutcome::Accepted(n)) => offset += n,
                    Ok(WriteOutcome::EndOfStream) => ended = true,
                    Err(err) => return Err(BodyFault::Writer(err)),
                }
            }
            remaining_chunk -= take;
            *leftover = leftover.split_off(take);
        }
        let _ = read_line(transport, leftover).map_err(BodyFault::Io)?;
    }

    if let Some(writer) = writer.as_deref_mut() {
        if !ended {
            writer.write(&[]).map_err(BodyFault::Writer)?;
        }
    }
    Ok(())
}

fn fill_more(transport: &mut impl Read, leftover: &mut Vec<u8>) -> io::Result<()> {
    let mut chunk = [0u8; RAW_READ_SIZE];
    let n = transport.read(&mut chunk)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-body",
        ));
    }
    leftover.extend_from_slice(&chunk[..n]);
    Ok(())
}

/// Read at most `want` bytes onto the end of `leftover`. Unlike [`fill_more`], this never
/// requests more than the caller asked for, so topping up to a target can't block on (or steal)
/// bytes belonging to whatever comes after this body.
fn fill_exactly(transport: &mut impl Read, leftover: &mut Vec<u8>, want: usize) -> io::Result<()> {
    let mut chunk = vec![0u8; want];
    let n = transport.read(&mut chunk)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-body",
        ));
    }
    leftover.extend_from_slice(&chunk[..n]);
    Ok(())
}

fn read_line(transport: &mut impl Read, leftover: &mut Vec<u8>) -> io::Result<String> {
    loop {
        if let Some(pos) = leftover.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = leftover.drain(..pos + 2).collect();
            return Ok(String::from_utf8_lossy(&line[..line.len() - 2]).into_owned());
        }
        fill_more(transport, leftover)?;
    }
}
