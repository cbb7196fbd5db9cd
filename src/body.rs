use std::fmt::{self, Debug, Formatter};
use thiserror::Error;

/// An error raised by a handler-provided [`Writer`] or [`Reader`], aborting the stream.
#[derive(Error, Debug)]
#[error("body stream error: {0}")]
pub struct BodyError(pub String);

impl BodyError {
    /// Build a new [`BodyError`] from any displayable message.
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// The three-state result of a single `write`/`read` call: some bytes were accepted, the stream
/// is finished, or (via the surrounding `Result::Err`) the stream aborted with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// `n` bytes of the offered slice were consumed. `n` is always `<= buf.len()`.
    Accepted(usize),
    /// End of stream; no further bytes will be accepted or produced.
    EndOfStream,
}

/// A push interface that the engine fills from the wire with request body bytes.
pub trait Writer: Send {
    /// Offer up to `buf.len()` bytes of request body. implementations may accept fewer than
    /// offered; the caller will re-offer the remainder on a subsequent call.
    fn write(&mut self, buf: &[u8]) -> std::result::Result<WriteOutcome, BodyError>;
}

/// A pull interface that the engine drains to the wire to produce a response body.
pub trait Reader: Send {
    /// Fill up to `buf.len()` bytes of response body, returning how many were written.
    fn read(&mut self, buf: &mut [u8]) -> std::result::Result<WriteOutcome, BodyError>;
}

/// A handler-supplied sink for the request body, returned from [`RequestHandler::accept`].
///
/// [`RequestHandler::accept`]: crate::RequestHandler::accept
pub struct Input(Option<Box<dyn Writer>>);

impl Input {
    /// Wrap a concrete [`Writer`] as an accepted `Input`.
    pub fn new(writer: impl Writer + 'static) -> Self {
        Self(Some(Box::new(writer)))
    }

    /// An `Input` that declines the request entirely; the socket will respond with a default
    /// 404 page unless the handler queued an explicit response.
    pub fn none() -> Self {
        Self(None)
    }

    /// True if this `Input` has no underlying writer.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub(crate) fn writer_mut(&mut self) -> Option<&mut dyn Writer> {
        self.0.as_deref_mut()
    }
}

impl Debug for Input {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Input")
            .field(&if self.0.is_some() { "<writer>" } else { "none" })
            .finish()
    }
}

/// A handler-supplied source for a streamed response body, passed to
/// [`Connection::send_reader`][crate::Connection::send_reader].
pub struct Output(Box<dyn Reader>);

impl Output {
    /// Wrap a concrete [`Reader`] as an `Output`.
    pub fn new(reader: impl Reader + 'static) -> Self {
        Self(Box::new(reader))
    }

    pub(crate) fn into_reader(self) -> Box<dyn Reader> {
        self.0
    }
}

impl Debug for Output {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Output").field(&"<reader>").finish()
    }
}
