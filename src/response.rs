use mime::Mime;

/// A response constructed by the handler and handed to a [`Connection`][crate::Connection].
#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    content_type: Option<Mime>,
    headers: Vec<(String, String)>,
    realm_id: Option<String>,
}

impl Response {
    /// Build a new response with the given status code and no headers or content type set.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            content_type: None,
            headers: Vec::new(),
            realm_id: None,
        }
    }

    /// Set the `Content-Type`.
    pub fn with_content_type(mut self, content_type: Mime) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Append a response header. headers are sent in insertion order.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the Basic-Auth realm used when `status_code == 401`.
    pub fn with_realm(mut self, realm_id: impl Into<String>) -> Self {
        self.realm_id = Some(realm_id.into());
        self
    }

    /// The HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// The parsed `Content-Type`, if set.
    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    /// The ordered response headers.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The Basic-Auth realm, if set.
    pub fn realm_id(&self) -> Option<&str> {
        self.realm_id.as_deref()
    }
}

/// The built-in 404 page, served when no handler produced a response.
pub const NOT_FOUND_PAGE: &str = "<!doctype html><html><head><title>Not Found</title></head><body><h1>Not Found</h1></body></html>";

/// The built-in 500 page, served when a handler fault was caught.
pub const INTERNAL_ERROR_PAGE: &str = "<!doctype html><html><head><title>Internal Server Error</title></head><body><h1>Internal Server Error</h1></body></html>";

/// Reason phrase for common status codes; falls back to a generic phrase.
pub fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
