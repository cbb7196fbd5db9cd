use thiserror::Error;

/// Concrete errors that occur within this crate's public surface.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServerError {
    /// A settings entry used a key we don't recognize
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    /// A settings key was supplied more than once
    #[error("duplicate configuration key: {0}")]
    DuplicateKey(String),

    /// A settings value failed to parse or was out of range
    #[error("invalid value for key {key}: {value}")]
    InvalidValue {
        /// The offending key
        key: String,
        /// The offending value
        value: String,
    },

    /// A required settings key was never supplied
    #[error("missing required configuration key: {0}")]
    MissingRequired(String),

    /// An operation that is only legal before `listen` was attempted while listening
    #[error("socket is already listening")]
    Busy,

    /// The supplied certificate PEM could not be parsed
    #[error("invalid TLS certificate: {0}")]
    CertificateInvalid(String),

    /// The supplied private key PEM could not be parsed
    #[error("invalid TLS private key: {0}")]
    KeyInvalid(String),

    /// The engine failed to bind/start (port in use, permission denied, ...)
    #[error("failed to start listener: {0}")]
    ListenFailed(#[from] std::io::Error),

    /// `get_argument` was called for a key that is not present
    #[error("argument not found: {0}")]
    ArgumentNotFound(String),

    /// `https` was requested in [`Settings`](crate::Settings) but the crate was built without
    /// the `tls` feature.
    #[error("TLS support was not compiled in (enable the `tls` feature)")]
    TlsUnavailable,
}

/// This crate's result type
pub type Result<T> = std::result::Result<T, ServerError>;
