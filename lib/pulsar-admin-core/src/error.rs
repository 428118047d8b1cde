//! Error types for pulsar-admin.

use std::time::Duration;

use derive_more::{Display, Error, From};

/// Main error type for pulsar-admin operations.
///
/// Build-time variants ([`Error::Configuration`],
/// [`Error::UnsupportedAuthentication`], [`Error::TlsMaterial`]) are returned
/// synchronously by `AdminClientBuilder::build` before any network I/O.
/// The remaining variants are produced while executing requests.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Missing or invalid configuration value.
    #[display("invalid configuration: {_0}")]
    #[from(skip)]
    Configuration(#[error(not(source))] String),

    /// The authentication plugin could not be resolved or constructed.
    #[display("unsupported authentication '{plugin}': {reason}")]
    #[from(skip)]
    UnsupportedAuthentication {
        /// Plugin identifier as configured.
        plugin: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A referenced certificate, key or store file is missing or unreadable.
    #[display("TLS material '{path}': {message}")]
    #[from(skip)]
    TlsMaterial {
        /// Path of the offending file.
        path: String,
        /// Error message.
        message: String,
    },

    /// No pooled connection became available within the connect timeout.
    #[display("connection pool exhausted for {host} after {waited:?}")]
    #[from(skip)]
    PoolExhausted {
        /// Pool key (`scheme://host:port`).
        host: String,
        /// How long the acquisition waited.
        #[error(not(source))]
        waited: Duration,
    },

    /// The client has been shut down.
    #[display("connection pool closed")]
    #[from(skip)]
    PoolClosed,

    /// Background certificate refresh failed; the previous material stays active.
    #[display("certificate refresh failed: {_0}")]
    #[from(skip)]
    RefreshFailed(#[error(not(source))] String),

    /// HTTP-level errors (non-2xx status codes).
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS errors raised by the transport.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request or read timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Invalid request.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// Response body could not be decoded.
    #[display("decompression error: {_0}")]
    #[from(skip)]
    Decompression(#[error(not(source))] String),

    /// JSON (de)serialization error.
    #[display("JSON error: {_0}")]
    #[from]
    Json(serde_json::Error),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an unsupported authentication error.
    #[must_use]
    pub fn unsupported_authentication(
        plugin: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedAuthentication {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    /// Create a TLS material error.
    #[must_use]
    pub fn tls_material(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TlsMaterial {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error from status code and message.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` if the authentication plugin could not be resolved.
    #[must_use]
    pub const fn is_unsupported_authentication(&self) -> bool {
        matches!(self, Self::UnsupportedAuthentication { .. })
    }

    /// Returns `true` for missing or unreadable TLS material.
    #[must_use]
    pub const fn is_tls_material(&self) -> bool {
        matches!(self, Self::TlsMaterial { .. })
    }

    /// Returns `true` if the pool could not hand out a connection in time.
    #[must_use]
    pub const fn is_pool_exhausted(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` for errors detected while building a client.
    #[must_use]
    pub const fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::UnsupportedAuthentication { .. } | Self::TlsMaterial { .. }
        )
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
