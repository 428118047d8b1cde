//! Tower middleware applied to every admin request.
//!
//! The client stacks the layers around the pooled transport, outermost first:
//!
//! - [`LoggingLayer`] - logs requests and responses using `tracing`
//! - [`AuthLayer`] - adds the headers returned by the authentication provider
//! - [`DecompressionLayer`] - sends `Accept-Encoding: gzip` and decodes gzip bodies
//!
//! The layers work on [`Request`](crate::Request) and
//! [`Response`](crate::Response), so they can also wrap a custom transport
//! in tests.

mod auth;
mod decompression;
mod logging;

pub use auth::{Auth, AuthLayer};
pub use decompression::{Decompression, DecompressionLayer};
pub use logging::{Logging, LoggingLayer};

pub use tower::{Layer, ServiceBuilder};
