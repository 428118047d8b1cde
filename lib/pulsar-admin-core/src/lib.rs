//! Core types and traits for the pulsar-admin control-plane client.
//!
//! This crate provides the vocabulary shared by the client and by
//! authentication plugins:
//! - [`Error`] and [`Result`] - Error handling
//! - [`Authentication`], [`AuthData`] and [`AuthParams`] - Pluggable authentication
//! - [`Request`] and [`RequestBuilder`] - HTTP request types
//! - [`Response`] - HTTP response type
//! - [`Method`] and [`StatusCode`] - re-exported from the `http` crate

mod auth;
mod error;
pub mod prelude;
mod request;
mod response;

pub use auth::{AuthData, AuthParams, Authentication};
pub use error::{Error, Result};
pub use request::{Request, RequestBuilder};
pub use response::Response;

// Re-export http crate types for methods and status codes
pub use http::{Method, StatusCode};
