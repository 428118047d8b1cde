//! Prelude module for convenient imports.
//!
//! ```ignore
//! use pulsar_admin::prelude::*;
//! ```

pub use crate::{
    AdminClient, AdminClientBuilder, AuthData, AuthParams, Authentication, ClientConfig, Error,
    Method, PluginRegistry, Request, Response, Result, StatusCode,
};
