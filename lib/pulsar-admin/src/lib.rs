//! Builder and pooled HTTP transport for the pulsar-admin control-plane client.
//!
//! Accumulate connection, security and transport settings with
//! [`AdminClientBuilder`], then [`build`](AdminClientBuilder::build) an
//! immutable [`AdminClient`]. Building resolves the authentication plugin,
//! validates TLS material and sizes the connection pool before any network I/O.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use pulsar_admin::prelude::*;
//!
//! let client = AdminClient::builder()
//!     .service_http_url("https://broker.example.com:8443")
//!     .authentication_with_params("token", "file:///etc/pulsar/admin.token")
//!     .tls_trust_certs_file_path("/etc/pulsar/ca.pem")
//!     .max_connections_per_host(8)
//!     .request_timeout(Duration::from_secs(30))
//!     .build()?;
//!
//! let request = client.request(Method::GET, "/admin/v2/tenants")?.build();
//! let tenants: Vec<String> = client.execute(request).await?.json()?;
//! ```

pub mod auth;
mod builder;
mod client;
pub mod config;
mod connector;
mod load_conf;
pub mod middleware;
mod plugin;
pub mod pool;
pub mod prelude;
pub mod tls;

pub use builder::AdminClientBuilder;
pub use client::{AdminClient, BoxedService, ServiceFuture};
pub use config::{AuthenticationConfig, ClientConfig};
pub use connector::RefreshStats;
pub use plugin::{AuthFactory, PluginRegistry, SslFactory, SslFactoryConstructor};
pub use pool::{ConnectionPolicy, ConnectionPool, PoolStats, PooledConnection};
pub use tls::TlsConfig;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use pulsar_admin_core::{
    AuthData, AuthParams, Authentication, Error, Method, Request, RequestBuilder, Response,
    Result, StatusCode,
};
