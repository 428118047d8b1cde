//! Admin client handle and its pooled HTTP transport.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::task::JoinHandle;
use tower::Layer;
use tower::util::BoxCloneService;
use tower_service::Service;
use tracing::debug;
use url::Url;

use crate::builder::AdminClientBuilder;
use crate::config::ClientConfig;
use crate::connector::{RefreshCounters, RefreshStats};
use crate::middleware::{AuthLayer, DecompressionLayer, LoggingLayer};
use crate::pool::{ConnectionPolicy, ConnectionPool, PoolStats};
use crate::{Authentication, Error, Method, Request, RequestBuilder, Response, Result};

/// Type-erased service for middleware composition.
pub type BoxedService = BoxCloneService<Request, Response, Error>;

/// Future returned by [`AdminClient`] as a tower service.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// Thread-safe wrapper for `BoxedService`.
///
/// `BoxCloneService` is not `Sync`; the mutex is only held while cloning.
#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, request: Request) -> ServiceFuture {
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Box::pin(async move { service.call(request).await })
    }
}

async fn within<T>(limit: Duration, future: impl Future<Output = Result<T>>) -> Result<T> {
    if limit.is_zero() {
        future.await
    } else {
        tokio::time::timeout(limit, future)
            .await
            .map_err(|_| Error::Timeout)?
    }
}

/// Transport leasing a pool slot around each hyper exchange.
#[derive(Clone)]
pub(crate) struct PooledTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    pool: ConnectionPool,
}

impl PooledTransport {
    pub fn new(connector: HttpsConnector<HttpConnector>, pool: ConnectionPool) -> Self {
        let policy = pool.policy();
        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(policy.connection_limit().unwrap_or(usize::MAX));
        if !policy.connection_max_idle.is_zero() {
            builder.pool_idle_timeout(policy.connection_max_idle);
        }
        Self {
            inner: builder.build(connector),
            pool,
        }
    }

    fn policy(&self) -> &ConnectionPolicy {
        self.pool.policy()
    }

    fn build_hyper_request(request: Request) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, headers, body) = request.into_parts();

        let mut builder = http::Request::builder().method(method).uri(url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = body.map_or_else(Full::default, Full::new);
        builder
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    fn extract_headers(headers: &http::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        let lease = self.pool.acquire(&request.host_key()).await?;
        let hyper_request = Self::build_hyper_request(request)?;
        let read_timeout = self.policy().read_timeout;

        let exchange = async {
            let response = self
                .inner
                .request(hyper_request)
                .await
                .map_err(Self::map_hyper_error)?;

            let status = response.status().as_u16();
            let headers = Self::extract_headers(response.headers());
            let body = within(read_timeout, async {
                response
                    .into_body()
                    .collect()
                    .await
                    .map_err(|e| Error::connection(e.to_string()))
            })
            .await?
            .to_bytes();

            Ok(Response::new(status, headers, body))
        };

        let result = within(self.policy().request_timeout, exchange).await;
        drop(lease);
        result
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = format!("{err}: {}", error_chain(&err));

        if msg.contains("certificate") || msg.contains("tls") || msg.contains("TLS") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain.join(": ")
}

impl Service<Request> for PooledTransport {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.execute(request).await })
    }
}

/// Stack the middleware around the transport, outermost first:
/// logging, authentication, then gzip when enabled.
pub(crate) fn service_stack(
    transport: PooledTransport,
    authentication: Arc<dyn Authentication>,
    accept_gzip: bool,
) -> BoxedService {
    let mut service = BoxCloneService::new(transport);
    if accept_gzip {
        service = BoxCloneService::new(DecompressionLayer::new().layer(service));
    }
    service = BoxCloneService::new(AuthLayer::new(authentication).layer(service));
    BoxCloneService::new(LoggingLayer::new().layer(service))
}

/// Everything `build()` assembles for a client.
pub(crate) struct ClientParts {
    pub config: ClientConfig,
    pub service_url: Url,
    pub authentication: Arc<dyn Authentication>,
    pub pool: ConnectionPool,
    pub service: BoxedService,
    pub tasks: Vec<JoinHandle<()>>,
    pub refresh: Arc<RefreshCounters>,
}

struct ClientInner {
    config: ClientConfig,
    service_url: Url,
    authentication: Arc<dyn Authentication>,
    pool: ConnectionPool,
    service: SyncService,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    refresh: Arc<RefreshCounters>,
    shutdown: AtomicBool,
}

impl ClientInner {
    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in &tasks {
            task.abort();
        }
        self.pool.close();
        debug!(url = %self.service_url, tasks = tasks.len(), "admin client shut down");
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Control-plane client produced by [`AdminClientBuilder::build`].
///
/// The configuration is frozen at build time. Cloning is cheap and yields a
/// handle to the same client; dropping the last handle shuts it down.
///
/// # Example
///
/// ```ignore
/// use pulsar_admin::{AdminClient, Method};
///
/// let client = AdminClient::builder()
///     .service_http_url("https://broker.example.com:8443")
///     .authentication_with_params("token", "token:eyJhbGciOi...")
///     .tls_trust_certs_file_path("/etc/pulsar/ca.pem")
///     .build()?;
///
/// let request = client.request(Method::GET, "/admin/v2/clusters")?.build();
/// let clusters: Vec<String> = client.execute(request).await?.json()?;
/// ```
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminClient")
            .field("service_url", &self.inner.service_url.as_str())
            .field("authentication", &self.inner.authentication.auth_method_name())
            .field("pool", &self.inner.pool)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl AdminClient {
    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> AdminClientBuilder {
        AdminClientBuilder::default()
    }

    pub(crate) fn from_parts(parts: ClientParts) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config: parts.config,
                service_url: parts.service_url,
                authentication: parts.authentication,
                pool: parts.pool,
                service: SyncService::new(parts.service),
                tasks: Mutex::new(parts.tasks),
                refresh: parts.refresh,
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// The configuration this client was built from.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Parsed control-plane base URL.
    #[must_use]
    pub fn service_url(&self) -> &Url {
        &self.inner.service_url
    }

    /// The resolved authentication provider.
    #[must_use]
    pub fn authentication(&self) -> &Arc<dyn Authentication> {
        &self.inner.authentication
    }

    /// The connection pool shared by every request of this client.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Current pool content.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Counters of the background certificate refresh.
    #[must_use]
    pub fn refresh_stats(&self) -> RefreshStats {
        self.inner.refresh.snapshot()
    }

    /// Start a request to `path`, relative to the service URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let base = self.inner.service_url.as_str().trim_end_matches('/');
        let url = Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))?;
        Ok(Request::builder(method, url))
    }

    /// Send a request through the middleware stack and the pooled transport.
    ///
    /// Any HTTP status is returned as a [`Response`]; errors are transport
    /// failures.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        if self.is_shutdown() {
            return Err(Error::PoolClosed);
        }
        self.inner.service.call(request).await
    }

    /// Abort the background tasks and close the pool. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Returns `true` once [`AdminClient::shutdown`] has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

impl Service<Request> for AdminClient {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await })
    }
}
