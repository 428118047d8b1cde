//! Authentication middleware.
//!
//! Asks the configured [`Authentication`] provider for its headers on every
//! request, so refreshed credentials are picked up without rebuilding the client.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::{Authentication, Error, Request, Response, Result};

/// Layer that adds authentication headers to requests.
#[derive(Clone)]
pub struct AuthLayer {
    provider: Arc<dyn Authentication>,
}

impl fmt::Debug for AuthLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthLayer")
            .field("method", &self.provider.auth_method_name())
            .finish()
    }
}

impl AuthLayer {
    /// Create a layer for the given provider.
    #[must_use]
    pub fn new(provider: Arc<dyn Authentication>) -> Self {
        Self { provider }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = Auth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Auth {
            inner,
            provider: Arc::clone(&self.provider),
        }
    }
}

/// Service that adds authentication headers to requests.
#[derive(Clone)]
pub struct Auth<S> {
    inner: S,
    provider: Arc<dyn Authentication>,
}

impl<S: fmt::Debug> fmt::Debug for Auth<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("inner", &self.inner)
            .field("method", &self.provider.auth_method_name())
            .finish()
    }
}

impl<S> Service<Request> for Auth<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let data = match self.provider.auth_data() {
            Ok(data) => data,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        for (name, value) in data.headers() {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{AuthenticationBasic, AuthenticationDisabled};
    use crate::{AuthData, Method};

    fn echo_headers() -> impl Service<
        Request,
        Response = Response,
        Error = Error,
        Future = std::future::Ready<Result<Response>>,
    > + Clone {
        tower::service_fn(|request: Request| {
            std::future::ready(Ok(Response::new(
                200,
                request.headers().clone(),
                bytes::Bytes::new(),
            )))
        })
    }

    fn request() -> Request {
        let url = url::Url::parse("http://broker:8080/admin/v2/clusters").expect("url");
        Request::builder(Method::GET, url).build()
    }

    #[tokio::test]
    async fn adds_provider_headers() {
        let provider = Arc::new(AuthenticationBasic::new("user", "pass"));
        let service = AuthLayer::new(provider).layer(echo_headers());

        let response = service.oneshot(request()).await.expect("response");
        check!(response.header("authorization") == Some("Basic dXNlcjpwYXNz"));
    }

    #[tokio::test]
    async fn disabled_adds_nothing() {
        let service = AuthLayer::new(Arc::new(AuthenticationDisabled)).layer(echo_headers());
        let response = service.oneshot(request()).await.expect("response");
        check!(response.headers().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_fails_the_request() {
        #[derive(Debug)]
        struct Expired;

        impl Authentication for Expired {
            fn auth_method_name(&self) -> &str {
                "expired"
            }

            fn auth_data(&self) -> Result<AuthData> {
                Err(Error::configuration("credentials expired"))
            }
        }

        let service = AuthLayer::new(Arc::new(Expired)).layer(echo_headers());
        let_assert!(Err(Error::Configuration(message)) = service.oneshot(request()).await);
        check!(message == "credentials expired");
    }
}
