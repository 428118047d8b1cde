//! Response decompression middleware.
//!
//! Adds `Accept-Encoding: gzip` to requests and decodes responses whose
//! `Content-Encoding` is gzip. Other encodings are passed through unchanged.

use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::{Error, Request, Response, Result};

const ACCEPT_ENCODING: &str = "Accept-Encoding";

/// Layer that enables gzip response decompression.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecompressionLayer {
    _private: (),
}

impl DecompressionLayer {
    /// Create a new decompression layer.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl<S> Layer<S> for DecompressionLayer {
    type Service = Decompression<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Decompression { inner }
    }
}

/// Service that decompresses gzip HTTP responses.
#[derive(Debug, Clone)]
pub struct Decompression<S> {
    inner: S,
}

fn gunzip(body: &Bytes) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::Decompression(format!("gzip: {e}")))?;
    Ok(Bytes::from(decompressed))
}

impl<S> Service<Request> for Decompression<S>
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
        if !request
            .headers()
            .keys()
            .any(|name| name.eq_ignore_ascii_case(ACCEPT_ENCODING))
        {
            request
                .headers_mut()
                .insert(ACCEPT_ENCODING.to_string(), "gzip".to_string());
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.call(request).await?;

            let is_gzip = response
                .header("content-encoding")
                .is_some_and(|encoding| {
                    encoding.eq_ignore_ascii_case("gzip") || encoding.eq_ignore_ascii_case("x-gzip")
                });
            if !is_gzip {
                return Ok(response);
            }

            let decompressed = gunzip(response.body())?;
            let mut headers = response.headers().clone();
            headers.remove("content-encoding");
            headers.insert("content-length".to_string(), decompressed.len().to_string());
            Ok(Response::new(response.status(), headers, decompressed))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use assert2::{check, let_assert};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tower::ServiceExt;

    use super::*;
    use crate::Method;

    fn gzip(data: &[u8]) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).expect("write");
        Bytes::from(encoder.finish().expect("finish"))
    }

    fn request() -> Request {
        let url = url::Url::parse("http://broker:8080/admin/v2/clusters").expect("url");
        Request::builder(Method::GET, url).build()
    }

    fn respond_with(
        encoding: Option<&'static str>,
        body: Bytes,
    ) -> impl Service<
        Request,
        Response = Response,
        Error = Error,
        Future = std::future::Ready<Result<Response>>,
    > + Clone {
        tower::service_fn(move |request: Request| {
            let mut headers = HashMap::new();
            if let Some(encoding) = encoding {
                headers.insert("Content-Encoding".to_string(), encoding.to_string());
            }
            if let Some(accept) = request.header(ACCEPT_ENCODING) {
                headers.insert("x-seen-accept-encoding".to_string(), accept.to_string());
            }
            std::future::ready(Ok(Response::new(200, headers, body.clone())))
        })
    }

    #[tokio::test]
    async fn decodes_gzip_bodies() {
        let service =
            DecompressionLayer::new().layer(respond_with(Some("gzip"), gzip(b"[\"standalone\"]")));
        let response = service.oneshot(request()).await.expect("response");

        check!(response.body().as_ref() == b"[\"standalone\"]");
        check!(response.header("content-encoding").is_none());
        check!(response.header("content-length") == Some("14"));
        check!(response.header("x-seen-accept-encoding") == Some("gzip"));
    }

    #[tokio::test]
    async fn identity_passes_through() {
        let service = DecompressionLayer::new().layer(respond_with(None, Bytes::from("plain")));
        let response = service.oneshot(request()).await.expect("response");
        check!(response.body().as_ref() == b"plain");
    }

    #[tokio::test]
    async fn keeps_caller_accept_encoding() {
        let service = DecompressionLayer::new().layer(respond_with(None, Bytes::new()));
        let mut request = request();
        request
            .headers_mut()
            .insert("accept-encoding".to_string(), "identity".to_string());
        let response = service.oneshot(request).await.expect("response");
        check!(response.header("x-seen-accept-encoding").is_none());
    }

    #[tokio::test]
    async fn corrupt_gzip_is_an_error() {
        let service =
            DecompressionLayer::new().layer(respond_with(Some("gzip"), Bytes::from("nope")));
        let_assert!(Err(Error::Decompression(_)) = service.oneshot(request()).await);
    }
}
