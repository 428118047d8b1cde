//! HTTPS connector and reloadable TLS material.
//!
//! File-based material lives behind an [`ArcSwap`]: the rustls config keeps a
//! custom verifier and client cert resolver that read the current snapshot on
//! every handshake, so a refresh never rebuilds the HTTP client.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{ResolvesClientCert, WebPkiServerVerifier, verify_server_name};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::sign::CertifiedKey;
use rustls::version::{TLS12, TLS13};
use rustls::{
    CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme,
    SupportedProtocolVersion,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::plugin::SslFactory;
use crate::pool::ConnectionPolicy;
use crate::tls::{MaterialPaths, MaterialSource, TlsConfig};
use crate::{Error, PluginRegistry};

/// Counters of the background certificate refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Successful reloads.
    pub refreshed: u64,
    /// Failed reloads; the previous material stayed active.
    pub failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct RefreshCounters {
    refreshed: AtomicU64,
    failed: AtomicU64,
}

impl RefreshCounters {
    pub fn snapshot(&self) -> RefreshStats {
        RefreshStats {
            refreshed: self.refreshed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Crypto provider restricted to the configured cipher suites.
pub(crate) fn crypto_provider(tls: &TlsConfig) -> crate::Result<Arc<CryptoProvider>> {
    let mut provider = ring::default_provider();
    if !tls.ciphers.is_empty() {
        provider
            .cipher_suites
            .retain(|suite| cipher_allowed(&tls.ciphers, &format!("{:?}", suite.suite())));
        if provider.cipher_suites.is_empty() {
            return Err(Error::configuration(format!(
                "none of the tlsCiphers {:?} is supported",
                tls.ciphers
            )));
        }
    }
    Ok(Arc::new(provider))
}

// TLS 1.3 suites are listed as `TLS13_AES_128_GCM_SHA256` by rustls and as
// `TLS_AES_128_GCM_SHA256` by IANA.
fn cipher_allowed(allowed: &std::collections::BTreeSet<String>, name: &str) -> bool {
    allowed.iter().any(|cipher| {
        cipher.eq_ignore_ascii_case(name)
            || name
                .strip_prefix("TLS13_")
                .is_some_and(|rest| cipher.eq_ignore_ascii_case(&format!("TLS_{rest}")))
    })
}

/// Protocol versions enabled by `tlsProtocols`.
pub(crate) fn protocol_versions(
    tls: &TlsConfig,
) -> crate::Result<Vec<&'static SupportedProtocolVersion>> {
    if tls.protocols.is_empty() {
        return Ok(rustls::DEFAULT_VERSIONS.to_vec());
    }
    tls.protocols
        .iter()
        .map(|protocol| match protocol.to_ascii_uppercase().as_str() {
            "TLSV1.2" | "TLS1.2" => Ok(&TLS12),
            "TLSV1.3" | "TLS1.3" => Ok(&TLS13),
            _ => Err(Error::configuration(format!(
                "tlsProtocols '{protocol}' is not supported, expected TLSv1.2 or TLSv1.3"
            ))),
        })
        .collect()
}

fn read_certs(path: &Path) -> crate::Result<Vec<CertificateDer<'static>>> {
    let tls_error = |message: String| Error::tls_material(path.display().to_string(), message);
    let file = File::open(path).map_err(|e| tls_error(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| tls_error(e.to_string()))?;
    if certs.is_empty() {
        return Err(tls_error("no PEM certificate found".to_string()));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> crate::Result<PrivateKeyDer<'static>> {
    let tls_error = |message: String| Error::tls_material(path.display().to_string(), message);
    let file = File::open(path).map_err(|e| tls_error(e.to_string()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| tls_error(e.to_string()))?
        .ok_or_else(|| tls_error("no PEM private key found".to_string()))
}

/// Parsed trust anchors and client identity.
struct TlsMaterial {
    verifier: std::result::Result<Arc<WebPkiServerVerifier>, String>,
    identity: Option<Arc<CertifiedKey>>,
}

impl TlsMaterial {
    fn load(paths: &MaterialPaths, provider: &Arc<CryptoProvider>) -> crate::Result<Self> {
        let roots = match &paths.trust {
            Some(path) => {
                let mut roots = RootCertStore::empty();
                let (added, ignored) = roots.add_parsable_certificates(read_certs(path)?);
                if added == 0 {
                    return Err(Error::tls_material(
                        path.display().to_string(),
                        "no usable trust certificate",
                    ));
                }
                if ignored > 0 {
                    debug!(path = %path.display(), ignored, "skipped unparsable trust certificates");
                }
                roots
            }
            None => webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect(),
        };
        let verifier =
            WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(provider))
                .build()
                .map_err(|e| Error::tls(e.to_string()))?;

        let identity = match &paths.identity {
            Some(identity) => {
                let chain = read_certs(&identity.cert)?;
                let key = read_private_key(&identity.key)?;
                let signing_key = provider.key_provider.load_private_key(key).map_err(|e| {
                    Error::tls_material(identity.key.display().to_string(), e.to_string())
                })?;
                Some(Arc::new(CertifiedKey::new(chain, signing_key)))
            }
            None => None,
        };

        Ok(Self {
            verifier: Ok(verifier),
            identity,
        })
    }

    fn unavailable(reason: String) -> Self {
        Self {
            verifier: Err(reason),
            identity: None,
        }
    }
}

/// File-based TLS material, swapped atomically on reload.
pub(crate) struct ReloadableTls {
    paths: MaterialPaths,
    provider: Arc<CryptoProvider>,
    allow_insecure: bool,
    verify_hostname: bool,
    material: ArcSwap<TlsMaterial>,
}

impl fmt::Debug for ReloadableTls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadableTls")
            .field("paths", &self.paths)
            .field("allow_insecure", &self.allow_insecure)
            .field("verify_hostname", &self.verify_hostname)
            .field("available", &self.material.load().verifier.is_ok())
            .finish_non_exhaustive()
    }
}

impl ReloadableTls {
    /// Load the material once. Unparsable content leaves the material
    /// unavailable: handshakes fail until a refresh succeeds.
    pub fn new(tls: &TlsConfig, paths: MaterialPaths, provider: Arc<CryptoProvider>) -> Self {
        let material = TlsMaterial::load(&paths, &provider).unwrap_or_else(|err| {
            warn!(error = %err, "TLS material could not be loaded, handshakes will fail until it is refreshed");
            TlsMaterial::unavailable(err.to_string())
        });
        Self {
            paths,
            provider,
            allow_insecure: tls.allow_insecure_connection,
            verify_hostname: tls.enable_hostname_verification,
            material: ArcSwap::from_pointee(material),
        }
    }

    fn has_files(&self) -> bool {
        !self.paths.is_empty()
    }

    /// Re-read every file; the current material stays active on failure.
    pub fn reload(&self) -> crate::Result<()> {
        let material = TlsMaterial::load(&self.paths, &self.provider)
            .map_err(|err| Error::RefreshFailed(err.to_string()))?;
        self.material.store(Arc::new(material));
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.material.load().verifier.is_ok()
    }
}

impl ServerCertVerifier for ReloadableTls {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if self.allow_insecure {
            if self.verify_hostname {
                let cert = ParsedCertificate::try_from(end_entity)?;
                verify_server_name(&cert, server_name)?;
            }
            return Ok(ServerCertVerified::assertion());
        }
        let material = self.material.load();
        let verifier = material.verifier.as_ref().map_err(|reason| {
            rustls::Error::General(format!("trust material unavailable: {reason}"))
        })?;
        match verifier.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) if !self.verify_hostname => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

impl ResolvesClientCert for ReloadableTls {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        self.material.load().identity.clone()
    }

    fn has_certs(&self) -> bool {
        self.paths.identity.is_some()
    }
}

/// Reloads TLS material in the background.
#[derive(Debug, Clone)]
pub(crate) enum CertRefresher {
    Files(Arc<ReloadableTls>),
    Factory(Arc<dyn SslFactory>),
}

impl CertRefresher {
    fn refresh(&self) -> crate::Result<()> {
        match self {
            Self::Files(tls) => tls.reload(),
            Self::Factory(factory) => factory
                .refresh()
                .map_err(|err| Error::RefreshFailed(err.to_string())),
        }
    }

    /// Start the periodic refresh. The first reload happens one interval
    /// after start.
    pub fn spawn(
        self,
        interval: Duration,
        runtime: &tokio::runtime::Handle,
        counters: Arc<RefreshCounters>,
    ) -> JoinHandle<()> {
        runtime.spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let refresher = self.clone();
                let outcome = tokio::task::spawn_blocking(move || refresher.refresh())
                    .await
                    .unwrap_or_else(|err| Err(Error::RefreshFailed(err.to_string())));
                match outcome {
                    Ok(()) => {
                        counters.refreshed.fetch_add(1, Ordering::Relaxed);
                        debug!("TLS material refreshed");
                    }
                    Err(err) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %err, "TLS material refresh failed, keeping previous material");
                    }
                }
            }
        })
    }
}

/// Result of the TLS stage of `build()`.
#[derive(Debug)]
pub(crate) struct TlsSetup {
    pub client_config: rustls::ClientConfig,
    pub refresher: Option<CertRefresher>,
}

/// Validate the TLS section and build the rustls client config.
pub(crate) fn prepare_tls(tls: &TlsConfig, registry: &PluginRegistry) -> crate::Result<TlsSetup> {
    let source = tls.validate(registry)?;
    let provider = crypto_provider(tls)?;

    match source {
        MaterialSource::Factory(factory) => {
            let client_config = factory.client_config(provider)?;
            let refresher = factory
                .needs_refresh()
                .then(|| CertRefresher::Factory(factory));
            Ok(TlsSetup {
                client_config,
                refresher,
            })
        }
        MaterialSource::Files(paths) => {
            let versions = protocol_versions(tls)?;
            let reloadable = Arc::new(ReloadableTls::new(tls, paths, Arc::clone(&provider)));
            if reloadable.is_available() {
                info!(
                    insecure = tls.allow_insecure_connection,
                    hostname_verification = tls.enable_hostname_verification,
                    "TLS material loaded"
                );
            }
            let client_config = rustls::ClientConfig::builder_with_provider(provider)
                .with_protocol_versions(&versions)
                .map_err(|e| Error::configuration(format!("TLS protocol selection: {e}")))?
                .dangerous()
                .with_custom_certificate_verifier(Arc::clone(&reloadable) as _)
                .with_client_cert_resolver(Arc::clone(&reloadable) as _);
            let refresher = reloadable
                .has_files()
                .then(|| CertRefresher::Files(reloadable));
            Ok(TlsSetup {
                client_config,
                refresher,
            })
        }
    }
}

/// rustls config for plain `http` service URLs, never used for a handshake.
pub(crate) fn plaintext_tls_config() -> crate::Result<rustls::ClientConfig> {
    let root_store: RootCertStore = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::configuration(e.to_string()))?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}

/// Create an HTTP/HTTPS connector with the given rustls config.
///
/// Supports both HTTP/1.1 and HTTP/2.
#[must_use]
pub(crate) fn https_connector(
    tls_config: rustls::ClientConfig,
    policy: &ConnectionPolicy,
) -> HttpsConnector<HttpConnector> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    if !policy.connect_timeout.is_zero() {
        http.set_connect_timeout(Some(policy.connect_timeout));
    }

    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http)
}
