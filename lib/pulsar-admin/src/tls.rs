//! TLS configuration and build-time validation.
//!
//! Three mutually exclusive ways to supply trust and identity material:
//!
//! - a custom [`SslFactory`](crate::SslFactory) plugin, which takes precedence;
//! - KeyStore-style stores, when `use_key_store_tls` is set;
//! - PEM files otherwise.
//!
//! Validation only checks that referenced files exist. Their content is
//! parsed when the connector is built and again on every certificate
//! refresh; unparsable content surfaces as a handshake failure.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::plugin::{PluginRegistry, SslFactory};
use crate::{Error, Result};

/// Default interval between certificate refreshes.
pub const DEFAULT_AUTO_CERT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Store container type loaded by this crate: PEM certificates and key in one file.
pub const PEM_STORE_TYPE: &str = "PEM";

/// Crypto provider compiled into this crate.
pub const RING_PROVIDER: &str = "ring";

/// TLS material and policy.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Accept server certificates without validating them.
    pub allow_insecure_connection: bool,
    /// Check the server hostname against its certificate.
    ///
    /// Defaults to `false`.
    pub enable_hostname_verification: bool,
    /// Use KeyStore-style material instead of PEM files.
    pub use_key_store_tls: bool,
    /// PEM private key of the client identity.
    pub key_file_path: Option<PathBuf>,
    /// PEM certificate chain of the client identity.
    pub certificate_file_path: Option<PathBuf>,
    /// PEM trusted certificates; system roots when unset.
    pub trust_certs_file_path: Option<PathBuf>,
    /// Key store container type.
    pub key_store_type: String,
    /// Key store holding the client identity.
    pub key_store_path: Option<PathBuf>,
    /// Key store password.
    pub key_store_password: Option<String>,
    /// Trust store container type.
    pub trust_store_type: String,
    /// Trust store holding the trusted certificates.
    pub trust_store_path: Option<PathBuf>,
    /// Trust store password.
    pub trust_store_password: Option<String>,
    /// Allowed cipher suites; empty means provider defaults.
    pub ciphers: BTreeSet<String>,
    /// Allowed protocol versions; empty means provider defaults.
    pub protocols: BTreeSet<String>,
    /// Custom TLS factory plugin.
    pub ssl_factory_plugin: Option<String>,
    /// Params handed to the TLS factory plugin.
    pub ssl_factory_plugin_params: String,
    /// Crypto provider name.
    pub ssl_provider: Option<String>,
    /// Interval between certificate refreshes; zero disables refresh.
    pub auto_cert_refresh_interval: Duration,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            allow_insecure_connection: false,
            enable_hostname_verification: false,
            use_key_store_tls: false,
            key_file_path: None,
            certificate_file_path: None,
            trust_certs_file_path: None,
            key_store_type: PEM_STORE_TYPE.to_string(),
            key_store_path: None,
            key_store_password: None,
            trust_store_type: PEM_STORE_TYPE.to_string(),
            trust_store_path: None,
            trust_store_password: None,
            ciphers: BTreeSet::new(),
            protocols: BTreeSet::new(),
            ssl_factory_plugin: None,
            ssl_factory_plugin_params: String::new(),
            ssl_provider: None,
            auto_cert_refresh_interval: DEFAULT_AUTO_CERT_REFRESH_INTERVAL,
        }
    }
}

fn redacted(password: Option<&String>) -> Option<&'static str> {
    password.map(|_| "***")
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("allow_insecure_connection", &self.allow_insecure_connection)
            .field(
                "enable_hostname_verification",
                &self.enable_hostname_verification,
            )
            .field("use_key_store_tls", &self.use_key_store_tls)
            .field("key_file_path", &self.key_file_path)
            .field("certificate_file_path", &self.certificate_file_path)
            .field("trust_certs_file_path", &self.trust_certs_file_path)
            .field("key_store_type", &self.key_store_type)
            .field("key_store_path", &self.key_store_path)
            .field(
                "key_store_password",
                &redacted(self.key_store_password.as_ref()),
            )
            .field("trust_store_type", &self.trust_store_type)
            .field("trust_store_path", &self.trust_store_path)
            .field(
                "trust_store_password",
                &redacted(self.trust_store_password.as_ref()),
            )
            .field("ciphers", &self.ciphers)
            .field("protocols", &self.protocols)
            .field("ssl_factory_plugin", &self.ssl_factory_plugin)
            .field("ssl_provider", &self.ssl_provider)
            .field(
                "auto_cert_refresh_interval",
                &self.auto_cert_refresh_interval,
            )
            .finish_non_exhaustive()
    }
}

/// Files holding a client identity: certificate chain and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IdentityPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// File-based material selected by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MaterialPaths {
    pub identity: Option<IdentityPaths>,
    pub trust: Option<PathBuf>,
}

impl MaterialPaths {
    pub fn is_empty(&self) -> bool {
        self.identity.is_none() && self.trust.is_none()
    }
}

/// Where the TLS material comes from, once validated.
#[derive(Debug)]
pub(crate) enum MaterialSource {
    Files(MaterialPaths),
    Factory(Arc<dyn SslFactory>),
}

impl TlsConfig {
    fn has_pem_fields(&self) -> bool {
        self.key_file_path.is_some()
            || self.certificate_file_path.is_some()
            || self.trust_certs_file_path.is_some()
    }

    fn has_key_store_fields(&self) -> bool {
        self.key_store_path.is_some() || self.trust_store_path.is_some()
    }

    /// Returns `true` if any TLS-specific field differs from its default.
    pub(crate) fn is_customized(&self) -> bool {
        self != &Self::default()
    }

    /// Cross-field validation run by `build()` for `https` service URLs.
    pub(crate) fn validate(&self, registry: &PluginRegistry) -> Result<MaterialSource> {
        if let Some(provider) = &self.ssl_provider
            && !provider.eq_ignore_ascii_case(RING_PROVIDER)
        {
            return Err(Error::configuration(format!(
                "sslProvider '{provider}' is not available, only '{RING_PROVIDER}' is supported"
            )));
        }

        if self.allow_insecure_connection && self.enable_hostname_verification {
            warn!(
                "allowTlsInsecureConnection is enabled: server certificates are not validated, \
                 hostname verification alone does not authenticate the server"
            );
        }

        if let Some(plugin) = &self.ssl_factory_plugin {
            if self.has_pem_fields() || self.has_key_store_fields() {
                debug!(plugin, "TLS factory plugin set, PEM and key store fields ignored");
            }
            let factory = registry.resolve_ssl_factory(plugin, &self.ssl_factory_plugin_params)?;
            return Ok(MaterialSource::Factory(factory));
        }

        if self.use_key_store_tls {
            if self.has_pem_fields() {
                warn!("useKeyStoreTls is enabled, tlsKeyFilePath/tlsCertificateFilePath/tlsTrustCertsFilePath are ignored");
            }
            self.validate_key_store().map(MaterialSource::Files)
        } else {
            if self.has_key_store_fields() {
                warn!("useKeyStoreTls is disabled, tlsKeyStorePath/tlsTrustStorePath are ignored");
            }
            self.validate_pem().map(MaterialSource::Files)
        }
    }

    fn validate_key_store(&self) -> Result<MaterialPaths> {
        let Some(trust_store) = &self.trust_store_path else {
            return Err(Error::configuration(
                "useKeyStoreTls requires tlsTrustStorePath",
            ));
        };
        for (option, store_type) in [
            ("tlsKeyStoreType", &self.key_store_type),
            ("tlsTrustStoreType", &self.trust_store_type),
        ] {
            if !store_type.eq_ignore_ascii_case(PEM_STORE_TYPE) {
                return Err(Error::configuration(format!(
                    "{option} '{store_type}' is not supported, only '{PEM_STORE_TYPE}' stores can be loaded"
                )));
            }
        }
        if self.key_store_password.is_some() || self.trust_store_password.is_some() {
            debug!("PEM stores are not encrypted, store passwords are not used");
        }

        require_file(trust_store)?;
        let identity = match &self.key_store_path {
            Some(key_store) => {
                require_file(key_store)?;
                Some(IdentityPaths {
                    cert: key_store.clone(),
                    key: key_store.clone(),
                })
            }
            None => None,
        };
        Ok(MaterialPaths {
            identity,
            trust: Some(trust_store.clone()),
        })
    }

    fn validate_pem(&self) -> Result<MaterialPaths> {
        let identity = match (&self.certificate_file_path, &self.key_file_path) {
            (Some(cert), Some(key)) => {
                require_file(cert)?;
                require_file(key)?;
                Some(IdentityPaths {
                    cert: cert.clone(),
                    key: key.clone(),
                })
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(Error::configuration(
                    "tlsCertificateFilePath is set without tlsKeyFilePath",
                ));
            }
            (None, Some(_)) => {
                return Err(Error::configuration(
                    "tlsKeyFilePath is set without tlsCertificateFilePath",
                ));
            }
        };
        if let Some(trust) = &self.trust_certs_file_path {
            require_file(trust)?;
        }
        Ok(MaterialPaths {
            identity,
            trust: self.trust_certs_file_path.clone(),
        })
    }
}

fn require_file(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(Error::tls_material(
            path.display().to_string(),
            "not a regular file",
        )),
        Err(e) => Err(Error::tls_material(path.display().to_string(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    fn registry() -> PluginRegistry {
        PluginRegistry::with_builtins()
    }

    fn temp_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().expect("temp file")
    }

    #[test]
    fn defaults() {
        let tls = TlsConfig::default();
        check!(!tls.allow_insecure_connection);
        // policy choice kept from the Java admin client, worth re-confirming
        check!(!tls.enable_hostname_verification);
        check!(tls.auto_cert_refresh_interval == Duration::from_secs(300));
        check!(!tls.is_customized());
    }

    #[test]
    fn no_material_uses_system_roots() {
        let_assert!(Ok(MaterialSource::Files(paths)) = TlsConfig::default().validate(&registry()));
        check!(paths.is_empty());
    }

    #[test]
    fn missing_trust_file_is_tls_material_error() {
        let tls = TlsConfig {
            trust_certs_file_path: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..TlsConfig::default()
        };
        let_assert!(Err(Error::TlsMaterial { path, .. }) = tls.validate(&registry()));
        check!(path == "/nonexistent/ca.pem");
    }

    #[test]
    fn directory_is_not_usable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let tls = TlsConfig {
            trust_certs_file_path: Some(dir.path().to_path_buf()),
            ..TlsConfig::default()
        };
        let_assert!(Err(Error::TlsMaterial { message, .. }) = tls.validate(&registry()));
        check!(message == "not a regular file");
    }

    #[test]
    fn pem_identity_requires_both_files() {
        let cert = temp_file();
        let tls = TlsConfig {
            certificate_file_path: Some(cert.path().to_path_buf()),
            ..TlsConfig::default()
        };
        let_assert!(Err(Error::Configuration(_)) = tls.validate(&registry()));
    }

    #[test]
    fn pem_files_are_selected() {
        let (cert, key, ca) = (temp_file(), temp_file(), temp_file());
        let tls = TlsConfig {
            certificate_file_path: Some(cert.path().to_path_buf()),
            key_file_path: Some(key.path().to_path_buf()),
            trust_certs_file_path: Some(ca.path().to_path_buf()),
            ..TlsConfig::default()
        };
        let_assert!(Ok(MaterialSource::Files(paths)) = tls.validate(&registry()));
        check!(paths.trust.as_deref() == Some(ca.path()));
        let_assert!(Some(identity) = paths.identity);
        check!(identity.cert == cert.path());
        check!(identity.key == key.path());
    }

    #[test]
    fn key_store_requires_trust_store() {
        let tls = TlsConfig {
            use_key_store_tls: true,
            ..TlsConfig::default()
        };
        let_assert!(Err(Error::Configuration(message)) = tls.validate(&registry()));
        check!(message.contains("tlsTrustStorePath"));
    }

    #[test]
    fn key_store_type_must_be_loadable() {
        let store = temp_file();
        let tls = TlsConfig {
            use_key_store_tls: true,
            trust_store_path: Some(store.path().to_path_buf()),
            trust_store_type: "JKS".to_string(),
            ..TlsConfig::default()
        };
        let_assert!(Err(Error::Configuration(message)) = tls.validate(&registry()));
        check!(message.contains("JKS"));
    }

    #[test]
    fn key_store_paths_must_exist() {
        let trust = temp_file();
        let tls = TlsConfig {
            use_key_store_tls: true,
            trust_store_path: Some(trust.path().to_path_buf()),
            key_store_path: Some(PathBuf::from("/nonexistent/client.pem")),
            ..TlsConfig::default()
        };
        let_assert!(Err(Error::TlsMaterial { .. }) = tls.validate(&registry()));
    }

    #[test]
    fn inactive_style_is_not_validated() {
        let trust = temp_file();
        let tls = TlsConfig {
            use_key_store_tls: true,
            trust_store_path: Some(trust.path().to_path_buf()),
            trust_certs_file_path: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..TlsConfig::default()
        };
        let_assert!(Ok(MaterialSource::Files(paths)) = tls.validate(&registry()));
        check!(paths.trust.as_deref() == Some(trust.path()));
        check!(paths.identity.is_none());
    }

    #[test]
    fn factory_plugin_takes_precedence() {
        #[derive(Debug)]
        struct Static;

        impl SslFactory for Static {
            fn client_config(
                &self,
                _provider: Arc<rustls::crypto::CryptoProvider>,
            ) -> Result<rustls::ClientConfig> {
                Err(Error::configuration("unused"))
            }
        }

        let registry = registry().register_ssl_factory("static", |_| Ok(Arc::new(Static)));
        let tls = TlsConfig {
            ssl_factory_plugin: Some("static".to_string()),
            trust_certs_file_path: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..TlsConfig::default()
        };
        let_assert!(Ok(MaterialSource::Factory(_)) = tls.validate(&registry));
    }

    #[test]
    fn unknown_ssl_provider_is_rejected() {
        let tls = TlsConfig {
            ssl_provider: Some("OpenSSL".to_string()),
            ..TlsConfig::default()
        };
        let_assert!(Err(Error::Configuration(message)) = tls.validate(&registry()));
        check!(message.contains("OpenSSL"));

        let tls = TlsConfig {
            ssl_provider: Some("Ring".to_string()),
            ..TlsConfig::default()
        };
        check!(tls.validate(&registry()).is_ok());
    }

    #[test]
    fn insecure_with_hostname_verification_is_accepted() {
        let tls = TlsConfig {
            allow_insecure_connection: true,
            enable_hostname_verification: true,
            ..TlsConfig::default()
        };
        check!(tls.validate(&registry()).is_ok());
    }

    #[test]
    fn debug_hides_passwords() {
        let tls = TlsConfig {
            key_store_password: Some("changeit".to_string()),
            ..TlsConfig::default()
        };
        let debug = format!("{tls:?}");
        check!(!debug.contains("changeit"));
        check!(debug.contains("***"));
    }
}
