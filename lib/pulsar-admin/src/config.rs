//! Client configuration types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::Authentication;
use crate::pool::ConnectionPolicy;
use crate::tls::TlsConfig;

/// Option names recognized by `AdminClientBuilder::load_conf`.
pub mod keys {
    /// Control-plane base URL.
    pub const SERVICE_HTTP_URL: &str = "serviceHttpUrl";
    /// Authentication plugin identifier.
    pub const AUTH_PLUGIN_CLASS_NAME: &str = "authPluginClassName";
    /// Authentication plugin params, string or map.
    pub const AUTH_PARAMS: &str = "authParams";
    /// PEM private key.
    pub const TLS_KEY_FILE_PATH: &str = "tlsKeyFilePath";
    /// PEM certificate chain.
    pub const TLS_CERTIFICATE_FILE_PATH: &str = "tlsCertificateFilePath";
    /// PEM trusted certificates.
    pub const TLS_TRUST_CERTS_FILE_PATH: &str = "tlsTrustCertsFilePath";
    /// Select KeyStore-style material.
    pub const USE_KEY_STORE_TLS: &str = "useKeyStoreTls";
    /// Key store container type.
    pub const TLS_KEY_STORE_TYPE: &str = "tlsKeyStoreType";
    /// Key store path.
    pub const TLS_KEY_STORE_PATH: &str = "tlsKeyStorePath";
    /// Key store password.
    pub const TLS_KEY_STORE_PASSWORD: &str = "tlsKeyStorePassword";
    /// Trust store container type.
    pub const TLS_TRUST_STORE_TYPE: &str = "tlsTrustStoreType";
    /// Trust store path.
    pub const TLS_TRUST_STORE_PATH: &str = "tlsTrustStorePath";
    /// Trust store password.
    pub const TLS_TRUST_STORE_PASSWORD: &str = "tlsTrustStorePassword";
    /// Accept untrusted server certificates.
    pub const ALLOW_TLS_INSECURE_CONNECTION: &str = "allowTlsInsecureConnection";
    /// Check the server hostname against its certificate.
    pub const ENABLE_TLS_HOSTNAME_VERIFICATION: &str = "enableTlsHostnameVerification";
    /// Allowed cipher suites.
    pub const TLS_CIPHERS: &str = "tlsCiphers";
    /// Allowed protocol versions.
    pub const TLS_PROTOCOLS: &str = "tlsProtocols";
    /// Custom TLS factory plugin.
    pub const SSL_FACTORY_PLUGIN: &str = "sslFactoryPlugin";
    /// Custom TLS factory params.
    pub const SSL_FACTORY_PLUGIN_PARAMS: &str = "sslFactoryPluginParams";
    /// Crypto provider name.
    pub const SSL_PROVIDER: &str = "sslProvider";
    /// Connect timeout.
    pub const CONNECTION_TIMEOUT: &str = "connectionTimeout";
    /// Read timeout.
    pub const READ_TIMEOUT: &str = "readTimeout";
    /// Request timeout.
    pub const REQUEST_TIMEOUT: &str = "requestTimeout";
    /// Certificate refresh interval.
    pub const AUTO_CERT_REFRESH_TIME: &str = "autoCertRefreshTime";
    /// Send `Accept-Encoding: gzip`.
    pub const ACCEPT_GZIP_COMPRESSION: &str = "acceptGzipCompression";
    /// Per-host connection cap.
    pub const MAX_CONNECTIONS_PER_HOST: &str = "maxConnectionsPerHost";
    /// Idle eviction delay, in seconds.
    pub const CONNECTION_MAX_IDLE_SECONDS: &str = "connectionMaxIdleSeconds";
}

/// How the client authenticates. Exactly one form is active.
#[derive(Clone, Default)]
pub enum AuthenticationConfig {
    /// No credentials.
    #[default]
    None,
    /// Plugin resolved by name with a `key:value,...` param string.
    PluginWithParamString {
        /// Plugin identifier.
        plugin: String,
        /// Raw param string.
        params: String,
    },
    /// Plugin resolved by name with a param map.
    PluginWithParamMap {
        /// Plugin identifier.
        plugin: String,
        /// Params.
        params: BTreeMap<String, String>,
    },
    /// Provider supplied directly.
    Instance(Arc<dyn Authentication>),
}

impl AuthenticationConfig {
    /// Configured plugin identifier, if resolved by name.
    #[must_use]
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::PluginWithParamString { plugin, .. } | Self::PluginWithParamMap { plugin, .. } => {
                Some(plugin)
            }
            Self::None | Self::Instance(_) => None,
        }
    }
}

impl PartialEq for AuthenticationConfig {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (
                Self::PluginWithParamString { plugin, params },
                Self::PluginWithParamString {
                    plugin: other_plugin,
                    params: other_params,
                },
            ) => plugin == other_plugin && params == other_params,
            (
                Self::PluginWithParamMap { plugin, params },
                Self::PluginWithParamMap {
                    plugin: other_plugin,
                    params: other_params,
                },
            ) => plugin == other_plugin && params == other_params,
            (Self::Instance(auth), Self::Instance(other_auth)) => Arc::ptr_eq(auth, other_auth),
            _ => false,
        }
    }
}

// Params routinely carry secrets: only their keys are printed.
impl fmt::Debug for AuthenticationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::PluginWithParamString { plugin, .. } => f
                .debug_struct("PluginWithParamString")
                .field("plugin", plugin)
                .finish_non_exhaustive(),
            Self::PluginWithParamMap { plugin, params } => f
                .debug_struct("PluginWithParamMap")
                .field("plugin", plugin)
                .field("params", &params.keys().collect::<Vec<_>>())
                .finish(),
            Self::Instance(auth) => f
                .debug_tuple("Instance")
                .field(&auth.auth_method_name())
                .finish(),
        }
    }
}

/// Effective configuration of an admin client.
///
/// Accumulated by `AdminClientBuilder` and frozen into the client by `build()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Control-plane base URL.
    pub service_http_url: String,
    /// Authentication form.
    pub authentication: AuthenticationConfig,
    /// TLS material and policy, used with `https` URLs.
    pub tls: TlsConfig,
    /// Pool sizing and timeouts.
    pub pool: ConnectionPolicy,
    /// Send `Accept-Encoding: gzip` and decode gzip responses.
    pub accept_gzip_compression: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_http_url: String::new(),
            authentication: AuthenticationConfig::None,
            tls: TlsConfig::default(),
            pool: ConnectionPolicy::default(),
            accept_gzip_compression: true,
        }
    }
}
