//! Fluent builder for [`AdminClient`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::client::{AdminClient, ClientParts, PooledTransport, service_stack};
use crate::config::{AuthenticationConfig, ClientConfig};
use crate::connector::{RefreshCounters, https_connector, plaintext_tls_config, prepare_tls};
use crate::plugin::PluginRegistry;
use crate::pool::ConnectionPool;
use crate::{Authentication, Error, Result};

fn optional_path(path: impl Into<PathBuf>) -> Option<PathBuf> {
    let path = path.into();
    (!path.as_os_str().is_empty()).then_some(path)
}

fn optional_string(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.is_empty()).then_some(value)
}

/// Builder for [`AdminClient`].
///
/// Setters never perform I/O; every check that needs the filesystem or the
/// plugin registry runs in [`AdminClientBuilder::build`]. Cloning yields an
/// independent builder.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use pulsar_admin::AdminClient;
///
/// let base = AdminClient::builder()
///     .authentication_with_params("token", "file:///etc/pulsar/token")
///     .request_timeout(Duration::from_secs(30));
///
/// let east = base.clone().service_http_url("https://east:8443").build()?;
/// let west = base.service_http_url("https://west:8443").build()?;
/// ```
#[derive(Debug, Clone)]
pub struct AdminClientBuilder {
    config: ClientConfig,
    registry: Arc<PluginRegistry>,
}

impl Default for AdminClientBuilder {
    fn default() -> Self {
        Self {
            config: ClientConfig::default(),
            registry: Arc::new(PluginRegistry::with_builtins()),
        }
    }
}

impl AdminClientBuilder {
    /// The configuration accumulated so far.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The registry used to resolve plugins.
    #[must_use]
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Set the registry used to resolve authentication and TLS factory plugins.
    #[must_use]
    pub fn plugin_registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.registry = registry;
        self
    }

    // ========================================================================
    // Service & authentication
    // ========================================================================

    /// Set the control-plane URL, e.g. `https://broker.example.com:8443`.
    #[must_use]
    pub fn service_http_url(mut self, url: impl Into<String>) -> Self {
        self.config.service_http_url = url.into();
        self
    }

    /// Authenticate with a plugin and a `key1:val1,key2:val2` param string.
    ///
    /// An empty plugin name disables authentication.
    #[must_use]
    pub fn authentication_with_params(
        mut self,
        plugin: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        self.config.authentication = match optional_string(plugin) {
            Some(plugin) => AuthenticationConfig::PluginWithParamString {
                plugin,
                params: params.into(),
            },
            None => AuthenticationConfig::None,
        };
        self
    }

    /// Authenticate with a plugin and a param map.
    ///
    /// An empty plugin name disables authentication.
    #[must_use]
    pub fn authentication_with_param_map<K, V>(
        mut self,
        plugin: impl Into<String>,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config.authentication = match optional_string(plugin) {
            Some(plugin) => AuthenticationConfig::PluginWithParamMap {
                plugin,
                params: params
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect::<BTreeMap<_, _>>(),
            },
            None => AuthenticationConfig::None,
        };
        self
    }

    /// Authenticate with an already constructed provider.
    #[must_use]
    pub fn authentication(mut self, provider: Arc<dyn Authentication>) -> Self {
        self.config.authentication = AuthenticationConfig::Instance(provider);
        self
    }

    // ========================================================================
    // TLS
    // ========================================================================

    /// PEM private key of the client identity.
    #[must_use]
    pub fn tls_key_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls.key_file_path = optional_path(path);
        self
    }

    /// PEM certificate chain of the client identity.
    #[must_use]
    pub fn tls_certificate_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls.certificate_file_path = optional_path(path);
        self
    }

    /// PEM trusted certificates.
    #[must_use]
    pub fn tls_trust_certs_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls.trust_certs_file_path = optional_path(path);
        self
    }

    /// Use KeyStore-style material instead of PEM files.
    #[must_use]
    pub fn use_key_store_tls(mut self, enabled: bool) -> Self {
        self.config.tls.use_key_store_tls = enabled;
        self
    }

    /// Key store container type.
    #[must_use]
    pub fn tls_key_store_type(mut self, store_type: impl Into<String>) -> Self {
        self.config.tls.key_store_type = store_type.into();
        self
    }

    /// Key store path.
    #[must_use]
    pub fn tls_key_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls.key_store_path = optional_path(path);
        self
    }

    /// Key store password.
    #[must_use]
    pub fn tls_key_store_password(mut self, password: impl Into<String>) -> Self {
        self.config.tls.key_store_password = optional_string(password);
        self
    }

    /// Trust store container type.
    #[must_use]
    pub fn tls_trust_store_type(mut self, store_type: impl Into<String>) -> Self {
        self.config.tls.trust_store_type = store_type.into();
        self
    }

    /// Trust store path.
    #[must_use]
    pub fn tls_trust_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls.trust_store_path = optional_path(path);
        self
    }

    /// Trust store password.
    #[must_use]
    pub fn tls_trust_store_password(mut self, password: impl Into<String>) -> Self {
        self.config.tls.trust_store_password = optional_string(password);
        self
    }

    /// Accept server certificates without validating them.
    #[must_use]
    pub fn allow_tls_insecure_connection(mut self, allowed: bool) -> Self {
        self.config.tls.allow_insecure_connection = allowed;
        self
    }

    /// Check the server hostname against its certificate.
    #[must_use]
    pub fn enable_tls_hostname_verification(mut self, enabled: bool) -> Self {
        self.config.tls.enable_hostname_verification = enabled;
        self
    }

    /// Restrict the cipher suites; an empty set restores the defaults.
    #[must_use]
    pub fn tls_ciphers<S: Into<String>>(mut self, ciphers: impl IntoIterator<Item = S>) -> Self {
        self.config.tls.ciphers = ciphers.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the protocol versions (`TLSv1.2`, `TLSv1.3`); an empty set
    /// restores the defaults.
    #[must_use]
    pub fn tls_protocols<S: Into<String>>(mut self, protocols: impl IntoIterator<Item = S>) -> Self {
        self.config.tls.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Use a registered TLS factory plugin instead of PEM or key store material.
    #[must_use]
    pub fn ssl_factory_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.config.tls.ssl_factory_plugin = optional_string(plugin);
        self
    }

    /// Params handed to the TLS factory plugin.
    #[must_use]
    pub fn ssl_factory_plugin_params(mut self, params: impl Into<String>) -> Self {
        self.config.tls.ssl_factory_plugin_params = params.into();
        self
    }

    /// Crypto provider name; only `ring` is available.
    #[must_use]
    pub fn ssl_provider(mut self, provider: impl Into<String>) -> Self {
        self.config.tls.ssl_provider = optional_string(provider);
        self
    }

    /// Interval between certificate refreshes; zero disables refresh.
    #[must_use]
    pub fn auto_cert_refresh_time(mut self, interval: Duration) -> Self {
        self.config.tls.auto_cert_refresh_interval = interval;
        self
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// TCP connect timeout, also bounding the wait for a pooled connection.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.connect_timeout = timeout;
        self
    }

    /// Timeout for reading a response body.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.read_timeout = timeout;
        self
    }

    /// Timeout for a whole request.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.request_timeout = timeout;
        self
    }

    /// Maximum concurrent connections per host; `<= 0` disables the cap.
    #[must_use]
    pub fn max_connections_per_host(mut self, max: i32) -> Self {
        self.config.pool.max_connections_per_host = max;
        self
    }

    /// Idle time after which a pooled connection is evicted.
    #[must_use]
    pub fn connection_max_idle(mut self, idle: Duration) -> Self {
        self.config.pool.connection_max_idle = idle;
        self
    }

    /// Send `Accept-Encoding: gzip` and decode gzip responses.
    #[must_use]
    pub fn accept_gzip_compression(mut self, enabled: bool) -> Self {
        self.config.accept_gzip_compression = enabled;
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Validate the configuration and create a client.
    ///
    /// Runs, in order: service URL parsing, TLS validation, authentication
    /// resolution, pool policy checks. The first failure is returned and no
    /// client is created. Must be called within a Tokio runtime, which hosts
    /// the idle sweep and certificate refresh tasks.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`], [`Error::TlsMaterial`] or
    /// [`Error::UnsupportedAuthentication`].
    pub fn build(&self) -> Result<AdminClient> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::configuration("build() must be called within a Tokio runtime")
        })?;
        let config = self.config.clone();

        let service_url = parse_service_url(&config.service_http_url)?;
        debug!(url = %service_url, "service URL validated");

        let (tls_config, refresher) = if service_url.scheme() == "https" {
            let setup = prepare_tls(&config.tls, &self.registry)?;
            (setup.client_config, setup.refresher)
        } else {
            if config.tls.is_customized() {
                debug!(url = %service_url, "plain http service URL, TLS settings ignored");
            }
            (plaintext_tls_config()?, None)
        };
        debug!(tls = service_url.scheme() == "https", "TLS settings validated");

        let authentication = self.registry.resolve(&config.authentication)?;
        debug!(method = authentication.auth_method_name(), "authentication resolved");

        config.pool.validate()?;
        let pool = ConnectionPool::new(config.pool.clone());
        debug!(policy = ?config.pool, "connection pool created");

        let transport = PooledTransport::new(https_connector(tls_config, &config.pool), pool.clone());
        let service = service_stack(
            transport,
            Arc::clone(&authentication),
            config.accept_gzip_compression,
        );

        let mut tasks = Vec::new();
        tasks.extend(pool.spawn_idle_sweeper(&runtime));
        let refresh = Arc::new(RefreshCounters::default());
        let interval = config.tls.auto_cert_refresh_interval;
        if let Some(refresher) = refresher
            && !interval.is_zero()
        {
            debug!(?interval, "certificate refresh scheduled");
            tasks.push(refresher.spawn(interval, &runtime, Arc::clone(&refresh)));
        }

        info!(
            url = %service_url,
            auth = authentication.auth_method_name(),
            max_connections_per_host = config.pool.max_connections_per_host,
            "admin client built"
        );
        Ok(AdminClient::from_parts(ClientParts {
            config,
            service_url,
            authentication,
            pool,
            service,
            tasks,
            refresh,
        }))
    }
}

fn parse_service_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::configuration("serviceHttpUrl is required"));
    }
    let url = Url::parse(raw)
        .map_err(|e| Error::configuration(format!("serviceHttpUrl '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::configuration(format!(
            "serviceHttpUrl '{raw}': scheme must be http or https"
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::configuration(format!(
            "serviceHttpUrl '{raw}': missing host"
        )));
    }
    Ok(url)
}
