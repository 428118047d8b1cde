//! Plugin registry: construct authentication providers and TLS factories by name.
//!
//! The registry plays the role of a code-loading context: it is handed to the
//! builder once and threaded unchanged into every resolution performed by
//! `build()`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use tracing::debug;

use crate::auth::{AuthenticationBasic, AuthenticationDisabled, AuthenticationToken};
use crate::config::AuthenticationConfig;
use crate::{AuthParams, Authentication, Error, Result};

/// Factory building an authentication provider from its parameters.
pub type AuthFactory = dyn Fn(&AuthParams) -> Result<Arc<dyn Authentication>> + Send + Sync;

/// Factory building a [`SslFactory`] from its parameter string.
pub type SslFactoryConstructor = dyn Fn(&str) -> Result<Arc<dyn SslFactory>> + Send + Sync;

/// A fully custom source of TLS client configuration.
///
/// When configured, it replaces both PEM-style and KeyStore-style material.
pub trait SslFactory: fmt::Debug + Send + Sync + 'static {
    /// Build the rustls client configuration.
    ///
    /// `provider` carries the cipher suite restrictions of the client config.
    fn client_config(&self, provider: Arc<CryptoProvider>) -> Result<rustls::ClientConfig>;

    /// Whether [`SslFactory::refresh`] should be scheduled.
    fn needs_refresh(&self) -> bool {
        false
    }

    /// Reload the material behind the configs returned so far.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// Registry mapping plugin identifiers to factories.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use pulsar_admin::{AdminClient, PluginRegistry};
///
/// let registry = PluginRegistry::with_builtins()
///     .register_auth("oauth2", |params| Ok(Arc::new(MyOAuth2::new(params)?) as _));
///
/// let client = AdminClient::builder()
///     .plugin_registry(Arc::new(registry))
///     .service_http_url("https://broker:8443")
///     .authentication_with_params("oauth2", "issuerUrl:https://auth.example.com")
///     .build()?;
/// ```
#[derive(Clone, Default)]
pub struct PluginRegistry {
    auth: HashMap<String, Arc<AuthFactory>>,
    ssl: HashMap<String, Arc<SslFactoryConstructor>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut auth: Vec<_> = self.auth.keys().collect();
        auth.sort();
        let mut ssl: Vec<_> = self.ssl.keys().collect();
        ssl.sort();
        f.debug_struct("PluginRegistry")
            .field("auth", &auth)
            .field("ssl", &ssl)
            .finish()
    }
}

impl PluginRegistry {
    /// A registry without any plugin.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with the built-in `token`, `basic` and `disabled` providers.
    ///
    /// Each one is also registered under its fully qualified class name so
    /// configurations written for the Java admin client resolve unchanged.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::empty()
            .register_auth(AuthenticationToken::NAME, token_factory)
            .register_auth("AuthenticationToken", token_factory)
            .register_auth(
                "org.apache.pulsar.client.impl.auth.AuthenticationToken",
                token_factory,
            )
            .register_auth(AuthenticationBasic::NAME, basic_factory)
            .register_auth("AuthenticationBasic", basic_factory)
            .register_auth(
                "org.apache.pulsar.client.impl.auth.AuthenticationBasic",
                basic_factory,
            )
            .register_auth(AuthenticationDisabled::NAME, disabled_factory)
            .register_auth(
                "org.apache.pulsar.client.impl.auth.AuthenticationDisabled",
                disabled_factory,
            )
    }

    /// Register an authentication factory, replacing any previous one with that name.
    #[must_use]
    pub fn register_auth<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&AuthParams) -> Result<Arc<dyn Authentication>> + Send + Sync + 'static,
    {
        self.auth.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a TLS factory plugin, replacing any previous one with that name.
    #[must_use]
    pub fn register_ssl_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn SslFactory>> + Send + Sync + 'static,
    {
        self.ssl.insert(name.into(), Arc::new(factory));
        self
    }

    /// Returns `true` if an authentication plugin is registered under `name`.
    #[must_use]
    pub fn has_auth(&self, name: &str) -> bool {
        self.auth.contains_key(name)
    }

    /// Construct an authentication provider.
    ///
    /// Every failure, including errors raised by the factory itself, is
    /// reported as [`Error::UnsupportedAuthentication`].
    pub fn resolve_authentication(
        &self,
        plugin: &str,
        params: &AuthParams,
    ) -> Result<Arc<dyn Authentication>> {
        let factory = self.auth.get(plugin).ok_or_else(|| {
            Error::unsupported_authentication(plugin, "no authentication plugin registered")
        })?;
        let auth = factory(params).map_err(|err| match err {
            Error::UnsupportedAuthentication { .. } => err,
            other => Error::unsupported_authentication(plugin, other.to_string()),
        })?;
        debug!(plugin, method = auth.auth_method_name(), "authentication resolved");
        Ok(auth)
    }

    /// Resolve the configured authentication form.
    pub(crate) fn resolve(&self, config: &AuthenticationConfig) -> Result<Arc<dyn Authentication>> {
        match config {
            AuthenticationConfig::None => Ok(Arc::new(AuthenticationDisabled)),
            AuthenticationConfig::PluginWithParamString { plugin, params } => {
                let params = AuthParams::parse(plugin, params)?;
                self.resolve_authentication(plugin, &params)
            }
            AuthenticationConfig::PluginWithParamMap { plugin, params } => {
                let params: AuthParams = params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                self.resolve_authentication(plugin, &params)
            }
            AuthenticationConfig::Instance(auth) => Ok(Arc::clone(auth)),
        }
    }

    /// Construct a TLS factory plugin.
    pub fn resolve_ssl_factory(&self, plugin: &str, params: &str) -> Result<Arc<dyn SslFactory>> {
        let factory = self.ssl.get(plugin).ok_or_else(|| {
            Error::configuration(format!("no TLS factory plugin registered as '{plugin}'"))
        })?;
        factory(params).map_err(|err| match err {
            Error::Configuration(_) => err,
            other => Error::configuration(format!("TLS factory plugin '{plugin}': {other}")),
        })
    }
}

fn token_factory(params: &AuthParams) -> Result<Arc<dyn Authentication>> {
    Ok(Arc::new(AuthenticationToken::from_params(params)?))
}

fn basic_factory(params: &AuthParams) -> Result<Arc<dyn Authentication>> {
    Ok(Arc::new(AuthenticationBasic::from_params(params)?))
}

fn disabled_factory(_: &AuthParams) -> Result<Arc<dyn Authentication>> {
    Ok(Arc::new(AuthenticationDisabled))
}
