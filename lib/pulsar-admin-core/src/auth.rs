//! Authentication capability and plugin parameters.
//!
//! An [`Authentication`] provider produces the credentials attached to every
//! control-plane request. Providers are usually resolved by name through the
//! plugin registry, from [`AuthParams`] given either as a delimited string or
//! as a map.

use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Credentials for a single request, as HTTP header pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthData {
    headers: Vec<(String, String)>,
}

impl AuthData {
    /// No credentials.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Credentials carried by a single header.
    #[must_use]
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            headers: vec![(name.into(), value.into())],
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Header pairs.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns `true` if no header is carried.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// A pluggable authentication provider.
///
/// Implementations must be cheap to call from many concurrent requests;
/// [`Authentication::refresh`] is expected to swap its state internally.
pub trait Authentication: fmt::Debug + Send + Sync + 'static {
    /// Name of the authentication method (`token`, `basic`, ...).
    fn auth_method_name(&self) -> &str;

    /// Credentials for the next request.
    fn auth_data(&self) -> Result<AuthData>;

    /// Re-acquire credentials (re-read a token file, renew a ticket...).
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// Parameters handed to an authentication plugin factory.
///
/// Built from a `key1:val1,key2:val2` string, a JSON object string, or a map.
/// A string holding a single value with no `:` is kept as a bare value, for
/// plugins that accept one (a raw token).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthParams {
    values: BTreeMap<String, String>,
    bare: Option<String>,
}

impl AuthParams {
    /// Parse a parameter string.
    ///
    /// Pairs are separated by `,` and keys from values by the first `:`.
    /// A string starting with `{` is read as a JSON object of strings.
    /// Neither keys nor values may contain `,`; keys may not contain `:`.
    pub fn parse(plugin: &str, params: &str) -> Result<Self> {
        let trimmed = params.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        if trimmed.starts_with('{') {
            let values: BTreeMap<String, String> = serde_json::from_str(trimmed).map_err(|e| {
                Error::unsupported_authentication(plugin, format!("malformed JSON params: {e}"))
            })?;
            return Ok(Self { values, bare: None });
        }
        if !trimmed.contains([',', ':']) {
            return Ok(Self {
                values: BTreeMap::new(),
                bare: Some(trimmed.to_string()),
            });
        }

        let mut values = BTreeMap::new();
        for pair in trimmed.split(',') {
            let Some((key, value)) = pair.split_once(':') else {
                return Err(Error::unsupported_authentication(
                    plugin,
                    format!("malformed param '{pair}', expected 'key:value'"),
                ));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::unsupported_authentication(
                    plugin,
                    format!("empty key in param '{pair}'"),
                ));
            }
            values.insert(key.to_string(), value.trim().to_string());
        }
        Ok(Self { values, bare: None })
    }

    /// Single parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Single parameter, failing with [`Error::UnsupportedAuthentication`] when absent.
    pub fn require(&self, plugin: &str, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| match &self.bare {
            Some(bare) => Error::unsupported_authentication(
                plugin,
                format!("malformed param '{bare}', expected 'key:value'"),
            ),
            None => Error::unsupported_authentication(
                plugin,
                format!("missing required param '{key}'"),
            ),
        })
    }

    /// A single value given without a key.
    #[must_use]
    pub fn bare(&self) -> Option<&str> {
        self.bare.as_deref()
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.bare.is_none()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for AuthParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            bare: None,
        }
    }
}
