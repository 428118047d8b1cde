//! Bulk configuration from a key/value map.
//!
//! Keys are the option names of [`crate::config::keys`]. Values are JSON values
//! so the map can come straight from a config file.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::builder::AdminClientBuilder;
use crate::config::keys;
use crate::{Error, Result};

fn mismatch(key: &str, expected: &str, value: &Value) -> Error {
    Error::configuration(format!("{key}: expected {expected}, got {value}"))
}

fn string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        other => Err(mismatch(key, "a string", other)),
    }
}

fn boolean(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(mismatch(key, "a boolean", other)),
    }
}

fn integer(key: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| mismatch(key, "an integer", value)),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| mismatch(key, "an integer", value)),
        other => Err(mismatch(key, "an integer", other)),
    }
}

fn non_negative(key: &str, value: &Value) -> Result<u64> {
    let n = integer(key, value)?;
    u64::try_from(n)
        .map_err(|_| Error::configuration(format!("{key}: must not be negative, got {n}")))
}

fn string_set(key: &str, value: &Value) -> Result<BTreeSet<String>> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| string(key, item))
            .collect::<Result<_>>()?,
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        Value::Null => Vec::new(),
        other => return Err(mismatch(key, "a list of strings", other)),
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

fn time_unit(key: &str, unit: &str, amount: u64) -> Result<Duration> {
    let duration = match unit.to_ascii_uppercase().as_str() {
        "NANOSECONDS" | "NS" => Duration::from_nanos(amount),
        "MICROSECONDS" | "US" => Duration::from_micros(amount),
        "MILLISECONDS" | "MS" => Duration::from_millis(amount),
        "SECONDS" | "S" => Duration::from_secs(amount),
        "MINUTES" | "M" => Duration::from_secs(amount.saturating_mul(60)),
        "HOURS" | "H" => Duration::from_secs(amount.saturating_mul(3_600)),
        "DAYS" | "D" => Duration::from_secs(amount.saturating_mul(86_400)),
        _ => {
            return Err(Error::configuration(format!(
                "{key}: unknown time unit '{unit}'"
            )));
        }
    };
    Ok(duration)
}

/// Integer milliseconds, `"<n><unit>"` strings, or `{"value": n, "unit": "SECONDS"}`.
fn duration(key: &str, value: &Value) -> Result<Duration> {
    match value {
        Value::Number(_) => non_negative(key, value).map(Duration::from_millis),
        Value::String(s) => {
            let s = s.trim();
            let split = s.find(|c: char| !c.is_ascii_digit() && c != '-').unwrap_or(s.len());
            let (amount, unit) = s.split_at(split);
            let amount = non_negative(key, &Value::String(amount.to_string()))?;
            if unit.trim().is_empty() {
                Ok(Duration::from_millis(amount))
            } else {
                time_unit(key, unit.trim(), amount)
            }
        }
        Value::Object(object) => {
            let amount = object
                .get("value")
                .ok_or_else(|| mismatch(key, "a 'value' field", value))?;
            let amount = non_negative(key, amount)?;
            let unit = object
                .get("unit")
                .map(|unit| string(key, unit))
                .transpose()?
                .unwrap_or_else(|| "MILLISECONDS".to_string());
            time_unit(key, &unit, amount)
        }
        other => Err(mismatch(key, "a duration", other)),
    }
}

impl AdminClientBuilder {
    /// Apply every recognized option of `conf`, as the matching setters would.
    ///
    /// Unknown keys are skipped. `authPluginClassName` and `authParams` are
    /// applied together once the whole map has been read: a string
    /// `authParams` selects the param-string form, an object the param-map form.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use serde_json::json;
    ///
    /// let builder = AdminClient::builder().load_conf([
    ///     ("serviceHttpUrl", json!("https://broker:8443")),
    ///     ("authPluginClassName", json!("org.apache.pulsar.client.impl.auth.AuthenticationToken")),
    ///     ("authParams", json!("file:///etc/pulsar/token")),
    ///     ("requestTimeout", json!("30s")),
    /// ])?;
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] naming the key on a type mismatch or a
    /// negative number.
    pub fn load_conf<I, K>(self, conf: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut builder = self;
        let mut auth_plugin = None;
        let mut auth_params = None;

        for (key, value) in conf {
            let key: String = key.into();
            let key = key.as_str();
            builder = match key {
                keys::SERVICE_HTTP_URL => builder.service_http_url(string(key, &value)?),
                keys::AUTH_PLUGIN_CLASS_NAME => {
                    auth_plugin = Some(string(key, &value)?);
                    builder
                }
                keys::AUTH_PARAMS => {
                    auth_params = Some(value);
                    builder
                }
                keys::TLS_KEY_FILE_PATH => builder.tls_key_file_path(string(key, &value)?),
                keys::TLS_CERTIFICATE_FILE_PATH => {
                    builder.tls_certificate_file_path(string(key, &value)?)
                }
                keys::TLS_TRUST_CERTS_FILE_PATH => {
                    builder.tls_trust_certs_file_path(string(key, &value)?)
                }
                keys::USE_KEY_STORE_TLS => builder.use_key_store_tls(boolean(key, &value)?),
                keys::TLS_KEY_STORE_TYPE => builder.tls_key_store_type(string(key, &value)?),
                keys::TLS_KEY_STORE_PATH => builder.tls_key_store_path(string(key, &value)?),
                keys::TLS_KEY_STORE_PASSWORD => {
                    builder.tls_key_store_password(string(key, &value)?)
                }
                keys::TLS_TRUST_STORE_TYPE => builder.tls_trust_store_type(string(key, &value)?),
                keys::TLS_TRUST_STORE_PATH => builder.tls_trust_store_path(string(key, &value)?),
                keys::TLS_TRUST_STORE_PASSWORD => {
                    builder.tls_trust_store_password(string(key, &value)?)
                }
                keys::ALLOW_TLS_INSECURE_CONNECTION => {
                    builder.allow_tls_insecure_connection(boolean(key, &value)?)
                }
                keys::ENABLE_TLS_HOSTNAME_VERIFICATION => {
                    builder.enable_tls_hostname_verification(boolean(key, &value)?)
                }
                keys::TLS_CIPHERS => builder.tls_ciphers(string_set(key, &value)?),
                keys::TLS_PROTOCOLS => builder.tls_protocols(string_set(key, &value)?),
                keys::SSL_FACTORY_PLUGIN => builder.ssl_factory_plugin(string(key, &value)?),
                keys::SSL_FACTORY_PLUGIN_PARAMS => {
                    builder.ssl_factory_plugin_params(string(key, &value)?)
                }
                keys::SSL_PROVIDER => builder.ssl_provider(string(key, &value)?),
                keys::CONNECTION_TIMEOUT => builder.connection_timeout(duration(key, &value)?),
                keys::READ_TIMEOUT => builder.read_timeout(duration(key, &value)?),
                keys::REQUEST_TIMEOUT => builder.request_timeout(duration(key, &value)?),
                keys::AUTO_CERT_REFRESH_TIME => {
                    builder.auto_cert_refresh_time(duration(key, &value)?)
                }
                keys::ACCEPT_GZIP_COMPRESSION => {
                    builder.accept_gzip_compression(boolean(key, &value)?)
                }
                keys::MAX_CONNECTIONS_PER_HOST => {
                    let max = integer(key, &value)?;
                    let max = i32::try_from(max).map_err(|_| {
                        Error::configuration(format!("{key}: {max} is out of range"))
                    })?;
                    builder.max_connections_per_host(max)
                }
                keys::CONNECTION_MAX_IDLE_SECONDS => builder
                    .connection_max_idle(Duration::from_secs(non_negative(key, &value)?)),
                unknown => {
                    debug!(key = unknown, "unknown configuration key ignored");
                    builder
                }
            };
        }

        match (auth_plugin, auth_params) {
            (Some(plugin), None | Some(Value::Null)) => {
                Ok(builder.authentication_with_params(plugin, ""))
            }
            (Some(plugin), Some(Value::String(params))) => {
                Ok(builder.authentication_with_params(plugin, params))
            }
            (Some(plugin), Some(Value::Object(params))) => {
                let params = params.iter().map(|(k, v)| {
                    let v = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                    (k.clone(), v)
                });
                Ok(builder.authentication_with_param_map(plugin, params))
            }
            (Some(_), Some(other)) => Err(mismatch(keys::AUTH_PARAMS, "a string or an object", &other)),
            (None, Some(_)) => Err(Error::configuration(format!(
                "{} is set without {}",
                keys::AUTH_PARAMS,
                keys::AUTH_PLUGIN_CLASS_NAME
            ))),
            (None, None) => Ok(builder),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use serde_json::json;

    use super::*;
    use crate::AdminClient;
    use crate::config::AuthenticationConfig;

    #[test]
    fn durations() {
        let key = "readTimeout";
        check!(duration(key, &json!(1500)).ok() == Some(Duration::from_millis(1500)));
        check!(duration(key, &json!("500ms")).ok() == Some(Duration::from_millis(500)));
        check!(duration(key, &json!("30s")).ok() == Some(Duration::from_secs(30)));
        check!(duration(key, &json!("5m")).ok() == Some(Duration::from_secs(300)));
        check!(duration(key, &json!("1h")).ok() == Some(Duration::from_secs(3_600)));
        check!(duration(key, &json!("2d")).ok() == Some(Duration::from_secs(172_800)));
        check!(duration(key, &json!("250")).ok() == Some(Duration::from_millis(250)));
        check!(
            duration(key, &json!({"value": 2, "unit": "minutes"})).ok()
                == Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn negative_durations_are_rejected() {
        let_assert!(Err(Error::Configuration(message)) = duration("readTimeout", &json!(-1)));
        check!(message.contains("readTimeout"));
        check!(duration("readTimeout", &json!("-5s")).is_err());
        check!(duration("readTimeout", &json!({"value": -3, "unit": "SECONDS"})).is_err());
    }

    #[test]
    fn bad_units_are_rejected() {
        check!(duration("readTimeout", &json!("5 fortnights")).is_err());
        check!(duration("readTimeout", &json!(true)).is_err());
    }

    #[test]
    fn string_sets_accept_lists_and_csv() {
        let from_list = string_set("tlsProtocols", &json!(["TLSv1.3", "TLSv1.2"])).expect("list");
        let from_csv = string_set("tlsProtocols", &json!("TLSv1.2, TLSv1.3,")).expect("csv");
        check!(from_list == from_csv);
        check!(from_list.len() == 2);
    }

    #[test]
    fn type_mismatch_names_the_key() {
        let result = AdminClient::builder().load_conf([("maxConnectionsPerHost", json!("many"))]);
        let_assert!(Err(Error::Configuration(message)) = result);
        check!(message.contains("maxConnectionsPerHost"));
    }

    #[test]
    fn negative_idle_seconds_are_rejected() {
        let result = AdminClient::builder().load_conf([("connectionMaxIdleSeconds", json!(-1))]);
        check!(result.is_err());
    }

    #[test]
    fn negative_max_connections_mean_unlimited() {
        let builder = AdminClient::builder()
            .load_conf([("maxConnectionsPerHost", json!(-1))])
            .expect("conf");
        check!(builder.config().pool.connection_limit().is_none());
    }

    #[test]
    fn auth_params_as_map() {
        let builder = AdminClient::builder()
            .load_conf([
                ("authParams", json!({"userId": "admin", "password": "pw"})),
                ("authPluginClassName", json!("basic")),
            ])
            .expect("conf");
        let_assert!(
            AuthenticationConfig::PluginWithParamMap { plugin, params } =
                &builder.config().authentication
        );
        check!(plugin == "basic");
        check!(params.get("userId").map(String::as_str) == Some("admin"));
    }

    #[test]
    fn auth_params_without_plugin_fail() {
        let result = AdminClient::builder().load_conf([("authParams", json!("token:abc"))]);
        check!(result.is_err());
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let builder = AdminClient::builder()
            .load_conf([
                ("serviceHttpUrl", json!("http://broker:8080")),
                ("statsIntervalSeconds", json!(60)),
            ])
            .expect("conf");
        check!(builder.config().service_http_url == "http://broker:8080");
    }
}
