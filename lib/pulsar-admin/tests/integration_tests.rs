//! Integration tests for `AdminClientBuilder` and `AdminClient` using wiremock.

use std::sync::Arc;
use std::time::Duration;

use assert2::{check, let_assert};
use pulsar_admin::config::keys;
use pulsar_admin::{
    AdminClient, AdminClientBuilder, AuthData, Authentication, AuthenticationConfig, Error,
    Method, Result,
};
use serde_json::json;
use tokio::time::Instant;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

#[derive(Debug)]
struct StaticHeader(&'static str);

impl Authentication for StaticHeader {
    fn auth_method_name(&self) -> &str {
        "static"
    }

    fn auth_data(&self) -> Result<AuthData> {
        Ok(AuthData::header("X-Admin-Role", self.0))
    }
}

async fn clusters_server(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/v2/clusters"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!(["standalone"]))
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

async fn get_clusters(client: &AdminClient) -> Result<Vec<String>> {
    let request = client.request(Method::GET, "/admin/v2/clusters")?.build();
    client.execute(request).await?.json()
}

#[tokio::test]
async fn test_get_request() {
    let server = clusters_server(Duration::ZERO).await;
    let client = AdminClient::builder()
        .service_http_url(server.uri())
        .build()
        .expect("client");

    let clusters = get_clusters(&client).await.expect("clusters");
    assert_eq!(clusters, vec!["standalone".to_string()]);
}

#[tokio::test]
async fn test_error_status_is_returned_as_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/v2/tenants/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"reason": "Tenant does not exist"})))
        .mount(&server)
        .await;
    let client = AdminClient::builder()
        .service_http_url(server.uri())
        .build()
        .expect("client");

    let request = client
        .request(Method::GET, "/admin/v2/tenants/missing")
        .expect("request")
        .build();
    let response = client.execute(request).await.expect("response");
    check!(response.status() == 404);
    check!(!response.is_success());
}

#[tokio::test]
async fn test_put_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/admin/v2/tenants/acme"))
        .and(header("content-type", "application/json"))
        .and(wiremock::matchers::body_json(json!({"allowedClusters": ["standalone"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let client = AdminClient::builder()
        .service_http_url(server.uri())
        .build()
        .expect("client");

    let request = client
        .request(Method::PUT, "/admin/v2/tenants/acme")
        .expect("request")
        .json(&json!({"allowedClusters": ["standalone"]}))
        .expect("json")
        .build();
    let response = client.execute(request).await.expect("response");
    check!(response.status() == 204);
}

#[tokio::test]
async fn test_cloned_builders_are_independent() {
    let base = AdminClient::builder()
        .service_http_url("http://east:8080")
        .authentication_with_params("token", "token:abc")
        .request_timeout(Duration::from_secs(30));

    let clone = base
        .clone()
        .service_http_url("http://west:8080")
        .authentication(Arc::new(StaticHeader("admin")))
        .max_connections_per_host(2);

    check!(base.config().service_http_url == "http://east:8080");
    check!(base.config().pool.max_connections_per_host == 16);
    let_assert!(AuthenticationConfig::PluginWithParamString { plugin, .. } = &base.config().authentication);
    check!(plugin == "token");

    check!(clone.config().service_http_url == "http://west:8080");
    check!(clone.config().pool.request_timeout == Duration::from_secs(30));
    let_assert!(AuthenticationConfig::Instance(_) = &clone.config().authentication);
}

#[tokio::test]
async fn test_double_build_gives_independent_clients() {
    let server = clusters_server(Duration::ZERO).await;
    let builder = AdminClient::builder().service_http_url(server.uri());

    let first = builder.build().expect("first");
    let second = builder.build().expect("second");
    check!(first.config() == second.config());

    first.shutdown();
    let_assert!(Err(Error::PoolClosed) = get_clusters(&first).await);
    check!(get_clusters(&second).await.is_ok());
}

#[tokio::test]
async fn test_last_authentication_setter_wins() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/v2/clusters"))
        .and(header("X-Admin-Role", "superuser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let provider: Arc<dyn Authentication> = Arc::new(StaticHeader("superuser"));
    let client = AdminClient::builder()
        .service_http_url(server.uri())
        .authentication_with_params("token", "token:ignored")
        .authentication(Arc::clone(&provider))
        .build()
        .expect("client");

    check!(Arc::ptr_eq(client.authentication(), &provider));
    check!(client.config().authentication == AuthenticationConfig::Instance(provider));

    let request = client
        .request(Method::GET, "/admin/v2/clusters")
        .expect("request")
        .build();
    let response = client.execute(request).await.expect("response");
    check!(response.is_success());
    let seen = server.received_requests().await.expect("recorded");
    check!(seen.iter().all(|req| !req.headers.contains_key("authorization")));
}

#[tokio::test]
async fn test_unknown_plugin_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = AdminClient::builder()
        .service_http_url(server.uri())
        .authentication_with_params("com.example.auth.Kerberos", "principal:admin")
        .build();
    let_assert!(Err(Error::UnsupportedAuthentication { plugin, .. }) = result);
    check!(plugin == "com.example.auth.Kerberos");
}

#[tokio::test]
async fn test_missing_trust_file_fails_build() {
    let result = AdminClient::builder()
        .service_http_url("https://broker.example.com:8443")
        .tls_trust_certs_file_path("/nonexistent/pulsar/ca.pem")
        .build();
    let_assert!(Err(err) = result);
    check!(err.is_tls_material());
    check!(err.is_build_error());
}

async fn time_two_concurrent_requests(max_connections_per_host: i32) -> Duration {
    let server = clusters_server(Duration::from_millis(400)).await;
    let client = AdminClient::builder()
        .service_http_url(server.uri())
        .max_connections_per_host(max_connections_per_host)
        .build()
        .expect("client");

    let start = Instant::now();
    let (a, b) = tokio::join!(get_clusters(&client), get_clusters(&client));
    let elapsed = start.elapsed();
    a.expect("first request");
    b.expect("second request");
    elapsed
}

#[tokio::test]
async fn test_single_connection_serializes_requests() {
    let elapsed = time_two_concurrent_requests(1).await;
    check!(elapsed >= Duration::from_millis(800));
}

#[tokio::test]
async fn test_zero_and_negative_caps_are_unlimited() {
    for cap in [0, -1] {
        let elapsed = time_two_concurrent_requests(cap).await;
        check!(elapsed < Duration::from_millis(750), "cap {cap} took {elapsed:?}");
    }
}

#[tokio::test]
async fn test_pool_exhausted_after_connect_timeout() {
    let server = clusters_server(Duration::from_millis(500)).await;
    let client = AdminClient::builder()
        .service_http_url(server.uri())
        .max_connections_per_host(1)
        .connection_timeout(Duration::from_millis(100))
        .build()
        .expect("client");

    let (a, b) = tokio::join!(get_clusters(&client), get_clusters(&client));
    let errors: Vec<Error> = [a, b].into_iter().filter_map(std::result::Result::err).collect();
    check!(errors.len() == 1);
    check!(errors[0].is_pool_exhausted());
}

#[tokio::test]
async fn test_request_timeout() {
    let server = clusters_server(Duration::from_secs(3)).await;
    let client = AdminClient::builder()
        .service_http_url(server.uri())
        .request_timeout(Duration::from_millis(200))
        .build()
        .expect("client");

    let_assert!(Err(err) = get_clusters(&client).await);
    check!(err.is_timeout());
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let client = AdminClient::builder()
        .service_http_url(format!("http://127.0.0.1:{port}"))
        .build()
        .expect("client");
    let_assert!(Err(err) = get_clusters(&client).await);
    check!(err.is_connection());
}

#[tokio::test]
async fn test_load_conf_round_trip() {
    let server = clusters_server(Duration::ZERO).await;
    let loaded = AdminClient::builder()
        .load_conf([
            (keys::SERVICE_HTTP_URL, json!(server.uri())),
            (
                keys::AUTH_PLUGIN_CLASS_NAME,
                json!("org.apache.pulsar.client.impl.auth.AuthenticationBasic"),
            ),
            (keys::AUTH_PARAMS, json!("userId:admin,password:pw")),
            (keys::TLS_KEY_FILE_PATH, json!("/etc/pulsar/client.key.pem")),
            (keys::TLS_CERTIFICATE_FILE_PATH, json!("/etc/pulsar/client.cert.pem")),
            (keys::TLS_TRUST_CERTS_FILE_PATH, json!("/etc/pulsar/ca.pem")),
            (keys::USE_KEY_STORE_TLS, json!(true)),
            (keys::TLS_KEY_STORE_TYPE, json!("PKCS12")),
            (keys::TLS_KEY_STORE_PATH, json!("/etc/pulsar/client.p12")),
            (keys::TLS_KEY_STORE_PASSWORD, json!("key-secret")),
            (keys::TLS_TRUST_STORE_TYPE, json!("JKS")),
            (keys::TLS_TRUST_STORE_PATH, json!("/etc/pulsar/truststore.jks")),
            (keys::TLS_TRUST_STORE_PASSWORD, json!("trust-secret")),
            (keys::ALLOW_TLS_INSECURE_CONNECTION, json!(true)),
            (keys::ENABLE_TLS_HOSTNAME_VERIFICATION, json!(true)),
            (keys::TLS_PROTOCOLS, json!(["TLSv1.3"])),
            (keys::TLS_CIPHERS, json!("TLS_AES_128_GCM_SHA256,TLS_AES_256_GCM_SHA384")),
            (keys::SSL_FACTORY_PLUGIN, json!("com.example.VaultSslFactory")),
            (keys::SSL_FACTORY_PLUGIN_PARAMS, json!("role:admin")),
            (keys::SSL_PROVIDER, json!("ring")),
            (keys::CONNECTION_TIMEOUT, json!(5_000)),
            (keys::READ_TIMEOUT, json!("15s")),
            (keys::REQUEST_TIMEOUT, json!({"value": 2, "unit": "MINUTES"})),
            (keys::AUTO_CERT_REFRESH_TIME, json!("10m")),
            (keys::ACCEPT_GZIP_COMPRESSION, json!(false)),
            (keys::MAX_CONNECTIONS_PER_HOST, json!(4)),
            (keys::CONNECTION_MAX_IDLE_SECONDS, json!(60)),
            ("numIoThreads", json!(8)),
            ("listenerName", json!("internal")),
        ])
        .expect("conf");

    let expected = AdminClient::builder()
        .service_http_url(server.uri())
        .authentication_with_params(
            "org.apache.pulsar.client.impl.auth.AuthenticationBasic",
            "userId:admin,password:pw",
        )
        .tls_key_file_path("/etc/pulsar/client.key.pem")
        .tls_certificate_file_path("/etc/pulsar/client.cert.pem")
        .tls_trust_certs_file_path("/etc/pulsar/ca.pem")
        .use_key_store_tls(true)
        .tls_key_store_type("PKCS12")
        .tls_key_store_path("/etc/pulsar/client.p12")
        .tls_key_store_password("key-secret")
        .tls_trust_store_type("JKS")
        .tls_trust_store_path("/etc/pulsar/truststore.jks")
        .tls_trust_store_password("trust-secret")
        .allow_tls_insecure_connection(true)
        .enable_tls_hostname_verification(true)
        .tls_protocols(["TLSv1.3"])
        .tls_ciphers(["TLS_AES_128_GCM_SHA256", "TLS_AES_256_GCM_SHA384"])
        .ssl_factory_plugin("com.example.VaultSslFactory")
        .ssl_factory_plugin_params("role:admin")
        .ssl_provider("ring")
        .connection_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(15))
        .request_timeout(Duration::from_secs(120))
        .auto_cert_refresh_time(Duration::from_secs(600))
        .accept_gzip_compression(false)
        .max_connections_per_host(4)
        .connection_max_idle(Duration::from_secs(60));
    check!(loaded.config() == expected.config());

    // plain http: the TLS settings are carried but not validated
    let client = loaded.build().expect("client");
    check!(client.config() == expected.config());
    check!(client.authentication().auth_method_name() == "basic");
    check!(get_clusters(&client).await.is_ok());
}

#[tokio::test]
async fn test_load_conf_auth_param_map() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/v2/clusters"))
        .and(header("Authorization", "Basic YWRtaW46cHc="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["standalone"])))
        .expect(1)
        .mount(&server)
        .await;

    let loaded = AdminClient::builder()
        .load_conf([
            (keys::SERVICE_HTTP_URL, json!(server.uri())),
            (keys::AUTH_PLUGIN_CLASS_NAME, json!("basic")),
            (keys::AUTH_PARAMS, json!({"userId": "admin", "password": "pw"})),
        ])
        .expect("conf");
    let expected = AdminClient::builder()
        .service_http_url(server.uri())
        .authentication_with_param_map("basic", [("userId", "admin"), ("password", "pw")]);
    check!(loaded.config() == expected.config());

    let client = loaded.build().expect("client");
    check!(client.config() == expected.config());
    check!(get_clusters(&client).await.is_ok());
}

#[tokio::test]
async fn test_insecure_connection_builds_without_trust_material() {
    let client = AdminClient::builder()
        .service_http_url("https://broker.example.com:8443")
        .allow_tls_insecure_connection(true)
        .enable_tls_hostname_verification(true)
        .build()
        .expect("client");
    check!(client.config().tls.allow_insecure_connection);
    check!(client.config().tls.enable_hostname_verification);
}

#[tokio::test]
async fn test_builder_is_untouched_by_failed_build() {
    let builder: AdminClientBuilder = AdminClient::builder()
        .service_http_url("https://broker:8443")
        .tls_trust_certs_file_path("/nonexistent/ca.pem");
    let before = builder.config().clone();
    check!(builder.build().is_err());
    check!(builder.config() == &before);
}
