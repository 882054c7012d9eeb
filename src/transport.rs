//! HTTP transport abstraction and its reqwest implementation.

use crate::config::TransportConfig;
use crate::error::Error;
use crate::types::QueryParams;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http::Method;
use std::pin::Pin;
use std::time::Duration;

/// Protocol constants
pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
pub(crate) const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";
pub(crate) const PARAM_AUTH: &str = "auth";
const PATH_SUFFIX: &str = ".json";

/// Body of an open watch connection. Dropping it closes the connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// A request against a database location.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    /// Location URL, without the `.json` suffix.
    pub url: String,
    pub auth: Option<String>,
    pub params: QueryParams,
    /// JSON-encoded body.
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            auth: None,
            params: QueryParams::new(),
            body: None,
        }
    }

    pub fn auth(mut self, auth: Option<String>) -> Self {
        self.auth = auth;
        self
    }

    pub fn params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The REST endpoint: the location URL with `.json` appended.
    ///
    /// The database root (a URL without a path) maps to `/.json`.
    pub fn endpoint(&self) -> String {
        let url = self.url.trim_end_matches('/');
        let has_path = url
            .split_once("://")
            .map_or(url, |(_, rest)| rest)
            .contains('/');

        if has_path {
            format!("{}{}", url, PATH_SUFFIX)
        } else {
            format!("{}/{}", url, PATH_SUFFIX)
        }
    }

    /// Query parameters to send: the `auth` token plus `params`, where a
    /// caller-supplied `auth` parameter replaces the token.
    pub fn query(&self) -> QueryParams {
        let mut query = QueryParams::new();
        if let Some(auth) = self.auth.as_deref().filter(|a| !a.is_empty()) {
            query.set(PARAM_AUTH, auth);
        }
        query.extend(&self.params);
        query
    }
}

/// The operations the client needs from the network.
///
/// [`HttpTransport`] is the production implementation. Supplying another
/// implementation to [`ClientBuilder::transport`](crate::ClientBuilder::transport)
/// lets the client and its watch streams run without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a request/response call and return the response body.
    ///
    /// Non-success statuses are returned as errors.
    async fn call(&self, request: ApiRequest) -> Result<Bytes, Error>;

    /// Open a long-lived `text/event-stream` GET and return its body.
    ///
    /// Fails if the connection cannot be established or the server answers
    /// with a non-success status.
    async fn stream(&self, request: ApiRequest) -> Result<ByteStream, Error>;
}

/// reqwest-backed [`Transport`].
///
/// Calls and streams use separate connection pools so that long-lived
/// streams never hold connections the calls need, and so each gets its own
/// timeout.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    calls: reqwest::Client,
    streams: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Build both connection pools from `config`.
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let calls = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_write_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()?;

        let mut streams = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host);
        if let Some(timeout) = config.stream_timeout {
            streams = streams.timeout(timeout);
        }
        let streams = streams.build()?;

        Ok(Self {
            calls,
            streams,
            config,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn build(
        &self,
        client: &reqwest::Client,
        request: &ApiRequest,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let endpoint = request.endpoint();
        let url = reqwest::Url::parse(&endpoint)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", endpoint, e)))?;

        let params = request.query();
        let mut req = client.request(request.method.clone(), url);
        if !params.is_empty() {
            let pairs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            req = req.query(&pairs);
        }
        if let Some(body) = &request.body {
            req = req
                .header(http::header::CONTENT_TYPE, CONTENT_TYPE_JSON)
                .body(body.clone());
        }
        Ok(req)
    }

    async fn call_once(&self, request: &ApiRequest) -> Result<Bytes, Error> {
        let resp = self.build(&self.calls, request)?.send().await?;
        let status = resp.status().as_u16();
        let retry_after = parse_retry_after(resp.headers());
        let body = resp.bytes().await?;

        match status {
            200..=299 => Ok(body),
            _ => Err(Error::from_response(status, &request.url, &body).with_retry_after(retry_after)),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: ApiRequest) -> Result<Bytes, Error> {
        let retry = &self.config.retry;
        let mut retries = 0;

        loop {
            match self.call_once(&request).await {
                Ok(body) => return Ok(body),
                Err(e)
                    if e.is_retryable()
                        && is_retry_safe(&request.method)
                        && retry.should_retry(retries) =>
                {
                    retries += 1;
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt = retries,
                        error = %e,
                        "retrying request"
                    );
                    let delay = e.retry_after().unwrap_or_else(|| retry.delay(retries));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn stream(&self, request: ApiRequest) -> Result<ByteStream, Error> {
        let resp = self
            .build(&self.streams, &request)?
            .header(http::header::ACCEPT, CONTENT_TYPE_EVENT_STREAM)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..=299).contains(&status) {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(Error::from_response(status, &request.url, &body));
        }

        Ok(Box::pin(resp.bytes_stream().map_err(Error::from)))
    }
}

/// Whether a failed attempt may be sent again.
///
/// A `POST` is a push: repeating it after a lost response creates a second
/// child.
fn is_retry_safe(method: &Method) -> bool {
    *method != Method::POST
}

/// `Retry-After` in its delay-seconds form. HTTP dates are ignored and the
/// regular backoff applies.
fn parse_retry_after(headers: &http::HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(http::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_appends_json_suffix() {
        let req = ApiRequest::new(Method::GET, "https://db.test/users/bob");
        assert_eq!(req.endpoint(), "https://db.test/users/bob.json");

        let root = ApiRequest::new(Method::GET, "https://db.test");
        assert_eq!(root.endpoint(), "https://db.test/.json");
        let root = ApiRequest::new(Method::GET, "https://db.test/");
        assert_eq!(root.endpoint(), "https://db.test/.json");
    }

    #[test]
    fn test_query_carries_auth_and_params_may_override_it() {
        let mut params = QueryParams::new();
        params.set("shallow", "true");
        let req = ApiRequest::new(Method::GET, "https://db.test")
            .auth(Some("secret".to_string()))
            .params(params.clone());
        let query = req.query();
        assert_eq!(query.get("auth"), Some("secret"));
        assert_eq!(query.get("shallow"), Some("true"));

        params.set("auth", "override");
        let query = req.params(params).query();
        assert_eq!(query.get("auth"), Some("override"));
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = http::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(http::header::RETRY_AFTER, http::HeaderValue::from_static(" 7 "));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(
            http::header::RETRY_AFTER,
            http::HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_push_is_never_retried() {
        assert!(!is_retry_safe(&Method::POST));
        for method in [Method::GET, Method::PUT, Method::PATCH, Method::DELETE] {
            assert!(is_retry_safe(&method));
        }
    }

    #[test]
    fn test_unparsable_location_is_invalid_url() {
        let transport = HttpTransport::new(TransportConfig::default()).unwrap();
        let request = ApiRequest::new(Method::GET, "users/bob");
        let err = transport.build(&transport.calls, &request).unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(ref msg) if msg.starts_with("users/bob.json")));
    }

    #[test]
    fn test_empty_auth_is_not_sent() {
        let req = ApiRequest::new(Method::GET, "https://db.test").auth(Some(String::new()));
        assert!(req.query().is_empty());
    }
}
