//! Database references and their operations.

use crate::client::Client;
use crate::error::Error;
use crate::event::{DocumentUnmarshaller, EventDecoder, JsonUnmarshaller, Unmarshaller};
use crate::session::{self, EventReceiver};
use crate::transport::ApiRequest;
use crate::types::{Document, OrderBy, QueryParams, Rules};
use bytes::Bytes;
use http::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

/// Query parameter names
pub(crate) const PARAM_SHALLOW: &str = "shallow";
pub(crate) const PARAM_ORDER_BY: &str = "orderBy";
pub(crate) const PARAM_EQUAL_TO: &str = "equalTo";
pub(crate) const PARAM_START_AT: &str = "startAt";
pub(crate) const PARAM_END_AT: &str = "endAt";
pub(crate) const PARAM_LIMIT_TO_FIRST: &str = "limitToFirst";
pub(crate) const PARAM_LIMIT_TO_LAST: &str = "limitToLast";

const RULES_PATH: &str = ".settings/rules";

/// A handle to a database location.
///
/// This is a lightweight, cloneable object - not a persistent connection.
/// Operations make HTTP requests on demand. Query methods return a new
/// reference and leave `self` untouched.
#[derive(Clone, Debug)]
pub struct Reference {
    pub(crate) url: String,
    pub(crate) client: Client,
    pub(crate) params: QueryParams,
    pub(crate) order: Option<OrderBy>,
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

impl Reference {
    /// Get the location URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Last segment of the location path; empty for the database root.
    pub fn key(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url)
            .trim_end_matches('/');

        rest.rsplit_once('/').map(|(_, key)| key).unwrap_or("")
    }

    /// Query parameters applied to reads and watches of this reference.
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Ordering set with [`order_by`](Self::order_by).
    pub fn order(&self) -> Option<&OrderBy> {
        self.order.as_ref()
    }

    /// Reference to a location below this one.
    pub fn child(&self, path: &str) -> Reference {
        Reference {
            url: join(&self.url, path),
            client: self.client.clone(),
            params: self.params.clone(),
            order: self.order.clone(),
        }
    }

    /// Ask for keys only: object children are returned as `true`.
    pub fn shallow(&self) -> Reference {
        self.with_param(|params| params.set(PARAM_SHALLOW, "true"))
    }

    pub fn order_by(&self, order: impl Into<OrderBy>) -> Reference {
        let order = order.into();
        let mut reference = self.with_param(|params| params.set_json(PARAM_ORDER_BY, order.as_str()));
        reference.order = Some(order);
        reference
    }

    pub fn equal_to(&self, value: impl Into<Value>) -> Reference {
        self.with_param(|params| params.set_json(PARAM_EQUAL_TO, value))
    }

    pub fn start_at(&self, value: impl Into<Value>) -> Reference {
        self.with_param(|params| params.set_json(PARAM_START_AT, value))
    }

    pub fn end_at(&self, value: impl Into<Value>) -> Reference {
        self.with_param(|params| params.set_json(PARAM_END_AT, value))
    }

    pub fn limit_to_first(&self, limit: u32) -> Reference {
        self.with_param(|params| params.set(PARAM_LIMIT_TO_FIRST, limit.to_string()))
    }

    pub fn limit_to_last(&self, limit: u32) -> Reference {
        self.with_param(|params| params.set(PARAM_LIMIT_TO_LAST, limit.to_string()))
    }

    fn with_param(&self, f: impl FnOnce(&mut QueryParams)) -> Reference {
        let mut reference = self.clone();
        f(&mut reference.params);
        reference
    }

    /// Read the value at this location, applying the reference's query.
    pub async fn value<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = self
            .call(Method::GET, self.url.clone(), None, self.params.clone())
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Create a child with a server-generated key.
    pub async fn push<V: Serialize + ?Sized>(&self, value: &V) -> Result<Reference, Error> {
        self.push_with(value, RequestOptions::default()).await
    }

    /// Create a child with a server-generated key, with options.
    pub async fn push_with<V: Serialize + ?Sized>(
        &self,
        value: &V,
        options: RequestOptions,
    ) -> Result<Reference, Error> {
        let body = encode(value)?;
        let resp = self
            .call(Method::POST, self.url.clone(), Some(body), options.params)
            .await?;
        let created: PushResponse = serde_json::from_slice(&resp)?;
        Ok(self.child(&created.name))
    }

    /// Overwrite the value at `path` below this location.
    pub async fn set<V: Serialize + ?Sized>(&self, path: &str, value: &V) -> Result<Reference, Error> {
        self.set_with(path, value, RequestOptions::default()).await
    }

    /// Overwrite the value at `path` below this location, with options.
    pub async fn set_with<V: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &V,
        options: RequestOptions,
    ) -> Result<Reference, Error> {
        let target = self.child(path);
        let body = encode(value)?;
        self.call(Method::PUT, target.url.clone(), Some(body), options.params)
            .await?;
        Ok(target)
    }

    /// Update the children named in `value` at `path`, leaving others intact.
    pub async fn update<V: Serialize + ?Sized>(&self, path: &str, value: &V) -> Result<(), Error> {
        self.update_with(path, value, RequestOptions::default()).await
    }

    /// Partial update with options.
    pub async fn update_with<V: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &V,
        options: RequestOptions,
    ) -> Result<(), Error> {
        let body = encode(value)?;
        self.call(Method::PATCH, join(&self.url, path), Some(body), options.params)
            .await?;
        Ok(())
    }

    /// Delete the data at `path` below this location.
    pub async fn remove(&self, path: &str) -> Result<(), Error> {
        self.remove_with(path, RequestOptions::default()).await
    }

    /// Delete with options.
    pub async fn remove_with(&self, path: &str, options: RequestOptions) -> Result<(), Error> {
        self.call(Method::DELETE, join(&self.url, path), None, options.params)
            .await?;
        Ok(())
    }

    /// Read the database security rules.
    pub async fn rules(&self) -> Result<Rules, Error> {
        self.rules_with(RequestOptions::default()).await
    }

    /// Read the security rules with options.
    pub async fn rules_with(&self, options: RequestOptions) -> Result<Rules, Error> {
        let body = self
            .call(Method::GET, join(&self.url, RULES_PATH), None, options.params)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Replace the database security rules.
    pub async fn set_rules(&self, rules: &Rules) -> Result<(), Error> {
        self.set_rules_with(rules, RequestOptions::default()).await
    }

    /// Replace the security rules with options.
    pub async fn set_rules_with(&self, rules: &Rules, options: RequestOptions) -> Result<(), Error> {
        let body = encode(rules)?;
        self.call(Method::PUT, join(&self.url, RULES_PATH), Some(body), options.params)
            .await?;
        Ok(())
    }

    /// Watch this location, decoding each change into a [`Document`].
    ///
    /// See [`watch_with`](Self::watch_with).
    pub async fn watch(&self, stop: oneshot::Receiver<()>) -> Result<EventReceiver<Document>, Error> {
        self.watch_with(DocumentUnmarshaller, stop).await
    }

    /// Watch this location, decoding each change into `T` with serde.
    pub async fn watch_as<T>(&self, stop: oneshot::Receiver<()>) -> Result<EventReceiver<T>, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.watch_with(JsonUnmarshaller::<T>::new(), stop).await
    }

    /// Stream changes to this location.
    ///
    /// Returns once the connection is established; connection failures are
    /// returned here. Events then arrive on the channel in the order the
    /// server sent them. Per-event decoding failures are reported in
    /// [`ChangeEvent::decode_error`](crate::ChangeEvent::decode_error) and do
    /// not end the stream. The last event before the channel closes is the
    /// terminal one ([`ChangeEvent::is_terminal`](crate::ChangeEvent::is_terminal)).
    ///
    /// Send `()` on, or drop, the sender paired with `stop` to end the watch.
    pub async fn watch_with<T>(
        &self,
        unmarshaller: impl Unmarshaller<T>,
        stop: oneshot::Receiver<()>,
    ) -> Result<EventReceiver<T>, Error>
    where
        T: Send + 'static,
    {
        session::open_stream(
            self.client.transport.as_ref(),
            &self.url,
            self.client.auth(),
            self.params.clone(),
            EventDecoder::new(unmarshaller),
            stop,
        )
        .await
    }

    async fn call(
        &self,
        method: Method,
        url: String,
        body: Option<Bytes>,
        params: QueryParams,
    ) -> Result<Bytes, Error> {
        let mut request = ApiRequest::new(method, url)
            .auth(self.client.auth())
            .params(params);
        if let Some(body) = body {
            request = request.body(body);
        }
        self.client.transport.call(request).await
    }
}

/// Options for a single write or rules request.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub params: QueryParams,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter. An `auth` parameter overrides the client token.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.set(key, value);
        self
    }
}

fn encode<V: Serialize + ?Sized>(value: &V) -> Result<Bytes, Error> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Append `path` to `base`, normalizing the slashes between them.
pub(crate) fn join(base: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path)
}
