//! Client and configuration.

use crate::config::TransportConfig;
use crate::error::Error;
use crate::reference::Reference;
use crate::retry::RetryConfig;
use crate::transport::{HttpTransport, Transport};
use crate::types::QueryParams;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// A Firebase Realtime Database client.
///
/// The client is cloneable and can be shared across threads. Clones, and
/// every [`Reference`] derived from them, share the transport and the auth
/// token.
#[derive(Clone)]
pub struct Client {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) base_url: Option<String>,
    auth: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("has_auth", &self.auth.read().is_some())
            .finish()
    }
}

impl Client {
    /// Create a client for the database at `base_url` with default settings.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client fails to build. Use `Client::builder().build()`
    /// for fallible construction.
    pub fn new(base_url: impl Into<String>) -> Self {
        ClientBuilder::new()
            .base_url(base_url)
            .build()
            .expect("Failed to build default HTTP client")
    }

    /// Create a client builder for customization.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Reference to the database root.
    pub fn root(&self) -> Reference {
        self.reference("")
    }

    /// Create a reference to a location.
    ///
    /// No network request is made until an operation is called.
    ///
    /// The url can be:
    /// - A full URL: "https://my-app.firebaseio.com/users"
    /// - A path (if base_url was set): "/users"
    pub fn reference(&self, url: &str) -> Reference {
        let full_url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if let Some(base) = &self.base_url {
            crate::reference::join(base, url)
        } else {
            url.to_string()
        };

        Reference {
            url: full_url,
            client: self.clone(),
            params: QueryParams::new(),
            order: None,
        }
    }

    /// Current auth token, if any.
    pub fn auth(&self) -> Option<String> {
        self.auth.read().clone()
    }

    /// Replace the auth token for every reference derived from this client.
    ///
    /// Open watches keep the token they were opened with; after an
    /// `auth_revoked` event, set a fresh token and watch again.
    pub fn set_auth(&self, token: impl Into<String>) {
        *self.auth.write() = Some(token.into());
    }

    /// Stop sending an auth token.
    pub fn clear_auth(&self) {
        *self.auth.write() = None;
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

/// Builder for configuring a Client.
#[must_use = "builders do nothing unless you call .build()"]
pub struct ClientBuilder {
    base_url: Option<String>,
    auth: Option<String>,
    config: TransportConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Create a new client builder with default [`TransportConfig`].
    pub fn new() -> Self {
        Self {
            base_url: None,
            auth: None,
            config: TransportConfig::default(),
            transport: None,
        }
    }

    /// Set the database URL that relative paths resolve against.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the auth token sent as the `auth` query parameter.
    pub fn auth(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(token.into());
        self
    }

    /// Replace the whole transport configuration.
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the timeout for request/response calls.
    pub fn read_write_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_write_timeout = timeout;
        self
    }

    /// Bound the lifetime of watch connections.
    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.config.stream_timeout = Some(timeout);
        self
    }

    /// Set the retry policy for request/response calls.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Use a custom transport instead of the reqwest-backed one.
    ///
    /// The transport configuration is ignored when a transport is supplied.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    ///
    /// Returns an error if the underlying HTTP client fails to build
    /// (e.g., due to TLS configuration issues).
    pub fn build(self) -> Result<Client, Error> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config)?),
        };

        Ok(Client {
            transport,
            base_url: self.base_url,
            auth: Arc::new(RwLock::new(self.auth)),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_resolves_relative_paths() {
        let client = Client::new("https://db.test");
        assert_eq!(client.reference("/users/bob").url(), "https://db.test/users/bob");
        assert_eq!(client.reference("users").url(), "https://db.test/users");
        assert_eq!(client.reference("http://other.test/x").url(), "http://other.test/x");
        assert_eq!(client.root().url(), "https://db.test");
    }

    #[test]
    fn test_auth_is_shared_between_clones() {
        let client = Client::builder()
            .base_url("https://db.test")
            .auth("first")
            .build()
            .unwrap();
        let clone = client.clone();

        clone.set_auth("second");
        assert_eq!(client.auth().as_deref(), Some("second"));

        client.clear_auth();
        assert_eq!(clone.auth(), None);
    }
}
