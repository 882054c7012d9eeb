//! Firebase Realtime Database Rust Client
//!
//! A Rust client for the Firebase Realtime Database REST API: reads, writes,
//! security rules, and real-time watches over Server-Sent Events.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use firebase_client::Client;
//! use serde_json::json;
//! use tokio::sync::oneshot;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("https://my-app.firebaseio.com");
//!     let users = client.reference("/users");
//!
//!     // Write data
//!     users.set("bob", &json!({"age": 3})).await?;
//!
//!     // Watch for changes
//!     let (stop, stop_rx) = oneshot::channel();
//!     let mut events = users.watch(stop_rx).await?;
//!     while let Some(event) = events.recv().await {
//!         if let Some(err) = &event.error {
//!             eprintln!("watch ended: {}", err);
//!         } else if let Some(doc) = &event.object {
//!             println!("{} {}: {:?}", event.kind, event.path, doc);
//!         }
//!     }
//!
//!     let _ = stop.send(());
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod event;
mod reference;
mod retry;
mod session;
mod sse;
mod transport;
mod types;

pub use client::{Client, ClientBuilder};
pub use config::TransportConfig;
pub use error::{BoxError, DecodeError, Error, WatchError};
pub use event::{
    ChangeEvent, Decoded, DocumentUnmarshaller, EventDecoder, EventKind, JsonUnmarshaller,
    Unmarshaller,
};
pub use reference::{Reference, RequestOptions};
pub use retry::{JitterMode, RetryConfig};
pub use session::{open_stream, EventReceiver, EVENT_CHANNEL_CAPACITY};
pub use sse::{FrameParser, FrameReader, RawFrame};
pub use transport::{ApiRequest, ByteStream, HttpTransport, Transport};
pub use types::{Document, OrderBy, QueryParams, Rules};
