//! Change events and their decoding from raw SSE frames.

use crate::error::{BoxError, DecodeError, WatchError};
use crate::sse::RawFrame;
use crate::types::Document;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type of a watch event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Data at `path` was replaced.
    Put,
    /// Children of `path` were updated.
    Patch,
    /// Heartbeat; never delivered to callers.
    KeepAlive,
    /// Read permission on the watched location was revoked.
    Cancel,
    /// The auth token expired or was revoked.
    AuthRevoked,
    /// An event type this client does not know.
    Other(String),
    /// The connection ended. Not a wire event.
    Closed,
}

impl EventKind {
    /// Parse from the `event:` line
    pub fn parse(s: &str) -> Self {
        match s {
            "put" => EventKind::Put,
            "patch" => EventKind::Patch,
            "keep-alive" => EventKind::KeepAlive,
            "cancel" => EventKind::Cancel,
            "auth_revoked" => EventKind::AuthRevoked,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Put => "put",
            EventKind::Patch => "patch",
            EventKind::KeepAlive => "keep-alive",
            EventKind::Cancel => "cancel",
            EventKind::AuthRevoked => "auth_revoked",
            EventKind::Other(s) => s.as_str(),
            EventKind::Closed => "",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded watch event.
///
/// ## Field semantics
///
/// | `kind`            | populated fields                                      |
/// |-------------------|-------------------------------------------------------|
/// | `Put` / `Patch`   | `path`, `raw_payload`, then `object` or `decode_error` |
/// | `Cancel`          | `error` = [`WatchError::PermissionDenied`]             |
/// | `AuthRevoked`     | `error` = [`WatchError::AuthRevoked`]                  |
/// | `Other(_)`        | `raw_payload` (the undecoded data line)                |
/// | `Closed`          | `error` if the connection ended abnormally             |
///
/// An event with `error` set, or of kind `Closed`, is always the last one on
/// its channel.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ChangeEvent<T> {
    pub kind: EventKind,
    /// Path of the changed location, relative to the watched reference.
    pub path: String,
    /// Undecoded JSON of the change's `data` field.
    pub raw_payload: Bytes,
    /// The unmarshalled payload.
    pub object: Option<T>,
    /// Non-fatal failure to decode this event.
    pub decode_error: Option<DecodeError>,
    /// Fatal failure that ended the stream.
    pub error: Option<WatchError>,
}

impl<T> ChangeEvent<T> {
    fn empty(kind: EventKind) -> Self {
        Self {
            kind,
            path: String::new(),
            raw_payload: Bytes::new(),
            object: None,
            decode_error: None,
            error: None,
        }
    }

    /// The terminal event of a stream whose connection ended.
    pub(crate) fn closed(error: Option<WatchError>) -> Self {
        Self {
            error,
            ..Self::empty(EventKind::Closed)
        }
    }

    fn fatal(kind: EventKind, error: WatchError) -> Self {
        Self {
            error: Some(error),
            ..Self::empty(kind)
        }
    }

    /// Whether this is the final event of its stream.
    pub fn is_terminal(&self) -> bool {
        self.error.is_some() || self.kind == EventKind::Closed
    }
}

/// Converts the `data` of a `put`/`patch` event into `T`.
///
/// Implemented for closures `Fn(&str, &[u8]) -> Result<T, BoxError>`, which
/// receive the changed path and the raw JSON bytes.
pub trait Unmarshaller<T>: Send + Sync + 'static {
    fn unmarshal(&self, path: &str, data: &[u8]) -> Result<T, BoxError>;
}

impl<T, F> Unmarshaller<T> for F
where
    F: Fn(&str, &[u8]) -> Result<T, BoxError> + Send + Sync + 'static,
{
    fn unmarshal(&self, path: &str, data: &[u8]) -> Result<T, BoxError> {
        self(path, data)
    }
}

/// Decodes event data into any `serde` type.
pub struct JsonUnmarshaller<T>(PhantomData<fn() -> T>);

impl<T> JsonUnmarshaller<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonUnmarshaller<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + 'static> Unmarshaller<T> for JsonUnmarshaller<T> {
    fn unmarshal(&self, _path: &str, data: &[u8]) -> Result<T, BoxError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Default unmarshaller: decodes event data into a [`Document`].
///
/// A `null` payload (a deleted location) decodes as an empty document.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentUnmarshaller;

impl Unmarshaller<Document> for DocumentUnmarshaller {
    fn unmarshal(&self, _path: &str, data: &[u8]) -> Result<Document, BoxError> {
        let doc: Option<Document> = serde_json::from_slice(data)?;
        Ok(doc.unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct Envelope<'a> {
    path: String,
    #[serde(borrow)]
    data: &'a RawValue,
}

/// Outcome of decoding one frame.
#[derive(Debug)]
pub enum Decoded<T> {
    /// Nothing to deliver (keep-alive).
    Skip,
    /// Deliver and keep reading.
    Event(ChangeEvent<T>),
    /// Deliver, then end the stream.
    Fatal(ChangeEvent<T>),
}

/// Turns raw frames into [`ChangeEvent`]s.
pub struct EventDecoder<T> {
    unmarshaller: Arc<dyn Unmarshaller<T>>,
}

impl<T> Clone for EventDecoder<T> {
    fn clone(&self) -> Self {
        Self {
            unmarshaller: Arc::clone(&self.unmarshaller),
        }
    }
}

impl<T: 'static> EventDecoder<T> {
    pub fn new(unmarshaller: impl Unmarshaller<T>) -> Self {
        Self {
            unmarshaller: Arc::new(unmarshaller),
        }
    }

    pub fn decode(&self, frame: RawFrame) -> Decoded<T> {
        let kind = EventKind::parse(&frame.event);
        match kind {
            EventKind::Put | EventKind::Patch => Decoded::Event(self.decode_change(kind, &frame.data)),
            EventKind::KeepAlive => Decoded::Skip,
            EventKind::Cancel => Decoded::Fatal(ChangeEvent::fatal(kind, WatchError::PermissionDenied)),
            EventKind::AuthRevoked => Decoded::Fatal(ChangeEvent::fatal(kind, WatchError::AuthRevoked)),
            EventKind::Other(_) | EventKind::Closed => Decoded::Event(ChangeEvent {
                raw_payload: Bytes::from(frame.data),
                ..ChangeEvent::empty(kind)
            }),
        }
    }

    fn decode_change(&self, kind: EventKind, data: &str) -> ChangeEvent<T> {
        let mut event = ChangeEvent::empty(kind);

        let envelope: Envelope<'_> = match serde_json::from_str(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                event.decode_error = Some(DecodeError::Envelope(e.to_string()));
                return event;
            }
        };

        event.path = envelope.path;
        event.raw_payload = Bytes::copy_from_slice(envelope.data.get().as_bytes());

        match self.unmarshaller.unmarshal(&event.path, &event.raw_payload) {
            Ok(object) => event.object = Some(object),
            Err(e) => event.decode_error = Some(DecodeError::Payload(e.to_string())),
        }

        event
    }
}

impl Default for EventDecoder<Document> {
    fn default() -> Self {
        Self::new(DocumentUnmarshaller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Counter {
        a: i64,
    }

    fn counter_decoder() -> EventDecoder<Counter> {
        EventDecoder::new(JsonUnmarshaller::<Counter>::new())
    }

    fn expect_event<T>(decoded: Decoded<T>) -> ChangeEvent<T> {
        match decoded {
            Decoded::Event(event) => event,
            Decoded::Fatal(_) => panic!("unexpected fatal event"),
            Decoded::Skip => panic!("unexpected skip"),
        }
    }

    #[test]
    fn test_put_with_custom_type() {
        let frame = RawFrame::new("put", r#"{"path": "1/2/3", "data": {"a":1}}"#);
        let event = expect_event(counter_decoder().decode(frame));

        assert_eq!(event.kind, EventKind::Put);
        assert_eq!(event.path, "1/2/3");
        assert_eq!(event.object, Some(Counter { a: 1 }));
        assert_eq!(&event.raw_payload[..], br#"{"a":1}"#);
        assert!(event.decode_error.is_none());
        assert!(event.error.is_none());
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_patch_with_default_document() {
        let frame = RawFrame::new("patch", r#"{"path":"/users","data":{"bob":{"age":3}}}"#);
        let event = expect_event(EventDecoder::default().decode(frame));

        assert_eq!(event.kind, EventKind::Patch);
        assert_eq!(event.path, "/users");
        let doc = event.object.unwrap();
        assert_eq!(doc["bob"]["age"], 3);
    }

    #[test]
    fn test_null_data_decodes_to_empty_document() {
        let frame = RawFrame::new("put", r#"{"path":"/gone","data":null}"#);
        let event = expect_event(EventDecoder::default().decode(frame));

        assert_eq!(event.path, "/gone");
        assert_eq!(event.object, Some(Document::new()));
        assert_eq!(&event.raw_payload[..], b"null");
    }

    #[test]
    fn test_malformed_envelope_is_non_fatal() {
        let frame = RawFrame::new("put", r#"{"path": "/a", "data": {"a": }"#);
        let event = expect_event(counter_decoder().decode(frame));

        assert_eq!(event.path, "");
        assert!(event.raw_payload.is_empty());
        assert!(event.object.is_none());
        assert!(matches!(event.decode_error, Some(DecodeError::Envelope(_))));
        assert!(event.error.is_none());
    }

    #[test]
    fn test_unmarshaller_error_keeps_envelope_fields() {
        let decoder: EventDecoder<Counter> =
            EventDecoder::new(|_path: &str, _data: &[u8]| -> Result<Counter, BoxError> {
                Err("nope".into())
            });
        let frame = RawFrame::new("put", r#"{"path":"/a","data":{"a":1}}"#);
        let event = expect_event(decoder.decode(frame));

        assert_eq!(event.path, "/a");
        assert_eq!(&event.raw_payload[..], br#"{"a":1}"#);
        assert!(event.object.is_none());
        assert_eq!(event.decode_error, Some(DecodeError::Payload("nope".to_string())));
    }

    #[test]
    fn test_unmarshaller_receives_path() {
        let decoder: EventDecoder<String> =
            EventDecoder::new(|path: &str, data: &[u8]| -> Result<String, BoxError> {
                Ok(format!("{}={}", path, String::from_utf8_lossy(data)))
            });
        let frame = RawFrame::new("patch", r#"{"path":"/x","data":true}"#);
        let event = expect_event(decoder.decode(frame));
        assert_eq!(event.object.as_deref(), Some("/x=true"));
    }

    #[test]
    fn test_keep_alive_is_skipped() {
        let decoded = EventDecoder::default().decode(RawFrame::new("keep-alive", "null"));
        assert!(matches!(decoded, Decoded::Skip));
    }

    #[test]
    fn test_cancel_and_auth_revoked_are_fatal() {
        let decoder = EventDecoder::default();

        match decoder.decode(RawFrame::new("cancel", "null")) {
            Decoded::Fatal(event) => {
                assert_eq!(event.kind, EventKind::Cancel);
                assert_eq!(event.error, Some(WatchError::PermissionDenied));
                assert!(event.is_terminal());
            }
            other => panic!("expected fatal, got {:?}", other),
        }

        match decoder.decode(RawFrame::new("auth_revoked", "null")) {
            Decoded::Fatal(event) => {
                assert_eq!(event.kind, EventKind::AuthRevoked);
                assert_eq!(event.error, Some(WatchError::AuthRevoked));
            }
            other => panic!("expected fatal, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_is_forwarded_undecoded() {
        let event = expect_event(EventDecoder::default().decode(RawFrame::new("rules_changed", "{\"x\":1}")));
        assert_eq!(event.kind, EventKind::Other("rules_changed".to_string()));
        assert_eq!(&event.raw_payload[..], b"{\"x\":1}");
        assert!(event.object.is_none());
        assert!(event.decode_error.is_none());
    }

    #[test]
    fn test_event_kind_round_trip_names() {
        for name in ["put", "patch", "keep-alive", "cancel", "auth_revoked"] {
            assert_eq!(EventKind::parse(name).as_str(), name);
        }
    }
}
