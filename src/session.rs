//! Watch stream sessions.
//!
//! A session owns one streaming connection and two tasks:
//!
//! - the reader, which drives bytes through [`FrameReader`] and
//!   [`EventDecoder`] into the event channel, and
//! - the watchdog, which waits for the caller's stop signal and raises the
//!   session's shutdown flag.
//!
//! The reader races every read and every channel send against that flag, so
//! a stop drops the connection at once even while a slow consumer holds the
//! channel full. The reader owns the only sender of the channel, so the
//! channel closes exactly once, when the reader exits, whatever the reason.

use crate::error::{Error, WatchError};
use crate::event::{ChangeEvent, Decoded, EventDecoder};
use crate::sse::FrameReader;
use crate::transport::{ApiRequest, Transport};
use crate::types::QueryParams;
use bytes::Bytes;
use futures::Stream;
use http::Method;
use tokio::sync::{mpsc, oneshot, watch};

/// Capacity of a watch's event channel.
///
/// A consumer that falls this far behind blocks the reader, and through it
/// the socket; events are never dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Receiving end of a watch.
pub type EventReceiver<T> = mpsc::Receiver<ChangeEvent<T>>;

/// Open a watch on `url` and start its session.
///
/// Connection failures (DNS, TLS, refused, non-success status) are returned
/// here and no session is started. On success the returned channel yields
/// events in wire order and closes after its terminal event.
///
/// `stop` ends the session when it receives a value or when its sender is
/// dropped. The connection is released as soon as the stop is seen; the
/// `Cancelled` terminal event follows once the consumer has room for it.
/// Stopping a session that already ended does nothing.
///
/// Must be called within a Tokio runtime.
pub async fn open_stream<T>(
    transport: &dyn Transport,
    url: &str,
    auth: Option<String>,
    params: QueryParams,
    decoder: EventDecoder<T>,
    stop: oneshot::Receiver<()>,
) -> Result<EventReceiver<T>, Error>
where
    T: Send + 'static,
{
    let request = ApiRequest::new(Method::GET, url).auth(auth).params(params);
    let body = transport.stream(request).await?;

    #[cfg(feature = "tracing")]
    tracing::debug!(url, "watch stream opened");

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(watchdog(stop, shutdown_tx));
    tokio::spawn(run_reader(FrameReader::new(body), decoder, tx, shutdown_rx));

    Ok(rx)
}

/// Raise the shutdown flag on stop; exit quietly once the reader is gone.
async fn watchdog(stop: oneshot::Receiver<()>, shutdown: watch::Sender<bool>) {
    tokio::select! {
        _ = stop => {
            let _ = shutdown.send(true);
        }
        _ = shutdown.closed() => {}
    }
}

/// Resolves once shutdown has been requested.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let watchdog_gone = shutdown.wait_for(|&stop| stop).await.is_err();
    if watchdog_gone {
        // Watchdog gone without a stop: nothing can request one any more.
        std::future::pending::<()>().await;
    }
}

async fn run_reader<S, T>(
    mut frames: FrameReader<S>,
    decoder: EventDecoder<T>,
    tx: mpsc::Sender<ChangeEvent<T>>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Stream<Item = Result<Bytes, Error>> + Unpin,
    T: Send + 'static,
{
    let cancelled = || ChangeEvent::closed(Some(WatchError::Cancelled));

    let last = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => break cancelled(),
            next = frames.next_frame() => next,
        };

        match next {
            Ok(Some(frame)) => match decoder.decode(frame) {
                Decoded::Skip => {}
                Decoded::Event(event) => {
                    let sent = tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut shutdown) => break cancelled(),
                        sent = tx.send(event) => sent,
                    };
                    if sent.is_err() {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("watch receiver dropped, closing stream");
                        return;
                    }
                }
                Decoded::Fatal(event) => break event,
            },
            Ok(None) => break ChangeEvent::closed(None),
            Err(e) => break ChangeEvent::closed(Some(WatchError::Transport(e.to_string()))),
        }
    };

    // Release the connection before waiting on the consumer.
    drop(frames);

    #[cfg(feature = "tracing")]
    tracing::debug!(kind = %last.kind, error = ?last.error, "watch stream ended");

    let _ = tx.send(last).await;
}
