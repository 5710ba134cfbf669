//! Bridges a [`reqwest_eventsource::EventSource`] into the plain
//! `Stream<Item = Result<Bytes, E>>` that [`crate::types::body::wrap_stream`]
//! expects, re-framing each SSE message back into `data: ...\n\n` wire
//! bytes so the client sees the exact stream shape the upstream sent.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, thiserror::Error)]
pub enum SseError {
    #[error("upstream stream error: {0}")]
    Upstream(#[from] reqwest_eventsource::Error),
}

/// What the first poll of a freshly opened `EventSource` told us, used to
/// classify the circuit breaker outcome before any bytes reach the
/// client — mirroring how a buffered attempt inspects its status code.
pub enum FirstEvent {
    /// Connected; nothing to forward yet (or this was just the `Open`
    /// signal, already consumed).
    Connected,
    /// The upstream sent at least one real message, included here so it
    /// isn't lost when the background forwarder takes over.
    Message(String),
    /// Upstream rejected the request outright.
    InvalidStatus(http::StatusCode),
    /// Any other transport-level failure.
    TransportError,
}

pub async fn poll_first_event(source: &mut EventSource) -> FirstEvent {
    match source.next().await {
        None => FirstEvent::Connected,
        Some(Ok(Event::Open)) => FirstEvent::Connected,
        Some(Ok(Event::Message(message))) => FirstEvent::Message(message.data),
        Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, _))) => {
            FirstEvent::InvalidStatus(status)
        }
        Some(Err(_)) => FirstEvent::TransportError,
    }
}

/// Drains `source` in the background, forwarding each message as raw SSE
/// wire bytes. `leading` is re-emitted first when it carries a message
/// already consumed by [`poll_first_event`]. Stops cleanly on `[DONE]`, a
/// genuine stream end, or the first real transport error.
pub fn into_byte_stream(
    mut source: EventSource,
    leading: Option<String>,
) -> impl Stream<Item = Result<Bytes, SseError>> + Unpin + Send + 'static {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        if let Some(data) = leading {
            if data != "[DONE]" {
                let frame = format!("data: {data}\n\n");
                if tx.send(Ok(Bytes::from(frame))).is_err() {
                    source.close();
                    return;
                }
            }
        }

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => {
                    if message.data == "[DONE]" {
                        break;
                    }
                    let frame = format!("data: {}\n\n", message.data);
                    if tx.send(Ok(Bytes::from(frame))).is_err() {
                        break;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(err) => {
                    let _ = tx.send(Err(SseError::Upstream(err)));
                    break;
                }
            }
        }
        source.close();
    });

    UnboundedReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    // `EventSource` can only be constructed from a live `RequestBuilder`,
    // so the forwarding behavior above is covered end to end by the
    // dispatcher's streaming integration tests against the mock server
    // rather than in isolation here.
}
