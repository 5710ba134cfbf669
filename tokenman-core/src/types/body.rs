//! Splits an upstream byte stream into a client-facing forward path and a
//! capped accumulator used only for post-hoc accounting (token counting,
//! cache-write eligibility). Forwarding never stops because the
//! accumulator filled up; the client always receives the full stream.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// The outcome of an accumulated stream: the bytes collected up to
/// `max_size`, and whether the cap was hit before the stream ended.
#[derive(Debug, Clone)]
pub struct Accumulated {
    pub bytes: Bytes,
    pub truncated: bool,
}

pub struct StreamHandle {
    /// Forwarded chunks, ready to hand to `axum::body::Body::from_stream`.
    pub forward: UnboundedReceiverStream<Result<Bytes, std::io::Error>>,
    /// Resolves once the upstream stream ends, times out, or errors.
    pub accumulated: oneshot::Receiver<Accumulated>,
}

/// Consumes `upstream` chunk by chunk, forwarding each chunk immediately
/// while separately appending it to a size-capped accumulator. A global
/// deadline bounds the total stream lifetime; on expiry the upstream
/// reader is dropped and the accumulator is finalized with what it has.
pub fn wrap_stream<S, E>(
    mut upstream: S,
    max_response_size: usize,
    deadline: Duration,
) -> StreamHandle
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (forward_tx, forward_rx) = mpsc::unbounded_channel();
    let (acc_tx, acc_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut acc = BytesMut::new();
        let mut truncated = false;
        let read_loop = async {
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(chunk) => {
                        if acc.len() < max_response_size {
                            let remaining = max_response_size - acc.len();
                            if chunk.len() <= remaining {
                                acc.extend_from_slice(&chunk);
                            } else {
                                acc.extend_from_slice(&chunk[..remaining]);
                                truncated = true;
                            }
                        } else {
                            truncated = true;
                        }
                        if forward_tx.send(Ok(chunk)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "upstream stream read failed");
                        let _ = forward_tx.send(Err(std::io::Error::other(
                            err.to_string(),
                        )));
                        break;
                    }
                }
            }
        };

        match tokio::time::timeout(deadline, read_loop).await {
            Ok(()) => {}
            Err(_) => {
                tracing::warn!("streaming deadline exceeded, closing upstream reader");
                truncated = true;
                let _ = forward_tx.send(Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "streaming deadline exceeded",
                )));
            }
        }

        let _ = acc_tx.send(Accumulated {
            bytes: acc.freeze(),
            truncated,
        });
    });

    StreamHandle {
        forward: UnboundedReceiverStream::new(forward_rx),
        accumulated: acc_rx,
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn forwards_all_bytes_even_past_cap() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"0123456789")),
            Ok(Bytes::from_static(b"abcdefghij")),
        ];
        let handle = wrap_stream(
            stream::iter(chunks),
            12,
            Duration::from_secs(5),
        );
        let forwarded: Vec<_> = handle.forward.collect().await;
        let total: usize = forwarded
            .iter()
            .map(|r| r.as_ref().unwrap().len())
            .sum();
        assert_eq!(total, 20);

        let acc = handle.accumulated.await.unwrap();
        assert_eq!(acc.bytes.len(), 12);
        assert!(acc.truncated);
    }

    #[tokio::test]
    async fn no_truncation_under_cap() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"hello"))];
        let handle = wrap_stream(stream::iter(chunks), 1024, Duration::from_secs(5));
        let _: Vec<_> = handle.forward.collect().await;
        let acc = handle.accumulated.await.unwrap();
        assert_eq!(acc.bytes.as_ref(), b"hello");
        assert!(!acc.truncated);
    }
}
