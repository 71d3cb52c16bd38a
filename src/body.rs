// Request bodies that report how many bytes the HTTP layer has pulled from
// them, so the progress bar moves while a request is on the wire instead of
// jumping once it has finished.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use aws_smithy_types::body::{Error as BodyError, SdkBody};
use bytes::Bytes;
use futures::channel::mpsc::UnboundedSender;
use http_body::{Body, Frame, SizeHint};

/// Wrap `body` so every byte read is sent on `tx` as a delta.
///
/// The SDK rebuilds bodies for retries. Each rebuilt copy counts from zero
/// but only reports bytes past what an earlier attempt already reported, so
/// the deltas always sum to the body length.
pub fn counted(body: SdkBody, tx: UnboundedSender<u64>) -> SdkBody {
    let reported = Arc::new(AtomicU64::new(0));
    if body.try_clone().is_none() {
        return SdkBody::from_body_1_x(Counting::new(body, reported, tx));
    }
    SdkBody::retryable(move || match body.try_clone() {
        Some(inner) => SdkBody::from_body_1_x(Counting::new(inner, reported.clone(), tx.clone())),
        None => SdkBody::taken(),
    })
}

struct Counting {
    inner: SdkBody,
    read: u64,
    reported: Arc<AtomicU64>,
    tx: UnboundedSender<u64>,
}

impl Counting {
    fn new(inner: SdkBody, reported: Arc<AtomicU64>, tx: UnboundedSender<u64>) -> Self {
        Counting {
            inner,
            read: 0,
            reported,
            tx,
        }
    }

    fn record(&mut self, n: usize) {
        self.read += n as u64;
        let before = self.reported.fetch_max(self.read, Ordering::Relaxed);
        if self.read > before {
            // The receiver is gone once the request has been settled.
            let _ = self.tx.unbounded_send(self.read - before);
        }
    }
}

impl Body for Counting {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let Some(data) = frame.data_ref() {
                this.record(data.len());
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        Body::is_end_stream(&self.inner)
    }

    fn size_hint(&self) -> SizeHint {
        Body::size_hint(&self.inner)
    }
}
