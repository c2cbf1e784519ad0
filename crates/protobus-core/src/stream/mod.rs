// ── Signal subscriptions ──
//
// Subscription types for consuming signals emitted on a `LocalBus`.

mod filter;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::bus::Signal;

pub use filter::SignalFilter;

/// A subscription to bus signals.
///
/// Only signals emitted after the subscription was created are seen.
/// A subscriber that falls behind the channel capacity skips the
/// oldest signals and logs how many it lost.
pub struct SignalStream {
    receiver: broadcast::Receiver<Arc<Signal>>,
    filter: SignalFilter,
}

impl SignalStream {
    pub(crate) fn new(receiver: broadcast::Receiver<Arc<Signal>>) -> Self {
        Self {
            receiver,
            filter: SignalFilter::All,
        }
    }

    /// Only yield signals matching `filter`.
    #[must_use]
    pub fn filtered(mut self, filter: SignalFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Wait for the next matching signal.
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<Arc<Signal>> {
        loop {
            match self.receiver.recv().await {
                Ok(signal) if self.filter.matches(&signal) => return Some(signal),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "signal subscriber lagged"),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching signal already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Signal>> {
        loop {
            match self.receiver.try_recv() {
                Ok(signal) if self.filter.matches(&signal) => return Some(signal),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "signal subscriber lagged"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every matching signal already queued.
    pub fn drain(&mut self) -> Vec<Arc<Signal>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> SignalBroadcastStream {
        SignalBroadcastStream {
            inner: BroadcastStream::new(self.receiver),
            filter: self.filter,
        }
    }
}

/// `Stream` adapter backed by a `broadcast::Receiver`.
pub struct SignalBroadcastStream {
    inner: BroadcastStream<Arc<Signal>>,
    filter: SignalFilter,
}

impl Stream for SignalBroadcastStream {
    type Item = Arc<Signal>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Both fields are Unpin, so the adapter is too.
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(signal))) => {
                    if this.filter.matches(&signal) {
                        return Poll::Ready(Some(signal));
                    }
                }
                Poll::Ready(Some(Err(lagged))) => warn!(error = %lagged, "signal stream lagged"),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
