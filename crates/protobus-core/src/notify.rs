// ── Application callbacks ──
//
// Registry mutations never call application code directly. They enqueue
// a `Notification` and move on; a single worker task drains the queue
// and awaits the callbacks one at a time, so per-entity ordering is the
// enqueue order. The queue is unbounded: every mutation yields exactly
// one callback while the worker runs. A backlog past the configured
// threshold is logged, never dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::model::{Device, Item};

/// Hooks the application implements to react to registry changes.
///
/// Every method defaults to a no-op. Implementations may take as long as
/// they like; the registry never waits for them.
#[async_trait]
pub trait ProtocolCallbacks: Send + Sync + 'static {
    async fn add_device(&self, _device: Arc<Device>) {}

    async fn remove_device(&self, _device_id: String) {}

    async fn add_item(&self, _item: Item) {}

    async fn remove_item(&self, _device_id: String, _item_id: String) {}
}

/// A queued callback invocation.
#[derive(Debug, Clone)]
pub enum Notification {
    AddDevice(Arc<Device>),
    RemoveDevice(String),
    AddItem(Item),
    RemoveItem { device_id: String, item_id: String },
}

impl Notification {
    fn kind(&self) -> &'static str {
        match self {
            Self::AddDevice(_) => "add_device",
            Self::RemoveDevice(_) => "remove_device",
            Self::AddItem(_) => "add_item",
            Self::RemoveItem { .. } => "remove_item",
        }
    }

    async fn deliver(self, callbacks: &dyn ProtocolCallbacks) {
        match self {
            Self::AddDevice(device) => callbacks.add_device(device).await,
            Self::RemoveDevice(device_id) => callbacks.remove_device(device_id).await,
            Self::AddItem(item) => callbacks.add_item(item).await,
            Self::RemoveItem { device_id, item_id } => {
                callbacks.remove_item(device_id, item_id).await;
            }
        }
    }
}

/// Sending half of the notification queue. Cheap to clone; every
/// protocol in one tree shares the same notifier.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
    backlog: Arc<AtomicUsize>,
    warn_backlog: usize,
}

impl Notifier {
    /// Start the delivery worker on the current runtime.
    ///
    /// `warn_backlog` is the number of undelivered callbacks above which
    /// a warning is logged. The worker exits when `cancel` fires or once
    /// every `Notifier` clone has been dropped and the queue is drained.
    pub fn spawn(
        callbacks: Arc<dyn ProtocolCallbacks>,
        warn_backlog: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backlog = Arc::new(AtomicUsize::new(0));
        let handle = tokio::spawn(notify_task(callbacks, rx, Arc::clone(&backlog), cancel));
        let notifier = Self {
            tx,
            backlog,
            warn_backlog: warn_backlog.max(1),
        };
        (notifier, handle)
    }

    /// Number of queued callbacks not yet handed to the application.
    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::Acquire)
    }

    /// Enqueue without waiting. Only a stopped worker loses the
    /// notification.
    pub(crate) fn dispatch(&self, notification: Notification) {
        let kind = notification.kind();
        let pending = self.backlog.fetch_add(1, Ordering::AcqRel) + 1;
        if self.tx.send(notification).is_err() {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
            debug!(kind, "notifier stopped; callback dropped");
            return;
        }
        if pending == self.warn_backlog + 1 {
            warn!(kind, pending, "callback backlog above threshold; callbacks are falling behind");
        } else {
            trace!(kind, pending, "notification queued");
        }
    }
}

async fn notify_task(
    callbacks: Arc<dyn ProtocolCallbacks>,
    mut rx: mpsc::UnboundedReceiver<Notification>,
    backlog: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(notification) => {
                    backlog.fetch_sub(1, Ordering::AcqRel);
                    notification.deliver(callbacks.as_ref()).await;
                }
                None => break,
            },
        }
    }
    debug!("notifier worker exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProtocolCallbacks for Recorder {
        async fn remove_device(&self, device_id: String) {
            self.seen.lock().push(format!("-{device_id}"));
        }

        async fn remove_item(&self, device_id: String, item_id: String) {
            self.seen.lock().push(format!("-{device_id}/{item_id}"));
        }
    }

    #[tokio::test]
    async fn delivers_in_enqueue_order() {
        let recorder = Arc::new(Recorder::default());
        let (notifier, handle) = Notifier::spawn(recorder.clone(), 8, CancellationToken::new());

        notifier.dispatch(Notification::RemoveItem {
            device_id: "d1".into(),
            item_id: "i1".into(),
        });
        notifier.dispatch(Notification::RemoveDevice("d1".into()));
        drop(notifier);
        handle.await.unwrap();

        assert_eq!(*recorder.seen.lock(), vec!["-d1/i1", "-d1"]);
    }

    #[tokio::test]
    async fn cancel_stops_worker() {
        let cancel = CancellationToken::new();
        let (notifier, handle) = Notifier::spawn(Arc::new(Recorder::default()), 8, cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        // Enqueueing after the worker stopped is a silent drop.
        notifier.dispatch(Notification::RemoveDevice("d1".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_past_threshold_is_kept() {
        struct Slow {
            seen: AtomicUsize,
        }

        #[async_trait]
        impl ProtocolCallbacks for Slow {
            async fn remove_device(&self, _device_id: String) {
                tokio::time::sleep(Duration::from_secs(60)).await;
                self.seen.fetch_add(1, Ordering::SeqCst);
            }
        }

        let slow = Arc::new(Slow {
            seen: AtomicUsize::new(0),
        });
        let (notifier, handle) = Notifier::spawn(slow.clone(), 1, CancellationToken::new());
        for i in 0..10 {
            notifier.dispatch(Notification::RemoveDevice(format!("d{i}")));
        }
        assert!(notifier.backlog() >= 9);

        drop(notifier);
        handle.await.unwrap();
        assert_eq!(slow.seen.load(Ordering::SeqCst), 10);
    }
}
