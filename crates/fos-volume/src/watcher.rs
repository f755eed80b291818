//! DOM Watcher
//!
//! Watches the document for inserted media and `src` changes and
//! re-applies the desired volume once mutations quiet down. Single-page
//! navigations add nodes in bursts; a burst yields one apply.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fos_dom::{MutationCallback, MutationObserver, MutationObserverInit, MutationRecord};
use fos_media::MediaDocument;
use smol::channel::{self, Receiver, Sender, TrySendError};
use smol::future::FutureExt;
use smol::{Executor, Task, Timer};

use crate::lock;

/// Coalesces notifications: each one restarts the quiet window, and
/// `fire` runs once the window passes with no further notification.
///
/// The loop ends when every sender is gone or `fire` returns false.
pub fn spawn_debounced<F, Fut>(
    executor: &Executor<'static>,
    window: Duration,
    notifications: Receiver<()>,
    mut fire: F,
) -> Task<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    executor.spawn(async move {
        while notifications.recv().await.is_ok() {
            loop {
                let next = async { Some(notifications.recv().await.is_ok()) };
                let quiet = async {
                    Timer::after(window).await;
                    None
                };
                match next.or(quiet).await {
                    Some(true) => continue,
                    Some(false) => return,
                    None => break,
                }
            }
            if !fire().await {
                return;
            }
        }
    })
}

/// Notification side of a debounced trigger
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<()>,
}

impl Notifier {
    /// Create a notifier and the receiver a debounce loop consumes
    pub fn channel() -> (Self, Receiver<()>) {
        // One queued notification is enough to restart the window
        let (tx, rx) = channel::bounded(1);
        (Self { tx }, rx)
    }

    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => tracing::trace!("debounce loop gone"),
        }
    }
}

/// Mutation observer over the document body
pub struct DomWatcher {
    observer: Arc<MutationObserver>,
    task: Mutex<Option<Task<()>>>,
}

impl std::fmt::Debug for DomWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomWatcher")
            .field("observer", &self.observer.id())
            .field("running", &self.is_watching())
            .finish()
    }
}

impl DomWatcher {
    /// Observe `document` and call `on_settled` after each burst of
    /// mutations that `is_relevant` accepts.
    ///
    /// `is_relevant` sees child list and `src` records and runs
    /// synchronously inside the mutation; `on_settled` runs on `executor`
    /// after the quiet window.
    pub fn start<N, F, Fut>(
        document: &MediaDocument,
        executor: &Executor<'static>,
        window: Duration,
        is_relevant: N,
        on_settled: F,
    ) -> Self
    where
        N: Fn(&[MutationRecord]) -> bool + Send + Sync + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let (notifier, notifications) = Notifier::channel();
        let callback: MutationCallback = Arc::new(move |records: &[MutationRecord]| {
            if is_relevant(records) {
                notifier.notify();
            }
        });

        let observer = MutationObserver::new(callback);
        observer.observe(document.body(), MutationObserverInit {
            child_list: true,
            attributes: true,
            subtree: true,
            attribute_filter: Some(vec!["src".into()]),
        });
        document.register_observer(&observer);

        let task = spawn_debounced(executor, window, notifications, on_settled);
        tracing::debug!(observer = observer.id(), window_ms = window.as_millis() as u64, "DOM watcher started");

        Self {
            observer,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.observer.is_observing() && lock(&self.task).is_some()
    }

    /// Disconnect the observer and cancel a pending apply
    pub fn stop(&self) {
        self.observer.disconnect();
        // Dropping a smol task cancels it
        if lock(&self.task).take().is_some() {
            tracing::debug!(observer = self.observer.id(), "DOM watcher stopped");
        }
    }
}
