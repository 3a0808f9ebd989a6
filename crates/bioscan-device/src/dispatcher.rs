//! Observer registration and event delivery.
//!
//! Events are queued by the client and delivered by a single dispatcher
//! task, so the observer is never invoked concurrently with itself and sees
//! events in the order they were queued. Registration changes travel through
//! the same queue: an observer installed after an event was queued does not
//! receive it, and one removed after an event was queued still does.
//!
//! ```text
//! DeviceClient ──┐
//!                ├──► Dispatch queue (mpsc) ──► Dispatcher task ──► Observer
//! Driver task  ──┘                                               └─► EventStream
//! ```

use crate::event::ClientEvent;
use futures::Stream;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Caller-supplied event sink.
///
/// The client holds only a weak reference to a registered observer; when the
/// observer is dropped, delivery stops and later events are discarded.
///
/// Closures of the right shape are observers too:
///
/// ```
/// use bioscan_device::{ClientEvent, Observer};
/// use std::sync::Arc;
///
/// let observer: Arc<dyn Observer> = Arc::new(|event: &ClientEvent| {
///     println!("{}", event.name());
/// });
/// observer.on_event(&ClientEvent::Connected);
/// ```
pub trait Observer: Send + Sync {
    /// Called once per event, on the dispatcher task. Must not block for long.
    fn on_event(&self, event: &ClientEvent);
}

impl<F> Observer for F
where
    F: Fn(&ClientEvent) + Send + Sync,
{
    fn on_event(&self, event: &ClientEvent) {
        self(event)
    }
}

/// Receiving end handed out by [`DeviceClient::subscribe`](crate::DeviceClient::subscribe).
///
/// Yields `None` once the stream has been replaced by another sink or the
/// client has been closed.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl EventStream {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = ClientEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ClientEvent>> {
        self.rx.poll_recv(cx)
    }
}

/// Where events currently go.
pub(crate) enum Sink {
    Observer(Weak<dyn Observer>),
    Stream(mpsc::UnboundedSender<ClientEvent>),
}

impl Sink {
    /// Create a stream sink and the stream that reads from it.
    pub(crate) fn stream() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Stream(tx), EventStream { rx })
    }

    /// Deliver one event. Returns `false` when the sink is gone.
    fn deliver(&self, event: &ClientEvent) -> bool {
        match self {
            Self::Observer(observer) => match observer.upgrade() {
                Some(observer) => {
                    observer.on_event(event);
                    true
                }
                None => false,
            },
            Self::Stream(tx) => tx.send(event.clone()).is_ok(),
        }
    }
}

/// Messages processed by the dispatcher task, in order.
pub(crate) enum Dispatch {
    Event(ClientEvent),
    Register(Sink),
    Unregister,
    Shutdown,
}

/// Run the dispatcher until shutdown or until every sender is gone.
pub(crate) async fn run(label: String, mut rx: mpsc::UnboundedReceiver<Dispatch>) {
    let mut sink: Option<Sink> = None;

    while let Some(message) = rx.recv().await {
        match message {
            Dispatch::Event(event) => {
                let Some(current) = sink.as_ref() else {
                    trace!("[{}] No observer, dropping {}", label, event.name());
                    continue;
                };

                if !current.deliver(&event) {
                    debug!("[{}] Observer went away, dropping {}", label, event.name());
                    sink = None;
                }
            }
            Dispatch::Register(new_sink) => {
                debug!("[{}] Observer registered", label);
                sink = Some(new_sink);
            }
            Dispatch::Unregister => {
                debug!("[{}] Observer unregistered", label);
                sink = None;
            }
            Dispatch::Shutdown => break,
        }
    }

    debug!("[{}] Dispatcher stopped", label);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ClientEvent>>,
    }

    impl Observer for Recorder {
        fn on_event(&self, event: &ClientEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn observer_sink(recorder: &Arc<Recorder>) -> Sink {
        let weak: Weak<dyn Observer> = Arc::downgrade(recorder) as Weak<dyn Observer>;
        Sink::Observer(weak)
    }

    #[tokio::test]
    async fn test_events_without_observer_are_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run("test".to_string(), rx));

        let recorder = Arc::new(Recorder::default());
        tx.send(Dispatch::Event(ClientEvent::Connected)).unwrap();
        tx.send(Dispatch::Register(observer_sink(&recorder))).unwrap();
        tx.send(Dispatch::Event(ClientEvent::Disconnected)).unwrap();
        tx.send(Dispatch::Shutdown).unwrap();
        task.await.unwrap();

        assert_eq!(*recorder.events.lock(), vec![ClientEvent::Disconnected]);
    }

    #[tokio::test]
    async fn test_unregister_is_ordered_with_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run("test".to_string(), rx));

        let recorder = Arc::new(Recorder::default());
        tx.send(Dispatch::Register(observer_sink(&recorder))).unwrap();
        tx.send(Dispatch::Event(ClientEvent::Connected)).unwrap();
        tx.send(Dispatch::Unregister).unwrap();
        tx.send(Dispatch::Event(ClientEvent::Disconnected)).unwrap();
        tx.send(Dispatch::Shutdown).unwrap();
        task.await.unwrap();

        assert_eq!(*recorder.events.lock(), vec![ClientEvent::Connected]);
    }

    #[tokio::test]
    async fn test_dropped_observer_stops_delivery() {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run("test".to_string(), rx));

        let recorder = Arc::new(Recorder::default());
        tx.send(Dispatch::Register(observer_sink(&recorder))).unwrap();
        drop(recorder);
        tx.send(Dispatch::Event(ClientEvent::Connected)).unwrap();
        tx.send(Dispatch::Shutdown).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_sink() {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run("test".to_string(), rx));

        let (sink, mut stream) = Sink::stream();
        tx.send(Dispatch::Register(sink)).unwrap();
        tx.send(Dispatch::Event(ClientEvent::Connected)).unwrap();
        tx.send(Dispatch::Shutdown).unwrap();
        task.await.unwrap();

        assert_eq!(stream.recv().await, Some(ClientEvent::Connected));
        assert_eq!(stream.recv().await, None);
    }

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let observer = move |_: &ClientEvent| *counter.lock() += 1;

        observer.on_event(&ClientEvent::Connected);
        observer.on_event(&ClientEvent::Disconnected);
        assert_eq!(*seen.lock(), 2);
    }
}
