//! Callback sinks.
//!
//! Two delivery semantics share one event source:
//!
//! | Sink | Invocations | Consumed by |
//! |---|---|---|
//! | [`Responder`] | exactly one `succeed` **or** `fail` | value (`self`) |
//! | [`Subscriber`] | any number of `notify` | reference (`&self`) |
//!
//! Because the terminal methods of [`Responder`] take `self`, completing a
//! request twice does not compile. Both sinks come in a channel flavour (for
//! async callers) and a closure flavour (for hosts that marshal results on
//! their own thread).

use std::fmt;
use std::sync::Arc;

use btnet_types::{AdapterEvent, BtError, Reply};
use tokio::sync::{mpsc, oneshot};

/// Terminal result of a one-shot request.
pub type Response = Result<Reply, BtError>;

// ─────────────────────────────────────────────────────────────────────────────
// Responder
// ─────────────────────────────────────────────────────────────────────────────

enum Sink {
    Channel(oneshot::Sender<Response>),
    Callback(Box<dyn FnOnce(Response) + Send>),
}

/// One-shot callback for a single request.
///
/// Dropping a `Responder` without completing it closes the paired
/// [`ResponseReceiver`], which then yields `None`.
pub struct Responder {
    sink: Sink,
}

impl Responder {
    /// Create a responder together with the receiver the caller awaits.
    pub fn channel() -> (Responder, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        (
            Responder {
                sink: Sink::Channel(tx),
            },
            ResponseReceiver { rx },
        )
    }

    /// Wrap a closure that is called with the terminal result.
    pub fn from_fn(f: impl FnOnce(Response) + Send + 'static) -> Self {
        Responder {
            sink: Sink::Callback(Box::new(f)),
        }
    }

    pub fn succeed(self, reply: Reply) {
        self.complete(Ok(reply));
    }

    /// Succeed without a payload.
    pub fn succeed_empty(self) {
        self.complete(Ok(Reply::Empty));
    }

    pub fn fail(self, error: BtError) {
        self.complete(Err(error));
    }

    /// Deliver `response`. A receiver that was already dropped is ignored.
    pub fn complete(self, response: Response) {
        match self.sink {
            Sink::Channel(tx) => {
                let _ = tx.send(response);
            }
            Sink::Callback(f) => f(response),
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.sink {
            Sink::Channel(_) => "channel",
            Sink::Callback(_) => "callback",
        };
        f.debug_struct("Responder").field("sink", &kind).finish()
    }
}

/// Caller-side end of a channel [`Responder`].
#[derive(Debug)]
pub struct ResponseReceiver {
    rx: oneshot::Receiver<Response>,
}

impl ResponseReceiver {
    /// Wait for the terminal result.
    ///
    /// Returns `None` when the responder was dropped without completing.
    pub async fn recv(self) -> Option<Response> {
        self.rx.await.ok()
    }

    /// Non-blocking poll: `Some` once a result has been delivered.
    pub fn try_recv(&mut self) -> Option<Response> {
        self.rx.try_recv().ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscriber
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum EventSink {
    Channel(mpsc::UnboundedSender<AdapterEvent>),
    Callback(Arc<dyn Fn(AdapterEvent) + Send + Sync>),
}

/// Keep-alive callback for a streamed event channel.
///
/// Cheap to clone; all clones feed the same sink.
#[derive(Clone)]
pub struct Subscriber {
    sink: EventSink,
}

impl Subscriber {
    /// Create a subscriber together with the stream the caller reads.
    pub fn channel() -> (Subscriber, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Subscriber {
                sink: EventSink::Channel(tx),
            },
            EventStream { rx },
        )
    }

    /// Wrap a closure that is called for every event.
    pub fn from_fn(f: impl Fn(AdapterEvent) + Send + Sync + 'static) -> Self {
        Subscriber {
            sink: EventSink::Callback(Arc::new(f)),
        }
    }

    /// Deliver one event, leaving the subscription in place.
    ///
    /// Returns `false` when the receiving side has gone away.
    pub fn notify(&self, event: AdapterEvent) -> bool {
        match &self.sink {
            EventSink::Channel(tx) => tx.send(event).is_ok(),
            EventSink::Callback(f) => {
                f(event);
                true
            }
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.sink {
            EventSink::Channel(_) => "channel",
            EventSink::Callback(_) => "callback",
        };
        f.debug_struct("Subscriber").field("sink", &kind).finish()
    }
}

/// Caller-side end of a channel [`Subscriber`].
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<AdapterEvent>,
}

impl EventStream {
    /// Wait for the next event.
    ///
    /// Returns `None` once every clone of the subscriber is gone, e.g. after
    /// it was replaced in the registry.
    pub async fn recv(&mut self) -> Option<AdapterEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll for an already delivered event.
    pub fn try_recv(&mut self) -> Option<AdapterEvent> {
        self.rx.try_recv().ok()
    }
}
