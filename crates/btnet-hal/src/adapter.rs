//! The `BluetoothAdapter` capability trait for radio / adapter drivers.
//!
//! Drivers implement this trait and hand an `Arc<dyn BluetoothAdapter>` to the
//! kernel's `RequestDispatcher`. The rest of the stack only
//! ever talks to the trait, so a platform driver and the in-process
//! [`SimAdapter`][crate::sim::SimAdapter] are interchangeable.
//!
//! Besides the synchronous calls, a driver produces a [`NotificationFeed`]:
//! the asynchronous stream of [`AdapterNotification`]s the kernel's state
//! machine consumes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use btnet_types::{ActivityOutcome, AdapterNotification, AdapterState, BtError, DeviceInfo, ScanMode};
use tokio::sync::{mpsc, oneshot};

/// Receiving end of a driver's notification stream.
pub type NotificationFeed = mpsc::UnboundedReceiver<AdapterNotification>;

/// Sending end of a driver's notification stream.
pub type NotificationSender = mpsc::UnboundedSender<AdapterNotification>;

/// Create a connected notification sender / feed pair.
pub fn notification_channel() -> (NotificationSender, NotificationFeed) {
    mpsc::unbounded_channel()
}

/// A Bluetooth adapter as seen by the request layer.
///
/// All methods take `&self`; drivers use interior mutability because
/// requests and notifications arrive from different threads.
pub trait BluetoothAdapter: Send + Sync {
    /// `false` when the device has no Bluetooth hardware at all.
    fn is_present(&self) -> bool;

    fn address(&self) -> String;

    fn name(&self) -> String;

    fn is_enabled(&self) -> bool;

    fn is_discovering(&self) -> bool;

    fn scan_mode(&self) -> ScanMode;

    /// Begin powering the adapter on.
    ///
    /// Returns `false` when the transition could not even start. A `true`
    /// return only means the OS accepted the request: completion is reported
    /// later as a `StateChanged` notification.
    fn enable(&self) -> bool;

    /// Begin powering the adapter off. Same contract as [`enable`][Self::enable].
    fn disable(&self) -> bool;

    fn start_discovery(&self) -> bool;

    fn cancel_discovery(&self) -> bool;

    /// Devices bonded with this adapter, in OS order.
    fn bonded_devices(&self) -> Vec<DeviceInfo>;

    /// Look up a remote device by address.
    ///
    /// # Errors
    ///
    /// Returns [`BtError::NotFound`] when the address is unknown.
    fn remote_device(&self, address: &str) -> Result<DeviceInfo, BtError>;

    /// Show the system "turn Bluetooth on?" prompt.
    fn show_enable_dialog(&self) -> DialogHandle;

    /// Show the system "turn Bluetooth off?" prompt.
    fn show_disable_dialog(&self) -> DialogHandle;

    /// Show the system "make this device discoverable?" prompt.
    fn show_discoverable_dialog(&self) -> DialogHandle;

    /// Fresh snapshot of the adapter.
    fn snapshot(&self) -> AdapterState {
        AdapterState {
            address: self.address(),
            name: self.name(),
            enabled: self.is_enabled(),
            discovering: self.is_discovering(),
            discoverable: self.scan_mode().is_discoverable(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dialog handles
// ─────────────────────────────────────────────────────────────────────────────

/// Pending outcome of a system dialog.
///
/// Resolves to the user's [`ActivityOutcome`]. A dialog whose
/// [`DialogCompleter`] is dropped without an answer resolves to
/// [`ActivityOutcome::Cancelled`].
#[derive(Debug)]
pub struct DialogHandle {
    rx: oneshot::Receiver<ActivityOutcome>,
}

impl DialogHandle {
    /// Create a handle together with the completer the driver keeps.
    pub fn channel() -> (DialogCompleter, DialogHandle) {
        let (tx, rx) = oneshot::channel();
        (DialogCompleter { tx }, DialogHandle { rx })
    }

    /// A handle that is already resolved with `outcome`.
    pub fn resolved(outcome: ActivityOutcome) -> Self {
        let (completer, handle) = Self::channel();
        completer.complete(outcome);
        handle
    }
}

impl Future for DialogHandle {
    type Output = ActivityOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(ActivityOutcome::Cancelled))
    }
}

/// Driver-side end of a [`DialogHandle`].
#[derive(Debug)]
pub struct DialogCompleter {
    tx: oneshot::Sender<ActivityOutcome>,
}

impl DialogCompleter {
    /// Deliver the user's answer. Silently ignored when nobody is waiting.
    pub fn complete(self, outcome: ActivityOutcome) {
        let _ = self.tx.send(outcome);
    }
}
