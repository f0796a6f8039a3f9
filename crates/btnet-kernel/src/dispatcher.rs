//! [`RequestDispatcher`] – the caller-facing façade.
//!
//! Every operation takes the caller's [`Responder`] (or [`Subscriber`]) and
//! either completes it on the spot or parks it in the
//! [`PendingRequestTable`] until a later notification or dialog outcome
//! resolves it. No operation blocks and none returns an error to the caller
//! directly: failures travel on the responder.
//!
//! # Request paths
//!
//! | Operation | Completes | Slot |
//! |---|---|---|
//! | `get_adapter_state`, `get_device(s)` | immediately | – |
//! | `start_discovery`, `stop_discovery` | immediately | – |
//! | `enable`, `disable` | on the settling `StateChanged` | `enable` / `disable` |
//! | `request_enable`, `request_disable` | on the dialog outcome | `enable_dialog` / `disable_dialog` |
//! | `request_discoverable` | on the dialog outcome | `discoverable_dialog` |
//!
//! Dialog outcomes are forwarded on the Tokio runtime the dispatcher is
//! called from. A host that receives outcomes itself can instead call
//! [`RequestDispatcher::on_external_activity_result`].

use std::sync::{Arc, Mutex};

use btnet_hal::{BluetoothAdapter, DialogHandle, NotificationFeed};
use btnet_middleware::{EventSubscriptionRegistry, Responder, Subscriber};
use btnet_types::{ActivityOutcome, BtError, EventChannel, Reply, Request, RequestCode};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::pending_table::PendingRequestTable;
use crate::request_codes::RequestCodes;
use crate::state_machine::{AdapterStateMachine, ScanModeTracker};

/// Routes requests to the adapter and correlates their completions.
///
/// # Example
///
/// ```
/// use btnet_hal::SimAdapter;
/// use btnet_kernel::RequestDispatcher;
/// use btnet_middleware::Responder;
/// use btnet_types::Reply;
///
/// let (adapter, _feed) = SimAdapter::builder().enabled(true).build();
/// let dispatcher = RequestDispatcher::new(adapter);
///
/// let (responder, mut rx) = Responder::channel();
/// dispatcher.enable(responder);
/// assert_eq!(rx.try_recv(), Some(Ok(Reply::Empty)));
/// ```
pub struct RequestDispatcher {
    adapter: Arc<dyn BluetoothAdapter>,
    pending: Arc<PendingRequestTable>,
    subscriptions: Arc<EventSubscriptionRegistry>,
    codes: RequestCodes,
    scan_mode: Arc<Mutex<ScanModeTracker>>,
}

impl RequestDispatcher {
    /// Dispatcher with the default [`RequestCodes`].
    pub fn new(adapter: Arc<dyn BluetoothAdapter>) -> Self {
        Self::with_codes(adapter, RequestCodes::default())
    }

    pub fn with_codes(adapter: Arc<dyn BluetoothAdapter>, codes: RequestCodes) -> Self {
        let scan_mode = Arc::new(Mutex::new(ScanModeTracker::new(adapter.scan_mode())));
        Self {
            adapter,
            pending: Arc::new(PendingRequestTable::new()),
            subscriptions: Arc::new(EventSubscriptionRegistry::new()),
            codes,
            scan_mode,
        }
    }

    pub fn codes(&self) -> RequestCodes {
        self.codes
    }

    pub fn pending(&self) -> &PendingRequestTable {
        &self.pending
    }

    /// A state machine sharing this dispatcher's tables and scan-mode
    /// tracker; every machine built here remembers the same previous mode.
    pub fn state_machine(&self) -> AdapterStateMachine {
        AdapterStateMachine::with_scan_mode(
            Arc::clone(&self.adapter),
            Arc::clone(&self.pending),
            Arc::clone(&self.subscriptions),
            self.codes,
            Arc::clone(&self.scan_mode),
        )
    }

    /// Spawn [`AdapterStateMachine::run`] over `feed` on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn_state_machine(&self, feed: NotificationFeed) -> JoinHandle<()> {
        tokio::spawn(self.state_machine().run(feed))
    }

    // ── action dispatch ───────────────────────────────────────────────────

    /// Run a one-shot [`Request`].
    pub fn execute(&self, request: Request, responder: Responder) {
        debug!(?request, "executing request");
        match request {
            Request::GetAdapterState => self.get_adapter_state(responder),
            Request::RequestEnable => self.request_enable(responder),
            Request::RequestDisable => self.request_disable(responder),
            Request::Enable => self.enable(responder),
            Request::Disable => self.disable(responder),
            Request::GetDevice { address } => self.get_device(&address, responder),
            Request::GetDevices => self.get_devices(responder),
            Request::StartDiscovery => self.start_discovery(responder),
            Request::StopDiscovery => self.stop_discovery(responder),
            Request::RequestDiscoverable => self.request_discoverable(responder),
        }
    }

    /// Attach `subscriber` to a streamed channel.
    ///
    /// # Errors
    ///
    /// [`BtError::Unsupported`] when the adapter is absent. A subscriber has
    /// no failure path of its own, so the error is returned instead.
    pub fn subscribe(&self, channel: EventChannel, subscriber: Subscriber) -> Result<(), BtError> {
        if !self.adapter.is_present() {
            return Err(BtError::Unsupported);
        }
        self.subscriptions.subscribe(channel, subscriber);
        Ok(())
    }

    // ── one-shot operations ───────────────────────────────────────────────

    pub fn get_adapter_state(&self, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        responder.succeed(Reply::AdapterState(self.adapter.snapshot()));
    }

    /// Ask the user to turn the adapter on.
    pub fn request_enable(&self, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        if self.adapter.is_enabled() {
            responder.succeed_empty();
            return;
        }
        self.open_dialog(self.codes.enable_dialog, responder, |a| a.show_enable_dialog());
    }

    /// Ask the user to turn the adapter off.
    pub fn request_disable(&self, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        if !self.adapter.is_enabled() {
            responder.succeed_empty();
            return;
        }
        self.open_dialog(self.codes.disable_dialog, responder, |a| a.show_disable_dialog());
    }

    /// Power the adapter on directly.
    ///
    /// Completes once the adapter reports `TurningOn → On` (success) or
    /// `TurningOn → anything else` ([`BtError::TransitionFailed`]).
    pub fn enable(&self, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        if self.adapter.is_enabled() {
            responder.succeed_empty();
            return;
        }
        self.begin_transition(self.codes.enable, responder, |a| a.enable());
    }

    /// Power the adapter off directly.
    ///
    /// Completes once the adapter reports the settling `TurningOff → *`
    /// notification, never on the synchronous OS acceptance.
    pub fn disable(&self, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        if !self.adapter.is_enabled() {
            responder.succeed_empty();
            return;
        }
        self.begin_transition(self.codes.disable, responder, |a| a.disable());
    }

    pub fn get_device(&self, address: &str, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        let address = address.trim();
        if address.is_empty() {
            responder.fail(BtError::InvalidArgument("empty device address".to_string()));
            return;
        }
        match self.adapter.remote_device(address) {
            Ok(device) => responder.succeed(Reply::Device(device)),
            Err(err) => {
                debug!(%address, error = %err, "device lookup failed");
                responder.fail(err);
            }
        }
    }

    /// Devices bonded with the adapter.
    pub fn get_devices(&self, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        responder.succeed(Reply::Devices(self.adapter.bonded_devices()));
    }

    /// Restart discovery. Any running scan is cancelled first; the result
    /// depends only on whether the new scan starts.
    pub fn start_discovery(&self, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        if !self.adapter.cancel_discovery() {
            debug!("cancel before start_discovery was refused");
        }
        if self.adapter.start_discovery() {
            info!("discovery started");
            responder.succeed_empty();
        } else {
            warn!("adapter refused to start discovery");
            responder.fail(BtError::StartFailed);
        }
    }

    pub fn stop_discovery(&self, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        if !self.adapter.is_discovering() {
            responder.succeed_empty();
            return;
        }
        if self.adapter.cancel_discovery() {
            info!("discovery stopped");
            responder.succeed_empty();
        } else {
            warn!("adapter refused to stop discovery");
            responder.fail(BtError::StopFailed);
        }
    }

    /// Ask the user to make the adapter discoverable. Always shows the
    /// dialog, even when the adapter is already discoverable.
    pub fn request_discoverable(&self, responder: Responder) {
        let Some(responder) = self.supported(responder) else {
            return;
        };
        self.open_dialog(self.codes.discoverable_dialog, responder, |a| {
            a.show_discoverable_dialog()
        });
    }

    // ── streamed registrations ────────────────────────────────────────────

    pub fn register_adapter_state_changed(&self, subscriber: Subscriber) -> Result<(), BtError> {
        self.subscribe(EventChannel::AdapterStateChanged, subscriber)
    }

    pub fn register_device_found(&self, subscriber: Subscriber) -> Result<(), BtError> {
        self.subscribe(EventChannel::DeviceFound, subscriber)
    }

    // ── completions ───────────────────────────────────────────────────────

    /// Deliver a dialog outcome for `code`.
    ///
    /// An outcome for an empty slot is logged and otherwise ignored.
    pub fn on_external_activity_result(&self, code: RequestCode, outcome: ActivityOutcome) {
        complete_activity(&self.pending, code, outcome);
    }

    // ── internal helpers ──────────────────────────────────────────────────

    /// Hand `responder` back when the adapter exists; otherwise fail it with
    /// [`BtError::Unsupported`].
    fn supported(&self, responder: Responder) -> Option<Responder> {
        if self.adapter.is_present() {
            Some(responder)
        } else {
            warn!("no Bluetooth adapter present");
            responder.fail(BtError::Unsupported);
            None
        }
    }

    fn begin_transition(
        &self,
        code: RequestCode,
        responder: Responder,
        start: impl FnOnce(&dyn BluetoothAdapter) -> bool,
    ) {
        // The slot is filled before the OS call so that a fast settling
        // notification finds it occupied. The displaced request is only
        // superseded once the call is accepted.
        let displaced = self.pending.replace(code, responder);
        if start(self.adapter.as_ref()) {
            debug!(%code, "power transition started");
            if let Some(old) = displaced {
                warn!(%code, "pending request superseded");
                old.fail(BtError::Superseded);
            }
            return;
        }
        warn!(%code, "adapter could not start the power transition");
        if let Some(responder) = self.pending.take(code) {
            responder.fail(BtError::CannotStart);
        }
        if let Some(old) = displaced {
            self.pending.replace(code, old);
        }
    }

    fn open_dialog(
        &self,
        code: RequestCode,
        responder: Responder,
        show: impl FnOnce(&dyn BluetoothAdapter) -> DialogHandle,
    ) {
        // Supersede the resident request before the new dialog appears.
        self.pending.put(code, responder);
        let dialog = show(self.adapter.as_ref());
        debug!(%code, "dialog shown");

        match Handle::try_current() {
            Ok(runtime) => {
                let pending = Arc::clone(&self.pending);
                // Completes whoever holds `code` when the dialog answers, so
                // a superseded dialog resolves its successor's request.
                runtime.spawn(async move {
                    let outcome = dialog.await;
                    complete_activity(&pending, code, outcome);
                });
            }
            Err(_) => {
                error!(%code, "no Tokio runtime to await the dialog outcome");
                if let Some(responder) = self.pending.take(code) {
                    responder.fail(BtError::Cancelled);
                }
            }
        }
    }
}

fn complete_activity(pending: &PendingRequestTable, code: RequestCode, outcome: ActivityOutcome) {
    let Some(responder) = pending.take(code) else {
        error!(%code, ?outcome, "BUG: activity result for an empty request slot");
        return;
    };
    match outcome {
        ActivityOutcome::Ok => {
            info!(%code, "dialog accepted");
            responder.succeed_empty();
        }
        ActivityOutcome::Cancelled => {
            info!(%code, "dialog cancelled");
            responder.fail(BtError::Cancelled);
        }
    }
}
