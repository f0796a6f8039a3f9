//! [`AdapterStateMachine`] – turns raw adapter notifications into request
//! completions and subscriber events.
//!
//! The same notification can do two different kinds of work:
//!
//! - **resolve** a one-shot responder waiting in the
//!   [`PendingRequestTable`] (power transitions), and
//! - **notify** a keep-alive subscriber in the
//!   [`EventSubscriptionRegistry`] (state snapshots, found devices).
//!
//! | Notification | Resolves | Notifies |
//! |---|---|---|
//! | `StateChanged { previous: TurningOn, .. }` | enable slot | – |
//! | `StateChanged { previous: TurningOff, .. }` | disable slot | – |
//! | `StateChanged { current: On \| Off, .. }` | – | adapter-state-changed |
//! | `DiscoveryStarted` / `DiscoveryFinished` | – | adapter-state-changed |
//! | `ScanModeChanged` into / out of discoverable | – | adapter-state-changed |
//! | `DeviceFound` | – | device-found |

use std::sync::{Arc, Mutex, PoisonError};

use btnet_hal::{BluetoothAdapter, NotificationFeed};
use btnet_middleware::EventSubscriptionRegistry;
use btnet_types::{AdapterNotification, BtError, EventPayload, PowerState, RequestCode, ScanMode};
use tracing::{debug, info, trace, warn};

use crate::pending_table::PendingRequestTable;
use crate::request_codes::RequestCodes;

// ────────────────────────────────────────────────────────────────────────────
// ScanModeTracker
// ────────────────────────────────────────────────────────────────────────────

/// Remembers the last scan mode seen, since the OS does not report the
/// previous one reliably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanModeTracker {
    previous: ScanMode,
}

impl ScanModeTracker {
    pub fn new(initial: ScanMode) -> Self {
        Self { previous: initial }
    }

    /// Record `mode` and report whether the change crosses the discoverable
    /// boundary, i.e. the old or the new mode is the discoverable sentinel.
    ///
    /// The comparison uses the value remembered *before* this call.
    pub fn observe(&mut self, mode: ScanMode) -> bool {
        let relevant = self.previous.is_discoverable() || mode.is_discoverable();
        self.previous = mode;
        relevant
    }

    pub fn previous(&self) -> ScanMode {
        self.previous
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AdapterStateMachine
// ────────────────────────────────────────────────────────────────────────────

/// Interprets the adapter's [`NotificationFeed`].
///
/// Usually obtained from
/// [`RequestDispatcher::state_machine`][crate::dispatcher::RequestDispatcher::state_machine]
/// so that it shares the dispatcher's tables.
pub struct AdapterStateMachine {
    adapter: Arc<dyn BluetoothAdapter>,
    pending: Arc<PendingRequestTable>,
    subscriptions: Arc<EventSubscriptionRegistry>,
    codes: RequestCodes,
    scan_mode: Arc<Mutex<ScanModeTracker>>,
}

impl AdapterStateMachine {
    /// The scan-mode tracker starts from the adapter's current scan mode.
    pub fn new(
        adapter: Arc<dyn BluetoothAdapter>,
        pending: Arc<PendingRequestTable>,
        subscriptions: Arc<EventSubscriptionRegistry>,
        codes: RequestCodes,
    ) -> Self {
        let tracker = Arc::new(Mutex::new(ScanModeTracker::new(adapter.scan_mode())));
        Self::with_scan_mode(adapter, pending, subscriptions, codes, tracker)
    }

    /// Like [`new`][Self::new], but remembers scan modes in `scan_mode`,
    /// which other machines may share.
    pub fn with_scan_mode(
        adapter: Arc<dyn BluetoothAdapter>,
        pending: Arc<PendingRequestTable>,
        subscriptions: Arc<EventSubscriptionRegistry>,
        codes: RequestCodes,
        scan_mode: Arc<Mutex<ScanModeTracker>>,
    ) -> Self {
        Self {
            adapter,
            pending,
            subscriptions,
            codes,
            scan_mode,
        }
    }

    /// Process one notification.
    pub fn handle(&self, notification: AdapterNotification) {
        trace!(?notification, "adapter notification");
        match notification {
            AdapterNotification::StateChanged { previous, current } => {
                self.on_state_changed(previous, current);
            }
            AdapterNotification::DiscoveryStarted | AdapterNotification::DiscoveryFinished => {
                self.publish_snapshot();
            }
            AdapterNotification::ScanModeChanged { mode } => self.on_scan_mode_changed(mode),
            AdapterNotification::DeviceFound { device } => {
                debug!(address = %device.address, "device found");
                self.subscriptions.notify(EventPayload::DeviceFound(device));
            }
        }
    }

    /// Drain `feed` until every sender is gone.
    pub async fn run(self, mut feed: NotificationFeed) {
        while let Some(notification) = feed.recv().await {
            self.handle(notification);
        }
        debug!("adapter notification feed closed");
    }

    /// Last scan mode the state machine has seen.
    pub fn last_scan_mode(&self) -> ScanMode {
        self.scan_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .previous()
    }

    fn on_state_changed(&self, previous: PowerState, current: PowerState) {
        debug!(%previous, %current, "adapter power state changed");

        // Both checks run; the OS only ever reports one previous state.
        if previous == PowerState::TurningOn {
            self.resolve_transition(self.codes.enable, current == PowerState::On);
        }
        if previous == PowerState::TurningOff {
            self.resolve_transition(self.codes.disable, current == PowerState::Off);
        }

        if current.is_stable() {
            self.publish_snapshot();
        }
    }

    fn resolve_transition(&self, code: RequestCode, reached: bool) {
        let Some(responder) = self.pending.take(code) else {
            debug!(%code, "power transition finished with no pending request");
            return;
        };
        if reached {
            info!(%code, "power transition completed");
            responder.succeed_empty();
        } else {
            warn!(%code, "power transition settled in the opposite state");
            responder.fail(BtError::TransitionFailed);
        }
    }

    fn on_scan_mode_changed(&self, mode: ScanMode) {
        let relevant = self
            .scan_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(mode);
        if relevant {
            debug!(mode = mode.0, "discoverability changed");
            self.publish_snapshot();
        } else {
            trace!(mode = mode.0, "scan mode churn ignored");
        }
    }

    fn publish_snapshot(&self) {
        self.subscriptions
            .notify(EventPayload::AdapterStateChanged(self.adapter.snapshot()));
    }
}
