//! In-process simulated adapter for CI/CD testing without a radio.
//!
//! [`SimAdapter`] implements [`BluetoothAdapter`] over plain in-memory state
//! and emits the same [`AdapterNotification`] sequence a real OS would: power
//! transitions pass through their `Turning*` state, discovery start/stop are
//! announced, and scan-mode changes are reported. This lets the full btnet
//! stack run in headless tests and in the CLI.
//!
//! # Transitions
//!
//! With `auto_complete` enabled a power transition settles immediately
//! (two notifications in a row). Without it the adapter stays in
//! `TurningOn` / `TurningOff` until [`SimAdapter::complete_transition`] or
//! [`SimAdapter::fail_transition`] is called.
//!
//! # Dialogs
//!
//! A scripted `dialog_outcome` answers every dialog at once. Without one the
//! dialogs queue up until [`SimAdapter::resolve_dialog`] answers the oldest.
//! Answering `Ok` applies the dialog's effect (power on/off, discoverable).
//!
//! # Example
//!
//! ```rust
//! use btnet_hal::adapter::BluetoothAdapter;
//! use btnet_hal::sim::SimAdapter;
//!
//! let (adapter, _feed) = SimAdapter::builder()
//!     .name("bench")
//!     .auto_complete(true)
//!     .build();
//!
//! assert!(adapter.enable());
//! assert!(adapter.is_enabled());
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btnet_types::{ActivityOutcome, AdapterNotification, BtError, DeviceInfo, PowerState, ScanMode};
use tracing::{debug, trace};

use crate::adapter::{
    BluetoothAdapter, DialogCompleter, DialogHandle, NotificationFeed, NotificationSender,
    notification_channel,
};

// ────────────────────────────────────────────────────────────────────────────
// Public helper types
// ────────────────────────────────────────────────────────────────────────────

/// Driver calls recorded by the simulator, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCall {
    Enable,
    Disable,
    StartDiscovery,
    CancelDiscovery,
    ShowEnableDialog,
    ShowDisableDialog,
    ShowDiscoverableDialog,
}

/// Driver calls the simulator can be told to refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimFault {
    Enable,
    Disable,
    StartDiscovery,
    CancelDiscovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DialogKind {
    Enable,
    Disable,
    Discoverable,
}

// ────────────────────────────────────────────────────────────────────────────
// SimAdapter
// ────────────────────────────────────────────────────────────────────────────

struct SimState {
    present: bool,
    address: String,
    name: String,
    power: PowerState,
    discovering: bool,
    scan_mode: ScanMode,
    bonded: Vec<DeviceInfo>,
    remote: HashMap<String, DeviceInfo>,
    faults: Vec<SimFault>,
    dialogs: VecDeque<(DialogKind, DialogCompleter)>,
    calls: Vec<SimCall>,
}

/// Simulated Bluetooth adapter. Construct with [`SimAdapter::builder`].
pub struct SimAdapter {
    state: Mutex<SimState>,
    feed: NotificationSender,
    auto_complete: bool,
    dialog_outcome: Option<ActivityOutcome>,
}

impl SimAdapter {
    /// Start building a simulated adapter.
    pub fn builder() -> SimAdapterBuilder {
        SimAdapterBuilder::default()
    }

    /// Settle a pending power transition (`TurningOn → On`,
    /// `TurningOff → Off`). Returns `false` when nothing was in flight.
    pub fn complete_transition(&self) -> bool {
        self.settle(false)
    }

    /// Abort a pending power transition, falling back to where it started
    /// (`TurningOn → Off`, `TurningOff → On`).
    pub fn fail_transition(&self) -> bool {
        self.settle(true)
    }

    /// Answer the oldest open dialog. Returns `false` when none is open.
    pub fn resolve_dialog(&self, outcome: ActivityOutcome) -> bool {
        let next = self.lock().dialogs.pop_front();
        match next {
            Some((kind, completer)) => {
                self.answer(kind, completer, outcome);
                true
            }
            None => false,
        }
    }

    /// Number of dialogs waiting for an answer.
    pub fn open_dialogs(&self) -> usize {
        self.lock().dialogs.len()
    }

    /// Report a device in range. It becomes resolvable through
    /// [`BluetoothAdapter::remote_device`].
    pub fn discover(&self, device: DeviceInfo) {
        self.lock()
            .remote
            .insert(device.address.clone(), device.clone());
        self.emit(AdapterNotification::DeviceFound { device });
    }

    /// Change the raw scan mode and report it.
    pub fn set_scan_mode(&self, mode: ScanMode) {
        self.lock().scan_mode = mode;
        self.emit(AdapterNotification::ScanModeChanged { mode });
    }

    /// Make the driver refuse (`true`) or accept (`false`) a call.
    pub fn set_fault(&self, fault: SimFault, active: bool) {
        let mut st = self.lock();
        st.faults.retain(|f| *f != fault);
        if active {
            st.faults.push(fault);
        }
    }

    /// Every driver call made so far, oldest first.
    pub fn calls(&self) -> Vec<SimCall> {
        self.lock().calls.clone()
    }

    /// Current power state, including the transitional ones.
    pub fn power_state(&self) -> PowerState {
        self.lock().power
    }

    // ── internal helpers ──────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, notification: AdapterNotification) {
        trace!(?notification, "sim adapter notification");
        if self.feed.send(notification).is_err() {
            debug!("sim adapter feed has no receiver");
        }
    }

    fn faulted(st: &SimState, fault: SimFault) -> bool {
        st.faults.contains(&fault)
    }

    fn settle(&self, revert: bool) -> bool {
        let (previous, current) = {
            let mut st = self.lock();
            let current = match (st.power, revert) {
                (PowerState::TurningOn, false) | (PowerState::TurningOff, true) => PowerState::On,
                (PowerState::TurningOff, false) | (PowerState::TurningOn, true) => PowerState::Off,
                _ => return false,
            };
            (std::mem::replace(&mut st.power, current), current)
        };
        self.emit(AdapterNotification::StateChanged { previous, current });
        true
    }

    fn begin_power(&self, call: SimCall, fault: SimFault, target: PowerState) -> bool {
        let (from, via) = match target {
            PowerState::On => (PowerState::Off, PowerState::TurningOn),
            _ => (PowerState::On, PowerState::TurningOff),
        };
        {
            let mut st = self.lock();
            st.calls.push(call);
            if !st.present || Self::faulted(&st, fault) {
                return false;
            }
            if st.power != from {
                // Already there or already on the way.
                return true;
            }
            st.power = via;
            if target == PowerState::Off {
                st.discovering = false;
            }
        }
        self.emit(AdapterNotification::StateChanged {
            previous: from,
            current: via,
        });
        if self.auto_complete {
            self.complete_transition();
        }
        true
    }

    fn open_dialog(&self, call: SimCall, kind: DialogKind) -> DialogHandle {
        let (completer, handle) = DialogHandle::channel();
        self.lock().calls.push(call);
        match self.dialog_outcome {
            Some(outcome) => self.answer(kind, completer, outcome),
            None => self.lock().dialogs.push_back((kind, completer)),
        }
        handle
    }

    fn answer(&self, kind: DialogKind, completer: DialogCompleter, outcome: ActivityOutcome) {
        if outcome == ActivityOutcome::Ok {
            match kind {
                DialogKind::Enable => {
                    self.begin_power(SimCall::Enable, SimFault::Enable, PowerState::On);
                }
                DialogKind::Disable => {
                    self.begin_power(SimCall::Disable, SimFault::Disable, PowerState::Off);
                }
                DialogKind::Discoverable => self.set_scan_mode(ScanMode::CONNECTABLE_DISCOVERABLE),
            }
        }
        completer.complete(outcome);
    }
}

impl BluetoothAdapter for SimAdapter {
    fn is_present(&self) -> bool {
        self.lock().present
    }

    fn address(&self) -> String {
        self.lock().address.clone()
    }

    fn name(&self) -> String {
        self.lock().name.clone()
    }

    fn is_enabled(&self) -> bool {
        self.lock().power == PowerState::On
    }

    fn is_discovering(&self) -> bool {
        self.lock().discovering
    }

    fn scan_mode(&self) -> ScanMode {
        self.lock().scan_mode
    }

    fn enable(&self) -> bool {
        self.begin_power(SimCall::Enable, SimFault::Enable, PowerState::On)
    }

    fn disable(&self) -> bool {
        self.begin_power(SimCall::Disable, SimFault::Disable, PowerState::Off)
    }

    fn start_discovery(&self) -> bool {
        {
            let mut st = self.lock();
            st.calls.push(SimCall::StartDiscovery);
            if Self::faulted(&st, SimFault::StartDiscovery) || st.power != PowerState::On {
                return false;
            }
            st.discovering = true;
        }
        self.emit(AdapterNotification::DiscoveryStarted);
        true
    }

    fn cancel_discovery(&self) -> bool {
        let was_discovering = {
            let mut st = self.lock();
            st.calls.push(SimCall::CancelDiscovery);
            if Self::faulted(&st, SimFault::CancelDiscovery) {
                return false;
            }
            std::mem::replace(&mut st.discovering, false)
        };
        if was_discovering {
            self.emit(AdapterNotification::DiscoveryFinished);
        }
        true
    }

    fn bonded_devices(&self) -> Vec<DeviceInfo> {
        self.lock().bonded.clone()
    }

    fn remote_device(&self, address: &str) -> Result<DeviceInfo, BtError> {
        let st = self.lock();
        st.remote
            .get(address)
            .or_else(|| st.bonded.iter().find(|d| d.address == address))
            .cloned()
            .ok_or_else(|| BtError::NotFound(address.to_string()))
    }

    fn show_enable_dialog(&self) -> DialogHandle {
        self.open_dialog(SimCall::ShowEnableDialog, DialogKind::Enable)
    }

    fn show_disable_dialog(&self) -> DialogHandle {
        self.open_dialog(SimCall::ShowDisableDialog, DialogKind::Disable)
    }

    fn show_discoverable_dialog(&self) -> DialogHandle {
        self.open_dialog(SimCall::ShowDiscoverableDialog, DialogKind::Discoverable)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for [`SimAdapter`].
///
/// Defaults: present, powered off, not discovering, scan mode `NONE`, no
/// devices, manual transitions, dialogs held until resolved.
pub struct SimAdapterBuilder {
    present: bool,
    address: String,
    name: String,
    enabled: bool,
    scan_mode: ScanMode,
    bonded: Vec<DeviceInfo>,
    remote: Vec<DeviceInfo>,
    faults: Vec<SimFault>,
    auto_complete: bool,
    dialog_outcome: Option<ActivityOutcome>,
}

impl Default for SimAdapterBuilder {
    fn default() -> Self {
        Self {
            present: true,
            address: "00:1A:7D:DA:71:13".to_string(),
            name: "btnet-sim".to_string(),
            enabled: false,
            scan_mode: ScanMode::NONE,
            bonded: Vec::new(),
            remote: Vec::new(),
            faults: Vec::new(),
            auto_complete: false,
            dialog_outcome: None,
        }
    }
}

impl SimAdapterBuilder {
    /// Simulate a device without Bluetooth hardware.
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    pub fn present(mut self, present: bool) -> Self {
        self.present = present;
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Start powered on (`true`) or off (`false`).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = mode;
        self
    }

    /// Add a bonded (paired) device.
    pub fn with_bonded_device(mut self, mut device: DeviceInfo) -> Self {
        device.paired = true;
        self.bonded.push(device);
        self
    }

    /// Add a device resolvable by address but not bonded.
    pub fn with_remote_device(mut self, device: DeviceInfo) -> Self {
        self.remote.push(device);
        self
    }

    pub fn with_fault(mut self, fault: SimFault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn auto_complete(mut self, auto: bool) -> Self {
        self.auto_complete = auto;
        self
    }

    /// Answer every dialog immediately with `outcome`; `None` holds them.
    pub fn dialog_outcome(mut self, outcome: Option<ActivityOutcome>) -> Self {
        self.dialog_outcome = outcome;
        self
    }

    /// Consume the builder, returning the adapter and its notification feed.
    pub fn build(self) -> (Arc<SimAdapter>, NotificationFeed) {
        let (feed, rx) = notification_channel();
        let remote = self
            .remote
            .into_iter()
            .map(|d| (d.address.clone(), d))
            .collect();
        let adapter = SimAdapter {
            state: Mutex::new(SimState {
                present: self.present,
                address: self.address,
                name: self.name,
                power: if self.enabled { PowerState::On } else { PowerState::Off },
                discovering: false,
                scan_mode: self.scan_mode,
                bonded: self.bonded,
                remote,
                faults: self.faults,
                dialogs: VecDeque::new(),
                calls: Vec::new(),
            }),
            feed,
            auto_complete: self.auto_complete,
            dialog_outcome: self.dialog_outcome,
        };
        (Arc::new(adapter), rx)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(feed: &mut NotificationFeed) -> Vec<AdapterNotification> {
        let mut out = Vec::new();
        while let Ok(n) = feed.try_recv() {
            out.push(n);
        }
        out
    }

    #[test]
    fn manual_enable_stays_in_turning_on() {
        let (adapter, mut feed) = SimAdapter::builder().build();
        assert!(adapter.enable());
        assert_eq!(adapter.power_state(), PowerState::TurningOn);
        assert!(!adapter.is_enabled());
        assert_eq!(
            drain(&mut feed),
            vec![AdapterNotification::StateChanged {
                previous: PowerState::Off,
                current: PowerState::TurningOn,
            }]
        );

        assert!(adapter.complete_transition());
        assert!(adapter.is_enabled());
        assert_eq!(
            drain(&mut feed),
            vec![AdapterNotification::StateChanged {
                previous: PowerState::TurningOn,
                current: PowerState::On,
            }]
        );
    }

    #[test]
    fn auto_complete_settles_immediately() {
        let (adapter, mut feed) = SimAdapter::builder().enabled(true).auto_complete(true).build();
        assert!(adapter.disable());
        assert_eq!(adapter.power_state(), PowerState::Off);
        assert_eq!(drain(&mut feed).len(), 2);
    }

    #[test]
    fn fail_transition_reverts() {
        let (adapter, mut feed) = SimAdapter::builder().build();
        adapter.enable();
        drain(&mut feed);
        assert!(adapter.fail_transition());
        assert_eq!(adapter.power_state(), PowerState::Off);
        assert_eq!(
            drain(&mut feed),
            vec![AdapterNotification::StateChanged {
                previous: PowerState::TurningOn,
                current: PowerState::Off,
            }]
        );
        assert!(!adapter.complete_transition());
    }

    #[test]
    fn faulted_enable_refuses_without_notifications() {
        let (adapter, mut feed) = SimAdapter::builder().with_fault(SimFault::Enable).build();
        assert!(!adapter.enable());
        assert!(drain(&mut feed).is_empty());
        adapter.set_fault(SimFault::Enable, false);
        assert!(adapter.enable());
    }

    #[test]
    fn absent_adapter_refuses_power_changes() {
        let (adapter, _feed) = SimAdapter::builder().absent().build();
        assert!(!adapter.is_present());
        assert!(!adapter.enable());
    }

    #[test]
    fn discovery_requires_power_and_reports_transitions() {
        let (adapter, mut feed) = SimAdapter::builder().build();
        assert!(!adapter.start_discovery());

        let (adapter, mut feed2) = SimAdapter::builder().enabled(true).build();
        assert!(adapter.start_discovery());
        assert!(adapter.is_discovering());
        assert!(adapter.cancel_discovery());
        assert!(!adapter.is_discovering());
        assert_eq!(
            drain(&mut feed2),
            vec![
                AdapterNotification::DiscoveryStarted,
                AdapterNotification::DiscoveryFinished
            ]
        );
        assert!(drain(&mut feed).is_empty());
    }

    #[test]
    fn cancel_when_idle_is_silent() {
        let (adapter, mut feed) = SimAdapter::builder().enabled(true).build();
        assert!(adapter.cancel_discovery());
        assert!(drain(&mut feed).is_empty());
    }

    #[test]
    fn discovered_devices_become_resolvable() {
        let (adapter, mut feed) = SimAdapter::builder().enabled(true).build();
        assert!(matches!(
            adapter.remote_device("AA:BB:CC:DD:EE:FF"),
            Err(BtError::NotFound(_))
        ));
        adapter.discover(DeviceInfo::new("AA:BB:CC:DD:EE:FF", "headset"));
        assert_eq!(adapter.remote_device("AA:BB:CC:DD:EE:FF").unwrap().name, "headset");
        assert!(matches!(
            drain(&mut feed).as_slice(),
            [AdapterNotification::DeviceFound { .. }]
        ));
    }

    #[test]
    fn bonded_devices_are_marked_paired() {
        let (adapter, _feed) = SimAdapter::builder()
            .with_bonded_device(DeviceInfo::new("11:11:11:11:11:11", "keyboard"))
            .build();
        let bonded = adapter.bonded_devices();
        assert_eq!(bonded.len(), 1);
        assert!(bonded[0].paired);
        assert!(adapter.remote_device("11:11:11:11:11:11").is_ok());
    }

    #[tokio::test]
    async fn held_dialog_resolves_on_demand_and_applies_effect() {
        let (adapter, _feed) = SimAdapter::builder().auto_complete(true).build();
        let handle = adapter.show_enable_dialog();
        assert_eq!(adapter.open_dialogs(), 1);
        assert!(adapter.resolve_dialog(ActivityOutcome::Ok));
        assert_eq!(handle.await, ActivityOutcome::Ok);
        assert!(adapter.is_enabled());
        assert!(!adapter.resolve_dialog(ActivityOutcome::Ok));
    }

    #[tokio::test]
    async fn scripted_dialog_answers_immediately() {
        let (adapter, _feed) = SimAdapter::builder()
            .enabled(true)
            .dialog_outcome(Some(ActivityOutcome::Ok))
            .build();
        let handle = adapter.show_discoverable_dialog();
        assert_eq!(handle.await, ActivityOutcome::Ok);
        assert!(adapter.scan_mode().is_discoverable());
        assert_eq!(adapter.open_dialogs(), 0);
    }

    #[tokio::test]
    async fn cancelled_dialog_has_no_effect() {
        let (adapter, _feed) = SimAdapter::builder()
            .dialog_outcome(Some(ActivityOutcome::Cancelled))
            .build();
        assert_eq!(adapter.show_enable_dialog().await, ActivityOutcome::Cancelled);
        assert_eq!(adapter.power_state(), PowerState::Off);
    }

    #[test]
    fn calls_are_recorded_in_order() {
        let (adapter, _feed) = SimAdapter::builder().enabled(true).build();
        adapter.start_discovery();
        adapter.cancel_discovery();
        let _ = adapter.show_discoverable_dialog();
        assert_eq!(
            adapter.calls(),
            vec![
                SimCall::StartDiscovery,
                SimCall::CancelDiscovery,
                SimCall::ShowDiscoverableDialog
            ]
        );
    }
}
