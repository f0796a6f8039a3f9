//! `btnet-types` – shared vocabulary of the btnet stack.
//!
//! Everything that crosses a crate boundary lives here: adapter and device
//! payloads, the raw notifications emitted by the OS feed, the request slots
//! used to correlate long-running operations, the caller-facing action set,
//! and the single [`BtError`] type delivered on failed requests.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Adapter lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Power lifecycle of the adapter as reported by the OS:
/// `Off → TurningOn → On → TurningOff → Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Off,
    TurningOn,
    On,
    TurningOff,
}

impl PowerState {
    /// `true` for `On` and `Off`, the states a transition settles in.
    pub fn is_stable(self) -> bool {
        matches!(self, PowerState::On | PowerState::Off)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::Off => write!(f, "off"),
            PowerState::TurningOn => write!(f, "turning-on"),
            PowerState::On => write!(f, "on"),
            PowerState::TurningOff => write!(f, "turning-off"),
        }
    }
}

/// Raw OS discoverability setting.
///
/// Only [`ScanMode::CONNECTABLE_DISCOVERABLE`] is surfaced to callers (as
/// [`AdapterState::discoverable`]); every other value is internal churn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanMode(pub i32);

impl ScanMode {
    pub const NONE: ScanMode = ScanMode(20);
    pub const CONNECTABLE: ScanMode = ScanMode(21);
    pub const CONNECTABLE_DISCOVERABLE: ScanMode = ScanMode(23);

    /// Whether this is the connectable + discoverable sentinel.
    pub fn is_discoverable(self) -> bool {
        self == Self::CONNECTABLE_DISCOVERABLE
    }
}

/// A request slot.
///
/// Identifies a *class* of long-running operation (enable, disable, one of
/// the system dialogs), not an individual request: at most one callback can
/// wait on a given code at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestCode(pub i32);

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of a system dialog (enable / disable / discoverable prompt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityOutcome {
    Ok,
    Cancelled,
}

impl FromStr for ActivityOutcome {
    type Err = BtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" => Ok(ActivityOutcome::Ok),
            "cancelled" | "canceled" => Ok(ActivityOutcome::Cancelled),
            other => Err(BtError::InvalidArgument(format!(
                "unknown dialog outcome '{other}' (expected ok / cancelled)"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of the adapter, rebuilt fresh on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterState {
    pub address: String,
    pub name: String,
    pub enabled: bool,
    pub discovering: bool,
    pub discoverable: bool,
}

/// A remote or bonded device known to the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub address: String,
    pub name: String,
    pub paired: bool,
    /// Service UUIDs in the order the OS reported them.
    pub uuids: Vec<String>,
}

impl DeviceInfo {
    /// Unpaired device with no advertised services.
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            paired: false,
            uuids: Vec::new(),
        }
    }
}

/// Raw notification delivered by the platform feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterNotification {
    StateChanged {
        previous: PowerState,
        current: PowerState,
    },
    DiscoveryStarted,
    DiscoveryFinished,
    ScanModeChanged {
        mode: ScanMode,
    },
    DeviceFound {
        device: DeviceInfo,
    },
}

/// Success payload of a one-shot request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Empty,
    AdapterState(AdapterState),
    Device(DeviceInfo),
    Devices(Vec<DeviceInfo>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Streamed events
// ─────────────────────────────────────────────────────────────────────────────

/// Standing event channels a caller can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventChannel {
    AdapterStateChanged,
    DeviceFound,
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventChannel::AdapterStateChanged => write!(f, "adapter-state-changed"),
            EventChannel::DeviceFound => write!(f, "device-found"),
        }
    }
}

/// Body of a streamed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    AdapterStateChanged(AdapterState),
    DeviceFound(DeviceInfo),
}

impl EventPayload {
    /// The channel this payload is delivered on.
    pub fn channel(&self) -> EventChannel {
        match self {
            EventPayload::AdapterStateChanged(_) => EventChannel::AdapterStateChanged,
            EventPayload::DeviceFound(_) => EventChannel::DeviceFound,
        }
    }
}

/// Envelope handed to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl AdapterEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Caller-facing actions
// ─────────────────────────────────────────────────────────────────────────────

/// One-shot actions: each produces exactly one terminal response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "args", rename_all = "camelCase")]
pub enum Request {
    GetAdapterState,
    RequestEnable,
    RequestDisable,
    Enable,
    Disable,
    GetDevice { address: String },
    GetDevices,
    StartDiscovery,
    StopDiscovery,
    RequestDiscoverable,
}

/// A parsed caller action: either a one-shot [`Request`] or a subscription
/// to a streamed [`EventChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Request(Request),
    Subscribe(EventChannel),
}

impl Action {
    /// Build an action from its wire name and argument list.
    ///
    /// `args` is either a JSON array of positional arguments or an object
    /// with named ones; only `getDevice` takes an argument (`address`).
    ///
    /// # Errors
    ///
    /// [`BtError::InvalidArgument`] for unknown actions and malformed
    /// arguments.
    pub fn parse(action: &str, args: &Value) -> Result<Action, BtError> {
        let request = match action {
            "getAdapterState" => Request::GetAdapterState,
            "requestEnable" => Request::RequestEnable,
            "requestDisable" => Request::RequestDisable,
            "enable" => Request::Enable,
            "disable" => Request::Disable,
            "getDevice" => Request::GetDevice {
                address: address_arg(args)?,
            },
            "getDevices" => Request::GetDevices,
            "startDiscovery" => Request::StartDiscovery,
            "stopDiscovery" => Request::StopDiscovery,
            "requestDiscoverable" => Request::RequestDiscoverable,
            "registerAdapterStateChanged" => {
                return Ok(Action::Subscribe(EventChannel::AdapterStateChanged));
            }
            "registerDeviceFound" | "registerDeviceAdded" => {
                return Ok(Action::Subscribe(EventChannel::DeviceFound));
            }
            other => {
                return Err(BtError::InvalidArgument(format!("Invalid action '{other}'")));
            }
        };
        Ok(Action::Request(request))
    }
}

fn address_arg(args: &Value) -> Result<String, BtError> {
    let raw = match args {
        Value::Array(items) => items.first(),
        Value::Object(map) => map.get("address"),
        _ => None,
    };
    match raw.and_then(Value::as_str) {
        Some(address) if !address.trim().is_empty() => Ok(address.trim().to_string()),
        _ => Err(BtError::InvalidArgument(
            "getDevice expects one non-empty address string".to_string(),
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure delivered on a request's own callback.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtError {
    #[error("Device does not support Bluetooth")]
    Unsupported,

    #[error("Request superseded by a newer request on the same slot")]
    Superseded,

    #[error("Adapter settled in the opposite state")]
    TransitionFailed,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Adapter could not start the transition")]
    CannotStart,

    #[error("Adapter refused to start discovery")]
    StartFailed,

    #[error("Adapter refused to stop discovery")]
    StopFailed,

    #[error("Unknown device address: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl BtError {
    /// Stable numeric code for callers that marshal errors as integers.
    pub fn code(&self) -> u32 {
        match self {
            BtError::Cancelled => 0,
            BtError::Superseded => 1,
            BtError::TransitionFailed => 2,
            BtError::CannotStart => 3,
            BtError::StartFailed => 4,
            BtError::StopFailed => 5,
            BtError::NotFound(_) => 6,
            BtError::InvalidArgument(_) => 7,
            BtError::Unsupported => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stable_power_states() {
        assert!(PowerState::On.is_stable());
        assert!(PowerState::Off.is_stable());
        assert!(!PowerState::TurningOn.is_stable());
        assert!(!PowerState::TurningOff.is_stable());
    }

    #[test]
    fn only_connectable_discoverable_is_discoverable() {
        assert!(ScanMode::CONNECTABLE_DISCOVERABLE.is_discoverable());
        assert!(!ScanMode::CONNECTABLE.is_discoverable());
        assert!(!ScanMode::NONE.is_discoverable());
        assert!(!ScanMode(99).is_discoverable());
    }

    #[test]
    fn parse_plain_actions() {
        assert_eq!(
            Action::parse("enable", &json!([])).unwrap(),
            Action::Request(Request::Enable)
        );
        assert_eq!(
            Action::parse("requestDiscoverable", &Value::Null).unwrap(),
            Action::Request(Request::RequestDiscoverable)
        );
    }

    #[test]
    fn parse_get_device_positional_and_named() {
        let positional = Action::parse("getDevice", &json!(["AA:BB:CC:DD:EE:FF"])).unwrap();
        let named = Action::parse("getDevice", &json!({ "address": "AA:BB:CC:DD:EE:FF" })).unwrap();
        let expected = Action::Request(Request::GetDevice {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
        });
        assert_eq!(positional, expected);
        assert_eq!(named, expected);
    }

    #[test]
    fn parse_get_device_without_address_is_invalid() {
        for args in [json!([]), json!([""]), json!([42]), json!({}), Value::Null] {
            let err = Action::parse("getDevice", &args).unwrap_err();
            assert!(matches!(err, BtError::InvalidArgument(_)), "args {args}");
        }
    }

    #[test]
    fn parse_register_aliases() {
        assert_eq!(
            Action::parse("registerDeviceAdded", &json!([])).unwrap(),
            Action::Subscribe(EventChannel::DeviceFound)
        );
        assert_eq!(
            Action::parse("registerDeviceFound", &json!([])).unwrap(),
            Action::Subscribe(EventChannel::DeviceFound)
        );
        assert_eq!(
            Action::parse("registerAdapterStateChanged", &json!([])).unwrap(),
            Action::Subscribe(EventChannel::AdapterStateChanged)
        );
    }

    #[test]
    fn parse_unknown_action_is_invalid() {
        let err = Action::parse("coolMethod", &json!(["hi"])).unwrap_err();
        assert_eq!(err.code(), 7);
        assert!(err.to_string().contains("coolMethod"));
    }

    #[test]
    fn request_wire_format_uses_action_tag() {
        let json = serde_json::to_value(Request::GetDevice {
            address: "11:22:33:44:55:66".into(),
        })
        .unwrap();
        assert_eq!(json["action"], "getDevice");
        assert_eq!(json["args"]["address"], "11:22:33:44:55:66");
    }

    #[test]
    fn empty_reply_serialises_as_null() {
        assert_eq!(serde_json::to_value(Reply::Empty).unwrap(), Value::Null);
    }

    #[test]
    fn error_codes_are_distinct() {
        let all = [
            BtError::Unsupported,
            BtError::Superseded,
            BtError::TransitionFailed,
            BtError::Cancelled,
            BtError::CannotStart,
            BtError::StartFailed,
            BtError::StopFailed,
            BtError::NotFound("x".into()),
            BtError::InvalidArgument("y".into()),
        ];
        let mut codes: Vec<u32> = all.iter().map(BtError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
        assert_eq!(BtError::Cancelled.code(), 0);
        assert_eq!(BtError::Superseded.code(), 1);
    }

    #[test]
    fn not_found_display_names_the_address() {
        let err = BtError::NotFound("00:11:22:33:44:55".into());
        assert!(err.to_string().contains("00:11:22:33:44:55"));
    }

    #[test]
    fn activity_outcome_from_str() {
        assert_eq!("OK".parse::<ActivityOutcome>().unwrap(), ActivityOutcome::Ok);
        assert_eq!(
            "canceled".parse::<ActivityOutcome>().unwrap(),
            ActivityOutcome::Cancelled
        );
        assert!("maybe".parse::<ActivityOutcome>().is_err());
    }

    #[test]
    fn payload_routes_to_its_channel() {
        let device = DeviceInfo::new("AA:AA:AA:AA:AA:AA", "speaker");
        let event = AdapterEvent::new(EventPayload::DeviceFound(device));
        assert_eq!(event.payload.channel(), EventChannel::DeviceFound);
    }
}
