//! `btnet-kernel` – Request / Event Correlation
//!
//! Sits between callers and the adapter driver. It does not talk to the
//! radio itself; it decides which waiting request a notification completes
//! and which subscriber hears about it.
//!
//! # Modules
//!
//! - [`request_codes`] – [`RequestCodes`][request_codes::RequestCodes]:
//!   the slot numbers of the five long-running request classes.
//! - [`pending_table`] – [`PendingRequestTable`][pending_table::PendingRequestTable]:
//!   one outstanding responder per slot, superseding on collision.
//! - [`state_machine`] – [`AdapterStateMachine`][state_machine::AdapterStateMachine]:
//!   interprets power, discovery, scan-mode and device notifications from the
//!   driver's feed.
//! - [`dispatcher`] – [`RequestDispatcher`][dispatcher::RequestDispatcher]:
//!   the façade callers talk to. Validates that an adapter exists, invokes it,
//!   and parks responders until their completion arrives.

pub mod dispatcher;
pub mod pending_table;
pub mod request_codes;
pub mod state_machine;

pub use dispatcher::RequestDispatcher;
pub use pending_table::PendingRequestTable;
pub use request_codes::RequestCodes;
pub use state_machine::{AdapterStateMachine, ScanModeTracker};
