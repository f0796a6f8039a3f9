//! `btnet-hal` – Adapter Abstraction Layer
//!
//! # Modules
//!
//! - [`adapter`] – the [`BluetoothAdapter`] capability trait every radio
//!   driver implements, plus [`DialogHandle`] for system prompts and the
//!   [`NotificationFeed`] type carrying asynchronous OS notifications.
//! - [`sim`] – [`SimAdapter`], an in-process simulated adapter for tests
//!   and the CLI.

pub mod adapter;
pub mod sim;

pub use adapter::{
    BluetoothAdapter, DialogCompleter, DialogHandle, NotificationFeed, NotificationSender,
    notification_channel,
};
pub use sim::{SimAdapter, SimAdapterBuilder, SimCall, SimFault};
