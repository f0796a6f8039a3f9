//! [`RequestCodes`] – slot numbers for the long-running request classes.
//!
//! | Class | Default |
//! |---|---|
//! | direct enable | 1 |
//! | direct disable | 2 |
//! | enable dialog | 1773 |
//! | discoverable dialog | 1774 |
//! | disable dialog | 1775 |
//!
//! A host may map two classes onto the same code. They then share a single
//! slot in the [`PendingRequestTable`][crate::pending_table::PendingRequestTable]
//! and supersede each other.

use btnet_types::RequestCode;
use serde::{Deserialize, Serialize};

/// Slot assignment used by the dispatcher and the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestCodes {
    pub enable: RequestCode,
    pub disable: RequestCode,
    pub enable_dialog: RequestCode,
    pub discoverable_dialog: RequestCode,
    pub disable_dialog: RequestCode,
}

impl Default for RequestCodes {
    fn default() -> Self {
        Self {
            enable: RequestCode(1),
            disable: RequestCode(2),
            enable_dialog: RequestCode(1773),
            discoverable_dialog: RequestCode(1774),
            disable_dialog: RequestCode(1775),
        }
    }
}
