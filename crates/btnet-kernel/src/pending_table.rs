//! [`PendingRequestTable`] – one outstanding [`Responder`] per request slot.
//!
//! A [`RequestCode`] names a slot, not a request. Putting into an occupied
//! slot fails the resident responder with [`BtError::Superseded`] before the
//! new one takes its place; taking empties the slot and hands the responder
//! to the caller, who then completes it. Every responder therefore leaves
//! the table exactly once.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use btnet_middleware::Responder;
use btnet_types::{BtError, RequestCode};
use tracing::{debug, warn};

/// Slot table shared by the dispatcher (which fills it) and the state
/// machine / dialog forwarders (which drain it).
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    slots: Mutex<HashMap<RequestCode, Responder>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupy `code` with `responder`.
    ///
    /// A displaced responder is failed with [`BtError::Superseded`] after the
    /// lock is released but before this call returns, so a displaced
    /// closure may itself call back into the table.
    pub fn put(&self, code: RequestCode, responder: Responder) {
        let displaced = self.lock().insert(code, responder);
        match displaced {
            Some(old) => {
                warn!(%code, "pending request superseded");
                old.fail(BtError::Superseded);
            }
            None => debug!(%code, "request slot occupied"),
        }
    }

    /// Occupy `code` with `responder` and hand back whatever was displaced,
    /// still uncompleted.
    ///
    /// The caller owns the displaced responder: it must complete it or
    /// `replace` it back into the slot.
    pub fn replace(&self, code: RequestCode, responder: Responder) -> Option<Responder> {
        let displaced = self.lock().insert(code, responder);
        debug!(%code, displaced = displaced.is_some(), "request slot replaced");
        displaced
    }

    /// Empty `code`, returning its responder if there was one.
    pub fn take(&self, code: RequestCode) -> Option<Responder> {
        self.lock().remove(&code)
    }

    pub fn is_occupied(&self, code: RequestCode) -> bool {
        self.lock().contains_key(&code)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestCode, Responder>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btnet_types::Reply;
    use std::sync::Arc;

    const SLOT: RequestCode = RequestCode(7);

    #[test]
    fn every_displaced_responder_is_superseded_once() {
        let table = PendingRequestTable::new();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (responder, rx) = Responder::channel();
            table.put(SLOT, responder);
            receivers.push(rx);
        }

        let mut last = receivers.pop().unwrap();
        for mut rx in receivers {
            assert_eq!(rx.try_recv(), Some(Err(BtError::Superseded)));
        }
        assert_eq!(last.try_recv(), None);
        assert_eq!(table.len(), 1);

        table.take(SLOT).unwrap().succeed_empty();
        assert_eq!(last.try_recv(), Some(Ok(Reply::Empty)));
    }

    #[test]
    fn take_on_empty_slot_is_absent() {
        let table = PendingRequestTable::new();
        assert!(table.take(SLOT).is_none());
        assert!(table.is_empty());
        assert!(!table.is_occupied(SLOT));
    }

    #[test]
    fn take_empties_the_slot() {
        let table = PendingRequestTable::new();
        let (responder, _rx) = Responder::channel();
        table.put(SLOT, responder);
        assert!(table.is_occupied(SLOT));
        assert!(table.take(SLOT).is_some());
        assert!(table.take(SLOT).is_none());
    }

    #[test]
    fn slots_are_independent() {
        let table = PendingRequestTable::new();
        let (a, mut rx_a) = Responder::channel();
        let (b, mut rx_b) = Responder::channel();
        table.put(RequestCode(1), a);
        table.put(RequestCode(2), b);

        assert_eq!(table.len(), 2);
        assert_eq!(rx_a.try_recv(), None);
        assert_eq!(rx_b.try_recv(), None);
    }

    #[test]
    fn replace_hands_back_displaced_responder_uncompleted() {
        let table = PendingRequestTable::new();
        let (first, mut first_rx) = Responder::channel();
        let (second, mut second_rx) = Responder::channel();
        assert!(table.replace(SLOT, first).is_none());

        let displaced = table.replace(SLOT, second).expect("first is displaced");
        assert_eq!(first_rx.try_recv(), None);

        // Put the first back; the second comes out, still pending.
        let second = table.replace(SLOT, displaced).expect("second is displaced");
        assert_eq!(second_rx.try_recv(), None);
        second.fail(BtError::CannotStart);
        assert_eq!(second_rx.try_recv(), Some(Err(BtError::CannotStart)));

        table.take(SLOT).unwrap().succeed_empty();
        assert_eq!(first_rx.try_recv(), Some(Ok(Reply::Empty)));
    }

    #[test]
    fn displaced_closure_may_reenter_the_table() {
        let table = Arc::new(PendingRequestTable::new());
        let inner = Arc::clone(&table);
        table.put(
            SLOT,
            Responder::from_fn(move |response| {
                assert_eq!(response, Err(BtError::Superseded));
                // Would deadlock if the lock were still held.
                assert!(inner.is_occupied(SLOT));
            }),
        );
        let (responder, _rx) = Responder::channel();
        table.put(SLOT, responder);
        assert_eq!(table.len(), 1);
    }
}
