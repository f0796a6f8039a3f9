//! [`EventSubscriptionRegistry`] – one standing subscriber per channel.
//!
//! Unlike the pending-request slots, a channel holds a [`Subscriber`] that is
//! invoked again for every matching notification. Registering a second
//! subscriber on the same channel replaces the first without telling it;
//! when the displaced subscriber was a channel, its [`EventStream`] simply
//! ends once the registry drops the last sender.
//!
//! [`EventStream`]: crate::responder::EventStream

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use btnet_types::{AdapterEvent, EventChannel, EventPayload};
use tracing::{debug, trace};

use crate::responder::Subscriber;

/// Holds the current [`Subscriber`] of each [`EventChannel`].
#[derive(Debug, Default)]
pub struct EventSubscriptionRegistry {
    subscribers: Mutex<HashMap<EventChannel, Subscriber>>,
}

impl EventSubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `subscriber` the current subscriber of `channel`.
    ///
    /// Returns `true` when a previous subscriber was replaced.
    pub fn subscribe(&self, channel: EventChannel, subscriber: Subscriber) -> bool {
        let replaced = self.lock().insert(channel, subscriber).is_some();
        if replaced {
            debug!(%channel, "event subscriber replaced");
        } else {
            debug!(%channel, "event subscriber registered");
        }
        replaced
    }

    /// Deliver `payload` to the subscriber of its channel, if any.
    ///
    /// The subscriber stays registered. Returns `true` when an event was
    /// handed to a live subscriber.
    pub fn notify(&self, payload: EventPayload) -> bool {
        let channel = payload.channel();
        // Clone out so the subscriber runs without the lock held.
        let subscriber = self.lock().get(&channel).cloned();
        match subscriber {
            Some(subscriber) => {
                let delivered = subscriber.notify(AdapterEvent::new(payload));
                if !delivered {
                    debug!(%channel, "event subscriber stream is closed");
                }
                delivered
            }
            None => {
                trace!(%channel, "no subscriber; event dropped");
                false
            }
        }
    }

    /// Whether `channel` currently has a subscriber.
    pub fn is_subscribed(&self, channel: EventChannel) -> bool {
        self.lock().contains_key(&channel)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventChannel, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
