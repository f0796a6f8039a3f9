//! `btnet-middleware` – callback plumbing between requests and completions.
//!
//! Routes results and events back to callers without caring what they mean.
//!
//! # Modules
//!
//! - [`responder`] – [`Responder`], the one-shot sink that receives exactly
//!   one terminal result, and [`Subscriber`], the keep-alive sink that
//!   receives any number of streamed events.
//! - [`subscription`] – [`EventSubscriptionRegistry`]: one standing
//!   [`Subscriber`] per event channel.

pub mod responder;
pub mod subscription;

pub use responder::{EventStream, Responder, Response, ResponseReceiver, Subscriber};
pub use subscription::EventSubscriptionRegistry;
