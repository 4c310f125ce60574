//! Core systems for Trellis.
//!
//! This crate provides the observable plumbing shared by every Trellis data
//! source:
//!
//! - **Hub**: an ordered, weak-referencing listener registry with
//!   single-shot and two-phase (pre/post) notification
//! - **Listener traits**: [`ValueListener`], [`ListListener`] and
//!   [`TreeListener`], each with no-op defaults
//! - **Notifications**: typed payloads that route to listener callbacks
//! - **Errors**: the [`SourceError`] taxonomy
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use trellis_core::{Hub, ListListener, ListNotification, ValueListener};
//!
//! #[derive(Default)]
//! struct Counter(Mutex<usize>);
//!
//! impl ValueListener<u32> for Counter {}
//! impl ListListener<u32> for Counter {
//!     fn post_insert(&self, _index: usize, _item: &u32) -> trellis_core::Result<()> {
//!         *self.0.lock() += 1;
//!         Ok(())
//!     }
//! }
//!
//! let hub: Hub<dyn ListListener<u32>> = Hub::new();
//! let counter = Arc::new(Counter::default());
//! hub.add_listener(counter.clone());
//!
//! let mut items = Vec::new();
//! let value = 10;
//! hub.pre_notify(
//!     |phase| ListNotification::insert(phase, 0, &value),
//!     || {
//!         items.push(value);
//!         Ok(())
//!     },
//! )
//! .unwrap();
//!
//! assert_eq!(*counter.0.lock(), 1);
//! ```

mod error;
mod hub;
mod listener;
pub mod logging;
mod notification;

pub use error::{BoxedListenerError, Result, SourceError};
pub use hub::{Hub, ListenerId};
pub use listener::{ListListener, TreeListener, ValueListener};
pub use notification::{ListNotification, Notification, Phase, TreeNotification, ValueNotification};
