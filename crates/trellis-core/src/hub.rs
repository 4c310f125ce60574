//! Listener registry and notification dispatch.
//!
//! A [`Hub`] is the observable half of every data source. It keeps an
//! ordered set of listeners and delivers [`Notification`]s to them.
//!
//! # Ownership
//!
//! The hub holds listeners through [`Weak`] references. Registering a
//! listener never keeps it alive; a listener that has been dropped is
//! silently skipped and pruned on the next registry access. Sources that
//! listen to other sources can therefore form chains without reference
//! cycles.
//!
//! # Dispatch
//!
//! Dispatch works on a snapshot of the registry, taken with the lock held
//! and then released. A listener may therefore add or remove listeners, or
//! read the source that notified it, from inside its callback. Changes to
//! the registry during a dispatch take effect with the next notification.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::{Hub, ListListener, ListNotification, ValueListener};
//!
//! struct Printer;
//! impl ValueListener<String> for Printer {}
//! impl ListListener<String> for Printer {
//!     fn post_insert(&self, index: usize, item: &String) -> trellis_core::Result<()> {
//!         println!("inserted {item} at {index}");
//!         Ok(())
//!     }
//! }
//!
//! let hub: Hub<dyn ListListener<String>> = Hub::new();
//! let printer = Arc::new(Printer);
//! hub.add_listener(printer.clone());
//!
//! let item = "hello".to_string();
//! hub.notify(&ListNotification::PostInsert { index: 0, item: &item }).unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::{span_names, targets};
use crate::notification::{Notification, Phase};
use crate::{Result, SourceError};

new_key_type! {
    /// Identifies a registered listener.
    ///
    /// Returned by [`Hub::add_listener`]; may be used with
    /// [`Hub::remove_listener_id`].
    pub struct ListenerId;
}

/// Registry storage: slot-keyed weak references plus registration order.
struct Registry<L: ?Sized> {
    slots: SlotMap<ListenerId, Weak<L>>,
    order: Vec<ListenerId>,
}

impl<L: ?Sized> Registry<L> {
    fn position_of(&self, address: *const ()) -> Option<usize> {
        self.order
            .iter()
            .position(|id| self.slots.get(*id).is_some_and(|weak| address_of_weak(weak) == address))
    }

    fn prune(&mut self) -> usize {
        let dead: Vec<ListenerId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.slots.get(*id).is_none_or(|weak| weak.strong_count() == 0))
            .collect();
        for id in &dead {
            self.slots.remove(*id);
        }
        self.order.retain(|id| !dead.contains(id));
        dead.len()
    }
}

fn address_of_weak<L: ?Sized>(weak: &Weak<L>) -> *const () {
    weak.as_ptr().cast::<()>()
}

/// An ordered set of listeners with pre/post notification support.
///
/// `L` is usually a trait object such as `dyn ListListener<Row>`.
/// Listeners are identified by address, so registering the same listener
/// twice has no effect.
///
/// # Thread Safety
///
/// `Hub<L>` is `Send + Sync` whenever `L` is. Callbacks run synchronously on
/// the thread that triggered the notification.
pub struct Hub<L: ?Sized> {
    registry: Mutex<Registry<L>>,
    /// Whether dispatch is temporarily suppressed.
    blocked: AtomicBool,
}

impl<L: ?Sized> Default for Hub<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> std::fmt::Debug for Hub<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("listener_count", &self.listener_count())
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

impl<L: ?Sized> Hub<L> {
    /// Create a hub with no listeners.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                slots: SlotMap::with_key(),
                order: Vec::new(),
            }),
            blocked: AtomicBool::new(false),
        }
    }

    /// Register a listener.
    ///
    /// Adding a listener that is already registered returns its existing id
    /// and leaves the registration order unchanged. The hub keeps only a
    /// weak reference; the caller must keep the listener alive.
    pub fn add_listener(&self, listener: Arc<L>) -> ListenerId {
        let weak = Arc::downgrade(&listener);
        let address = address_of_weak(&weak);
        let mut registry = self.registry.lock();
        registry.prune();

        if let Some(position) = registry.position_of(address) {
            tracing::trace!(target: targets::HUB, "listener already registered");
            return registry.order[position];
        }

        let id = registry.slots.insert(weak);
        registry.order.push(id);
        tracing::trace!(target: targets::HUB, listener_count = registry.order.len(), "listener added");
        id
    }

    /// Unregister a listener by identity.
    ///
    /// Accepts the listener itself or any reference that coerces to it,
    /// for example `&*Arc<MyListener>`.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the listener is not registered.
    pub fn remove_listener<T: ?Sized>(&self, listener: &T) -> Result<()> {
        let address = (listener as *const T).cast::<()>();
        let mut registry = self.registry.lock();

        let Some(position) = registry.position_of(address) else {
            return Err(SourceError::not_found("listener"));
        };
        let id = registry.order.remove(position);
        registry.slots.remove(id);
        tracing::trace!(target: targets::HUB, listener_count = registry.order.len(), "listener removed");
        Ok(())
    }

    /// Unregister a listener by the id returned from [`add_listener`](Self::add_listener).
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the id is not (or no longer) registered.
    pub fn remove_listener_id(&self, id: ListenerId) -> Result<()> {
        let mut registry = self.registry.lock();
        if registry.slots.remove(id).is_none() {
            return Err(SourceError::not_found("listener"));
        }
        registry.order.retain(|existing| *existing != id);
        Ok(())
    }

    /// Returns `true` if `listener` is registered and alive.
    pub fn contains<T: ?Sized>(&self, listener: &T) -> bool {
        let address = (listener as *const T).cast::<()>();
        let registry = self.registry.lock();
        registry
            .position_of(address)
            .is_some_and(|position| {
                registry.slots[registry.order[position]].strong_count() > 0
            })
    }

    /// Snapshot of the live listeners, in registration order.
    pub fn listeners(&self) -> Vec<Arc<L>> {
        let mut registry = self.registry.lock();
        let pruned = registry.prune();
        if pruned > 0 {
            tracing::debug!(target: targets::HUB, pruned, "dropped listeners pruned");
        }
        registry
            .order
            .iter()
            .filter_map(|id| registry.slots.get(*id).and_then(Weak::upgrade))
            .collect()
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        let registry = self.registry.lock();
        registry
            .slots
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Suppress or resume dispatch.
    ///
    /// While blocked, [`notify`](Self::notify) does nothing and
    /// [`pre_notify`](Self::pre_notify) runs its body without announcing it.
    /// Useful during bulk loads, followed by a single `clear`-style refresh.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if dispatch is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Deliver `notification` to every live listener, in registration order.
    ///
    /// Listeners that lack the corresponding capability are unaffected
    /// (their default callback is a no-op).
    ///
    /// # Errors
    ///
    /// The first error returned by a listener. Listeners after it are not
    /// notified.
    #[tracing::instrument(skip_all, target = "trellis_core::hub", level = "trace")]
    pub fn notify<N>(&self, notification: &N) -> Result<()>
    where
        N: Notification<L> + ?Sized,
    {
        if self.is_blocked() {
            tracing::trace!(target: targets::HUB, "hub blocked, skipping notify");
            return Ok(());
        }

        let listeners = self.listeners();
        tracing::trace!(
            target: targets::HUB,
            event = notification.name(),
            listener_count = listeners.len(),
            "dispatching notification"
        );

        for listener in &listeners {
            if let Err(error) = notification.deliver(&**listener) {
                tracing::warn!(
                    target: targets::HUB,
                    event = notification.name(),
                    %error,
                    "listener failed, aborting dispatch"
                );
                return Err(error);
            }
        }
        Ok(())
    }

    /// Bracket a mutation with pre and post notifications.
    ///
    /// `make` builds the notification for each [`Phase`]; `body` performs
    /// the mutation. The sequence is:
    ///
    /// 1. dispatch `make(Phase::Pre)`; if a listener fails, return its error
    ///    without running `body`
    /// 2. run `body`
    /// 3. dispatch `make(Phase::Post)`, even if `body` failed
    /// 4. return the result of `body`
    ///
    /// If both `body` and the post dispatch fail, the post dispatch error is
    /// returned and the body error is logged.
    #[tracing::instrument(skip_all, target = "trellis_core::hub", level = "trace")]
    pub fn pre_notify<N, T, M, B>(&self, make: M, body: B) -> Result<T>
    where
        N: Notification<L>,
        M: Fn(Phase) -> N,
        B: FnOnce() -> Result<T>,
    {
        let span = tracing::trace_span!(target: targets::HUB, span_names::MUTATION);
        let _entered = span.enter();

        self.notify(&make(Phase::Pre))?;
        let outcome = body();
        let post = self.notify(&make(Phase::Post));

        match (outcome, post) {
            (outcome, Ok(())) => outcome,
            (Ok(_), Err(error)) => Err(error),
            (Err(body_error), Err(error)) => {
                tracing::warn!(
                    target: targets::HUB,
                    %body_error,
                    "mutation failed and post notification failed"
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{ListListener, ValueListener};
    use crate::notification::ListNotification;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: log.clone(),
                fail_on: None,
            })
        }

        fn record(&self, event: &str) -> Result<()> {
            self.log.lock().push(format!("{}:{}", self.name, event));
            if self.fail_on == Some(event) {
                return Err(SourceError::listener(format!("{} refused {}", self.name, event)));
            }
            Ok(())
        }
    }

    impl ValueListener<i32> for Recorder {
        fn change(&self, item: &i32) -> Result<()> {
            self.record(&format!("change({item})"))
        }
    }

    impl ListListener<i32> for Recorder {
        fn pre_insert(&self, index: usize, _item: &i32) -> Result<()> {
            self.record(&format!("pre_insert({index})"))
        }

        fn post_insert(&self, index: usize, _item: &i32) -> Result<()> {
            self.record(&format!("post_insert({index})"))
        }

        fn clear(&self) -> Result<()> {
            self.record("clear")
        }
    }

    /// Only cares about value changes.
    struct ChangeOnly(Arc<Mutex<Vec<String>>>);

    impl ValueListener<i32> for ChangeOnly {
        fn change(&self, item: &i32) -> Result<()> {
            self.0.lock().push(format!("change-only:{item}"));
            Ok(())
        }
    }

    impl ListListener<i32> for ChangeOnly {}

    type TestHub = Hub<dyn ListListener<i32>>;

    #[test]
    fn test_add_listener_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let a = Recorder::new("a", &log);

        let first = hub.add_listener(a.clone());
        let second = hub.add_listener(a.clone());
        assert_eq!(first, second);
        assert_eq!(hub.listener_count(), 1);

        hub.notify(&ListNotification::Clear).unwrap();
        assert_eq!(*log.lock(), vec!["a:clear"]);
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let a = Recorder::new("a", &log);
        let b = Recorder::new("b", &log);
        hub.add_listener(b.clone());
        hub.add_listener(a.clone());

        hub.notify(&ListNotification::Change { item: &7 }).unwrap();
        assert_eq!(*log.lock(), vec!["b:change(7)", "a:change(7)"]);
    }

    #[test]
    fn test_remove_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let a = Recorder::new("a", &log);
        let b = Recorder::new("b", &log);
        hub.add_listener(a.clone());
        hub.add_listener(b.clone());

        hub.remove_listener(&*a).unwrap();
        assert!(!hub.contains(&*a));
        assert!(hub.contains(&*b));

        hub.notify(&ListNotification::Clear).unwrap();
        assert_eq!(*log.lock(), vec!["b:clear"]);
    }

    #[test]
    fn test_remove_unknown_listener_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let a = Recorder::new("a", &log);

        let err = hub.remove_listener(&*a).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remove_listener_by_id() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let a = Recorder::new("a", &log);
        let id = hub.add_listener(a.clone());

        hub.remove_listener_id(id).unwrap();
        assert_eq!(hub.listener_count(), 0);
        assert!(hub.remove_listener_id(id).is_err());
    }

    #[test]
    fn test_missing_capability_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let quiet = Arc::new(ChangeOnly(log.clone()));
        let a = Recorder::new("a", &log);
        hub.add_listener(quiet.clone());
        hub.add_listener(a.clone());

        hub.notify(&ListNotification::PreInsert { index: 3, item: &1 }).unwrap();
        hub.notify(&ListNotification::Change { item: &1 }).unwrap();
        assert_eq!(
            *log.lock(),
            vec!["a:pre_insert(3)", "change-only:1", "a:change(1)"]
        );
    }

    #[test]
    fn test_dropped_listener_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let a = Recorder::new("a", &log);
        let b = Recorder::new("b", &log);
        hub.add_listener(a.clone());
        hub.add_listener(b.clone());
        drop(a);

        assert_eq!(hub.listener_count(), 1);
        hub.notify(&ListNotification::Clear).unwrap();
        assert_eq!(*log.lock(), vec!["b:clear"]);
        assert_eq!(hub.listeners().len(), 1);
    }

    #[test]
    fn test_blocked_hub_does_not_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let a = Recorder::new("a", &log);
        hub.add_listener(a.clone());

        hub.set_blocked(true);
        assert!(hub.is_blocked());
        hub.notify(&ListNotification::Clear).unwrap();
        assert!(log.lock().is_empty());

        hub.set_blocked(false);
        hub.notify(&ListNotification::Clear).unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_listener_error_aborts_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let failing = Arc::new(Recorder {
            name: "a",
            log: log.clone(),
            fail_on: Some("clear"),
        });
        let b = Recorder::new("b", &log);
        hub.add_listener(failing.clone());
        hub.add_listener(b.clone());

        let err = hub.notify(&ListNotification::Clear).unwrap_err();
        assert!(matches!(err, SourceError::Listener(_)));
        assert_eq!(*log.lock(), vec!["a:clear"]);
    }

    #[test]
    fn test_pre_notify_brackets_body() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let a = Recorder::new("a", &log);
        hub.add_listener(a.clone());

        let item = 5;
        let body_log = log.clone();
        let value = hub
            .pre_notify(
                |phase| ListNotification::insert(phase, 2, &item),
                || {
                    body_log.lock().push("body".into());
                    Ok(42)
                },
            )
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(*log.lock(), vec!["a:pre_insert(2)", "body", "a:post_insert(2)"]);
    }

    #[test]
    fn test_pre_notify_posts_even_when_body_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let a = Recorder::new("a", &log);
        hub.add_listener(a.clone());

        let item = 5;
        let result: Result<()> = hub.pre_notify(
            |phase| ListNotification::insert(phase, 0, &item),
            || Err(SourceError::index(9, 0)),
        );

        assert!(result.unwrap_err().is_index());
        assert_eq!(*log.lock(), vec!["a:pre_insert(0)", "a:post_insert(0)"]);
    }

    #[test]
    fn test_pre_notify_skips_body_when_pre_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = TestHub::new();
        let failing = Arc::new(Recorder {
            name: "a",
            log: log.clone(),
            fail_on: Some("pre_insert(0)"),
        });
        hub.add_listener(failing.clone());

        let item = 5;
        let ran = Arc::new(Mutex::new(false));
        let ran_in_body = ran.clone();
        let result = hub.pre_notify(
            |phase| ListNotification::insert(phase, 0, &item),
            || {
                *ran_in_body.lock() = true;
                Ok(())
            },
        );

        assert!(result.is_err());
        assert!(!*ran.lock());
        assert_eq!(*log.lock(), vec!["a:pre_insert(0)"]);
    }

    #[test]
    fn test_listener_may_reenter_hub() {
        struct Remover {
            hub: Arc<TestHub>,
            log: Arc<Mutex<Vec<String>>>,
        }
        impl ValueListener<i32> for Remover {}
        impl ListListener<i32> for Remover {
            fn clear(&self) -> Result<()> {
                self.log.lock().push("remover:clear".into());
                self.hub.remove_listener(self)
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let hub = Arc::new(TestHub::new());
        let remover = Arc::new(Remover {
            hub: hub.clone(),
            log: log.clone(),
        });
        hub.add_listener(remover.clone());

        hub.notify(&ListNotification::Clear).unwrap();
        hub.notify(&ListNotification::Clear).unwrap();
        assert_eq!(*log.lock(), vec!["remover:clear"]);
    }
}
