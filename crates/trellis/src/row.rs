//! Rows: the items of list sources.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use trellis_core::logging::targets;
use trellis_core::{Hub, ListListener, ListNotification, Result};

use crate::accessors::{Accessors, SourceConfig};
use crate::record::{Fields, RawRecord};
use crate::value::Value;

/// The listener registry type owned by list-shaped sources.
pub type ListHub = Hub<dyn ListListener<Row>>;

/// Global counter for generating unique row IDs.
static ROW_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_row_id() -> u64 {
    ROW_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct RowInner {
    id: u64,
    fields: RwLock<Fields>,
    /// Sources notified when a field is assigned, one entry per place the
    /// row occupies. Never owning.
    owners: RwLock<Vec<Weak<ListHub>>>,
}

/// One item of a list source: named fields plus extra attributes.
///
/// `Row` is a shared handle; clones refer to the same row, and equality is
/// identity. Assigning a field through [`set`](Row::set) notifies the
/// listeners of every source holding the row with a `change` event, so one
/// row can back several synchronized views.
///
/// # Example
///
/// ```
/// use trellis::{ListSource, SourceConfig, Value};
///
/// let source = ListSource::new(SourceConfig::new(["title", "year"]).unwrap());
/// let row = source.append(vec![Value::from("Heat"), Value::from(1995)]).unwrap();
///
/// assert_eq!(row.get("title"), Some(Value::from("Heat")));
/// row.set("year", 1996).unwrap();
/// assert_eq!(source.get(0).unwrap().get("year"), Some(Value::from(1996)));
/// ```
#[derive(Clone)]
pub struct Row {
    inner: Arc<RowInner>,
}

impl Row {
    /// Build a row that does not belong to any source yet.
    ///
    /// A `RawRecord::Row` is returned as-is.
    pub fn new(config: &SourceConfig, raw: impl Into<RawRecord>) -> Result<Row> {
        match raw.into() {
            RawRecord::Row(row) => Ok(row),
            raw => Ok(Self::from_fields(Fields::from_raw(
                raw,
                config.accessors(),
                config.missing_value(),
            )?)),
        }
    }

    fn from_fields(fields: Fields) -> Self {
        Self {
            inner: Arc::new(RowInner {
                id: next_row_id(),
                fields: RwLock::new(fields),
                owners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Unique identifier of this row.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Value of the field or extra attribute `name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.fields.read().get(name).cloned()
    }

    /// Assign the field or extra attribute `name` and notify the listeners
    /// of each source holding the row with `change`.
    ///
    /// Every owning source is notified once, even if a listener of an
    /// earlier one fails.
    ///
    /// # Errors
    ///
    /// [`SourceError::UnknownField`](trellis_core::SourceError::UnknownField)
    /// if the row has no such attribute; the first listener error from the
    /// `change` dispatches. In the latter case the value has already been
    /// stored.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.inner.fields.write().set(name, value.into())?;
        let owners = self.owners();
        tracing::trace!(
            target: targets::ROW,
            row = self.id(),
            field = name,
            owners = owners.len(),
            "row field assigned"
        );

        let mut first_error = None;
        for hub in owners {
            if let Err(error) = hub.notify(&ListNotification::Change { item: self }) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// The accessors this row was built against.
    pub fn accessors(&self) -> Accessors {
        self.inner.fields.read().accessors().clone()
    }

    /// Accessor fields, in accessor order.
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.inner.fields.read().pairs()
    }

    /// Extra attributes supplied by a mapping record, in name order.
    pub fn extras(&self) -> Vec<(String, Value)> {
        self.inner.fields.read().extras()
    }

    /// Value of an extra attribute only.
    pub fn extra(&self, name: &str) -> Option<Value> {
        let fields = self.inner.fields.read();
        if fields.accessors().contains(name) {
            return None;
        }
        fields.get(name).cloned()
    }

    /// Returns `true` if both handles refer to the same row.
    pub fn ptr_eq(&self, other: &Row) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn fields_with_extras(&self) -> Vec<(String, Value)> {
        let fields = self.inner.fields.read();
        let mut all = fields.pairs();
        all.extend(fields.extras());
        all
    }

    /// Returns `true` if a live source holds this row.
    pub fn has_owner(&self) -> bool {
        self.inner.owners.read().iter().any(|owner| owner.strong_count() > 0)
    }

    /// Live owning sources, each listed once.
    fn owners(&self) -> Vec<Arc<ListHub>> {
        let mut live: Vec<Arc<ListHub>> = Vec::new();
        for hub in self.inner.owners.read().iter().filter_map(Weak::upgrade) {
            if !live.iter().any(|seen| Arc::ptr_eq(seen, &hub)) {
                live.push(hub);
            }
        }
        live
    }

    /// Record that `hub`'s source now holds the row in one more place.
    pub(crate) fn adopt(&self, hub: &Arc<ListHub>) {
        let mut owners = self.inner.owners.write();
        owners.retain(|owner| owner.strong_count() > 0);
        owners.push(Arc::downgrade(hub));
    }

    /// Record that `hub`'s source holds the row in one place fewer.
    pub(crate) fn release(&self, hub: &Arc<ListHub>) {
        let mut owners = self.inner.owners.write();
        if let Some(at) = owners.iter().position(|owner| std::ptr::eq(owner.as_ptr(), Arc::as_ptr(hub))) {
            owners.remove(at);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_owned_by(&self, hub: &Arc<ListHub>) -> bool {
        self.inner
            .owners
            .read()
            .iter()
            .any(|owner| std::ptr::eq(owner.as_ptr(), Arc::as_ptr(hub)))
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Row {}

impl std::hash::Hash for Row {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Row");
        debug.field("id", &self.id());
        for (name, value) in self.fields_with_extras() {
            debug.field(&name, &value);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use trellis_core::{SourceError, ValueListener};

    struct ChangeLog(Mutex<Vec<u64>>);

    impl ValueListener<Row> for ChangeLog {
        fn change(&self, item: &Row) -> Result<()> {
            self.0.lock().push(item.id());
            Ok(())
        }
    }

    impl ListListener<Row> for ChangeLog {}

    fn config() -> SourceConfig {
        SourceConfig::new(["name", "age"]).unwrap()
    }

    #[test]
    fn test_unowned_row_set_is_silent() {
        let row = Row::new(&config(), RawRecord::mapping([("name", "Ada")])).unwrap();
        row.set("age", 36).unwrap();
        assert_eq!(row.get("age"), Some(Value::from(36)));
        assert!(!row.has_owner());
    }

    #[test]
    fn test_set_notifies_owner() {
        let hub = Arc::new(ListHub::new());
        let log = Arc::new(ChangeLog(Mutex::new(Vec::new())));
        hub.add_listener(log.clone());

        let row = Row::new(&config(), RawRecord::scalar("Ada")).unwrap();
        row.adopt(&hub);
        row.set("name", "Grace").unwrap();

        assert_eq!(*log.0.lock(), vec![row.id()]);
    }

    #[test]
    fn test_unknown_field() {
        let row = Row::new(&config(), RawRecord::scalar("Ada")).unwrap();
        let err = row.set("email", "ada@example.com").unwrap_err();
        assert!(matches!(err, SourceError::UnknownField(_)));
    }

    #[test]
    fn test_extras() {
        let record = RawRecord::mapping([("name", "Ada"), ("email", "ada@example.com")]);
        let row = Row::new(&config(), record).unwrap();
        assert_eq!(row.extra("email"), Some(Value::from("ada@example.com")));
        assert_eq!(row.extra("name"), None);
        assert_eq!(row.get("email"), Some(Value::from("ada@example.com")));
        assert_eq!(row.fields().len(), 2);
        assert_eq!(row.extras().len(), 1);
    }

    #[test]
    fn test_identity() {
        let a = Row::new(&config(), RawRecord::scalar("Ada")).unwrap();
        let b = Row::new(&config(), RawRecord::scalar("Ada")).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_ne!(a.id(), b.id());

        let same = Row::new(&config(), a.clone()).unwrap();
        assert!(same.ptr_eq(&a));
    }

    #[test]
    fn test_every_owner_is_notified() {
        let first = Arc::new(ListHub::new());
        let second = Arc::new(ListHub::new());
        let first_log = Arc::new(ChangeLog(Mutex::new(Vec::new())));
        let second_log = Arc::new(ChangeLog(Mutex::new(Vec::new())));
        first.add_listener(first_log.clone());
        second.add_listener(second_log.clone());

        let row = Row::new(&config(), RawRecord::scalar("Ada")).unwrap();
        row.adopt(&first);
        row.adopt(&second);
        row.adopt(&second);
        row.set("age", 36).unwrap();

        assert_eq!(*first_log.0.lock(), vec![row.id()]);
        assert_eq!(*second_log.0.lock(), vec![row.id()]);
    }

    #[test]
    fn test_release_counts_places() {
        let first = Arc::new(ListHub::new());
        let second = Arc::new(ListHub::new());
        let row = Row::new(&config(), RawRecord::scalar("Ada")).unwrap();

        row.adopt(&first);
        row.adopt(&first);
        row.adopt(&second);

        row.release(&first);
        assert!(row.is_owned_by(&first));
        row.release(&first);
        assert!(!row.is_owned_by(&first));
        assert!(row.is_owned_by(&second));

        drop(second);
        assert!(!row.has_owner());
    }
}
