//! Flat, ordered, observable collections of rows.
//!
//! [`ListSource`] owns its rows and announces every structural mutation to
//! its listeners as a pre/post pair. [`ListData`] is the read-and-observe
//! interface shared with derived sources, so widgets and other derived
//! sources can sit on top of either.

use std::sync::Arc;

use parking_lot::RwLock;
use trellis_core::logging::targets;
use trellis_core::{ListListener, ListNotification, ListenerId, Result, SourceError};

use crate::accessors::{Accessors, SourceConfig};
use crate::record::RawRecord;
use crate::row::{ListHub, Row};
use crate::value::Value;

/// Read access plus listener registration for list-shaped sources.
///
/// Implemented by [`ListSource`] and [`DerivedSource`](crate::DerivedSource).
pub trait ListData: Send + Sync {
    /// Number of rows.
    fn len(&self) -> usize;

    /// Returns `true` if there are no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The row at `index`.
    ///
    /// # Errors
    ///
    /// [`SourceError::Index`] if `index` is out of range.
    fn get(&self, index: usize) -> Result<Row>;

    /// Position of `row`, by identity.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the row is not present.
    fn index_of(&self, row: &Row) -> Result<usize>;

    /// Snapshot of all rows, in order.
    fn rows(&self) -> Vec<Row>;

    /// The listener registry.
    fn hub(&self) -> &Arc<ListHub>;

    /// Register a listener. Idempotent; the source keeps only a weak
    /// reference.
    fn add_listener(&self, listener: Arc<dyn ListListener<Row>>) -> ListenerId {
        self.hub().add_listener(listener)
    }

    /// Unregister a listener.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the listener is not registered.
    fn remove_listener(&self, listener: &dyn ListListener<Row>) -> Result<()> {
        self.hub().remove_listener(listener)
    }

    /// Snapshot of the registered listeners.
    fn listeners(&self) -> Vec<Arc<dyn ListListener<Row>>> {
        self.hub().listeners()
    }
}

/// An observable list of [`Row`]s.
///
/// Every mutation that changes the structure of the list is bracketed by
/// `pre_*` and `post_*` notifications carrying the same index and row;
/// `clear` emits a single `clear` notification. Listeners are notified with
/// no internal lock held, so they may read the source from their callbacks.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use trellis::{ListListener, ListSource, Row, SourceConfig, Value, ValueListener};
///
/// struct Echo;
/// impl ValueListener<Row> for Echo {}
/// impl ListListener<Row> for Echo {
///     fn post_insert(&self, index: usize, row: &Row) -> trellis::Result<()> {
///         println!("row {} inserted at {index}", row.id());
///         Ok(())
///     }
/// }
///
/// let source = ListSource::new(SourceConfig::new(["name", "score"]).unwrap());
/// let echo = Arc::new(Echo);
/// source.add_listener(echo.clone());
///
/// source.append(vec![Value::from("ada"), Value::from(3)]).unwrap();
/// source.insert(0, vec![Value::from("bob"), Value::from(5)]).unwrap();
/// assert_eq!(source.get(1).unwrap().get("name"), Some(Value::from("ada")));
/// ```
pub struct ListSource {
    config: SourceConfig,
    rows: RwLock<Vec<Row>>,
    hub: Arc<ListHub>,
}

impl ListSource {
    /// Creates an empty list source.
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            rows: RwLock::new(Vec::new()),
            hub: Arc::new(ListHub::new()),
        }
    }

    /// Creates a list source populated from `records`. No notifications are
    /// emitted.
    ///
    /// # Errors
    ///
    /// Any error from building a row.
    pub fn with_data<I>(config: SourceConfig, records: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<RawRecord>,
    {
        let source = Self::new(config);
        let rows = records
            .into_iter()
            .map(|record| Row::new(&source.config, record))
            .collect::<Result<Vec<_>>>()?;
        for row in &rows {
            row.adopt(&source.hub);
        }
        tracing::debug!(target: targets::LIST, count = rows.len(), "list source populated");
        *source.rows.write() = rows;
        Ok(source)
    }

    /// The configuration this source was built with.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// The accessor list.
    pub fn accessors(&self) -> &Accessors {
        self.config.accessors()
    }

    /// The missing-value sentinel.
    pub fn missing_value(&self) -> &Value {
        self.config.missing_value()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns `true` if the source has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// The row at `index`.
    pub fn get(&self, index: usize) -> Result<Row> {
        let rows = self.rows.read();
        rows.get(index).cloned().ok_or_else(|| SourceError::index(index, rows.len()))
    }

    /// Position of `row`, by identity.
    pub fn index_of(&self, row: &Row) -> Result<usize> {
        self.rows
            .read()
            .iter()
            .position(|r| r.ptr_eq(row))
            .ok_or_else(|| SourceError::not_found(format!("row {}", row.id())))
    }

    /// Snapshot of all rows, in order.
    pub fn rows(&self) -> Vec<Row> {
        self.rows.read().clone()
    }

    /// Insert a row built from `raw` at `index`.
    ///
    /// An `index` past the end appends. Emits `pre_insert` and
    /// `post_insert` with the index actually used. An existing row is used
    /// as-is and may sit in several sources, or several times in one.
    ///
    /// # Errors
    ///
    /// Any error from building the row or from a listener. If a
    /// `pre_insert` listener fails, nothing is inserted.
    pub fn insert(&self, index: usize, raw: impl Into<RawRecord>) -> Result<Row> {
        let row = Row::new(&self.config, raw)?;
        let index = index.min(self.len());
        tracing::debug!(target: targets::LIST, index, row = row.id(), "inserting row");

        self.hub.pre_notify(
            |phase| ListNotification::insert(phase, index, &row),
            || {
                {
                    let mut rows = self.rows.write();
                    let at = index.min(rows.len());
                    rows.insert(at, row.clone());
                }
                row.adopt(&self.hub);
                Ok(())
            },
        )?;
        Ok(row)
    }

    /// Insert a row at the end.
    pub fn append(&self, raw: impl Into<RawRecord>) -> Result<Row> {
        self.insert(usize::MAX, raw)
    }

    /// Insert a row at the start.
    pub fn prepend(&self, raw: impl Into<RawRecord>) -> Result<Row> {
        self.insert(0, raw)
    }

    /// Remove `row`, emitting `pre_remove` and `post_remove`. A row held
    /// more than once loses its first place.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the row is not in this source (nothing
    /// is emitted); any listener error.
    pub fn remove(&self, row: &Row) -> Result<Row> {
        let index = self.index_of(row)?;
        self.remove_at(index)
    }

    /// Remove the row at `index`, emitting `pre_remove` and `post_remove`.
    ///
    /// # Errors
    ///
    /// [`SourceError::Index`] if `index` is out of range (nothing is
    /// emitted); any listener error. If only `post_remove` fails, the row
    /// has already been removed.
    pub fn remove_at(&self, index: usize) -> Result<Row> {
        let row = self.get(index)?;
        tracing::debug!(target: targets::LIST, index, row = row.id(), "removing row");

        self.hub.pre_notify(
            |phase| ListNotification::remove(phase, index, &row),
            || {
                {
                    let mut rows = self.rows.write();
                    if index >= rows.len() {
                        return Err(SourceError::index(index, rows.len()));
                    }
                    rows.remove(index);
                }
                row.release(&self.hub);
                Ok(())
            },
        )?;
        Ok(row)
    }

    /// Replace the row at `index` with one built from `raw`.
    ///
    /// Announced as a remove pair followed by an insert pair at the same
    /// index. Returns the new row.
    ///
    /// # Errors
    ///
    /// [`SourceError::Index`] if `index` is out of range; any error from
    /// building the row or from a listener.
    pub fn replace(&self, index: usize, raw: impl Into<RawRecord>) -> Result<Row> {
        let replacement = Row::new(&self.config, raw)?;
        self.remove_at(index)?;
        self.insert(index, replacement)
    }

    /// Remove every row, emitting a single `clear`.
    pub fn clear(&self) -> Result<()> {
        let removed = std::mem::take(&mut *self.rows.write());
        tracing::debug!(target: targets::LIST, count = removed.len(), "clearing list source");
        for row in &removed {
            row.release(&self.hub);
        }
        self.hub.notify(&ListNotification::Clear)
    }

    /// First row after `start` (or from the beginning) matching `query`.
    ///
    /// A mapping query matches rows whose named fields all equal the
    /// query's; a sequence query compares against the accessors in order; a
    /// scalar query compares the first accessor.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if `start` is not in this source or no row
    /// matches.
    pub fn find(&self, query: impl Into<RawRecord>, start: Option<&Row>) -> Result<Row> {
        let query = query.into();
        let from = match start {
            Some(start) => self.index_of(start)? + 1,
            None => 0,
        };
        self.rows()
            .into_iter()
            .skip(from)
            .find(|row| query.matches(self.accessors(), |name| row.get(name)))
            .ok_or_else(|| SourceError::not_found(format!("row matching {query:?}")))
    }

    /// Register a listener. Idempotent; the source keeps only a weak
    /// reference, so the caller must keep the listener alive.
    pub fn add_listener(&self, listener: Arc<dyn ListListener<Row>>) -> ListenerId {
        self.hub.add_listener(listener)
    }

    /// Unregister a listener.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the listener is not registered.
    pub fn remove_listener(&self, listener: &dyn ListListener<Row>) -> Result<()> {
        self.hub.remove_listener(listener)
    }

    /// Snapshot of the registered listeners.
    pub fn listeners(&self) -> Vec<Arc<dyn ListListener<Row>>> {
        self.hub.listeners()
    }

    /// The listener registry.
    pub fn hub(&self) -> &Arc<ListHub> {
        &self.hub
    }
}

impl ListData for ListSource {
    fn len(&self) -> usize {
        ListSource::len(self)
    }

    fn get(&self, index: usize) -> Result<Row> {
        ListSource::get(self, index)
    }

    fn index_of(&self, row: &Row) -> Result<usize> {
        ListSource::index_of(self, row)
    }

    fn rows(&self) -> Vec<Row> {
        ListSource::rows(self)
    }

    fn hub(&self) -> &Arc<ListHub> {
        &self.hub
    }
}

impl std::fmt::Debug for ListSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListSource")
            .field("accessors", self.accessors())
            .field("len", &self.len())
            .field("listeners", &self.hub.listener_count())
            .finish()
    }
}
