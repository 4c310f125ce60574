//! Filtered and sorted views over list-shaped sources.
//!
//! A [`DerivedSource`] listens to an upstream [`ListData`] and republishes
//! its rows through a filter predicate and an optional stable sort.
//! Upstream notifications are translated into the derived source's own
//! index space, so a widget bound to the derived source sees a consistent
//! list at every step.
//!
//! The derived source keeps the list it last published. Reads (`len`,
//! `get`, `index_of`) answer from that list, and every upstream notification
//! brings it up to date before the corresponding derived notification is
//! sent.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use trellis_core::logging::targets;
use trellis_core::{ListListener, ListNotification, ListenerId, Result, SourceError, ValueListener};

use crate::list_source::ListData;
use crate::row::{ListHub, Row};

/// Type alias for a filter predicate.
///
/// Returns `true` if the row should be included, `false` to filter it out.
pub type FilterFn = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// Type alias for a sort comparator.
pub type CompareFn = Arc<dyn Fn(&Row, &Row) -> Ordering + Send + Sync>;

fn position(rows: &[Row], row: &Row) -> Option<usize> {
    rows.iter().position(|r| r.ptr_eq(row))
}

/// Position of the `nth` copy of `row`, counting from zero.
fn nth_position(rows: &[Row], row: &Row, nth: usize) -> Option<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, r)| r.ptr_eq(row))
        .nth(nth)
        .map(|(at, _)| at)
}

/// Copies of `row` in front of `index`.
fn copies_before(rows: &[Row], row: &Row, index: usize) -> usize {
    rows.iter().take(index).filter(|r| r.ptr_eq(row)).count()
}

/// A filtered (and optionally sorted) view of another list source.
///
/// Construct with [`DerivedSource::new`] or [`DerivedSource::builder`]. The
/// derived source registers itself with the upstream as a listener; the
/// upstream holds it weakly, so dropping the last `Arc` stops it.
///
/// A row held more than once upstream appears once per place; its copies
/// keep their upstream order.
///
/// Field changes are forwarded as `change` while a row keeps its position.
/// When a change moves a row into, out of, or within the derived list, the
/// move is published as remove and insert pairs instead.
///
/// # Example
///
/// ```
/// use trellis::{DerivedSource, ListSource, SourceConfig, Value};
/// use std::sync::Arc;
///
/// let movies = Arc::new(ListSource::new(SourceConfig::new(["title", "rating"]).unwrap()));
/// movies.append(vec![Value::from("Heat"), Value::from(8.3)]).unwrap();
/// movies.append(vec![Value::from("Speed 2"), Value::from(3.9)]).unwrap();
///
/// let good = DerivedSource::builder(movies.clone())
///     .filter(|row| row.get("rating").and_then(|v| v.as_float()).unwrap_or(0.0) > 7.0)
///     .sort_by_field("rating", true)
///     .build();
///
/// assert_eq!(good.len(), 1);
/// movies.append(vec![Value::from("Alien"), Value::from(8.5)]).unwrap();
/// assert_eq!(good.get(0).unwrap().get("title"), Some(Value::from("Alien")));
/// ```
pub struct DerivedSource<S: ListData + ?Sized + 'static> {
    upstream: Arc<S>,
    filter: RwLock<Option<FilterFn>>,
    compare: RwLock<Option<CompareFn>>,
    /// The list as last published to listeners.
    view: RwLock<Vec<Row>>,
    hub: Arc<ListHub>,
}

impl<S: ListData + ?Sized + 'static> DerivedSource<S> {
    /// A derived source that passes every upstream row through unchanged.
    pub fn new(upstream: Arc<S>) -> Arc<Self> {
        DerivedSourceBuilder::new(upstream).build()
    }

    /// Start building a derived source over `upstream`.
    pub fn builder(upstream: Arc<S>) -> DerivedSourceBuilder<S> {
        DerivedSourceBuilder::new(upstream)
    }

    /// The upstream source.
    pub fn upstream(&self) -> &Arc<S> {
        &self.upstream
    }

    /// Number of rows passing the filter.
    pub fn len(&self) -> usize {
        self.view.read().len()
    }

    /// Returns `true` if no rows pass the filter.
    pub fn is_empty(&self) -> bool {
        self.view.read().is_empty()
    }

    /// The row at `index` in derived order.
    pub fn get(&self, index: usize) -> Result<Row> {
        let view = self.view.read();
        view.get(index).cloned().ok_or_else(|| SourceError::index(index, view.len()))
    }

    /// Position of `row` in derived order.
    pub fn index_of(&self, row: &Row) -> Result<usize> {
        position(&self.view.read(), row)
            .ok_or_else(|| SourceError::not_found(format!("row {} in derived source", row.id())))
    }

    /// Snapshot of the derived rows.
    pub fn rows(&self) -> Vec<Row> {
        self.view.read().clone()
    }

    /// Register a listener. Idempotent; held weakly.
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

    /// Replace the filter predicate and republish.
    pub fn set_filter<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        *self.filter.write() = Some(Arc::new(filter));
        self.refresh()
    }

    /// Remove the filter predicate and republish.
    pub fn clear_filter(&self) -> Result<()> {
        *self.filter.write() = None;
        self.refresh()
    }

    /// Replace the sort comparator and republish. The sort is stable:
    /// rows that compare equal keep their upstream order.
    pub fn set_sort<F>(&self, compare: F) -> Result<()>
    where
        F: Fn(&Row, &Row) -> Ordering + Send + Sync + 'static,
    {
        *self.compare.write() = Some(Arc::new(compare));
        self.refresh()
    }

    /// Sort by the value of field `name`, and republish.
    pub fn sort_by_field(&self, name: &str, descending: bool) -> Result<()> {
        *self.compare.write() = Some(field_comparator(name, descending));
        self.refresh()
    }

    /// Remove the sort comparator (restoring upstream order) and republish.
    pub fn clear_sort(&self) -> Result<()> {
        *self.compare.write() = None;
        self.refresh()
    }

    /// Recompute the derived list from the upstream and publish the
    /// difference as remove and insert pairs.
    ///
    /// Needed only when the filter depends on state the derived source is
    /// not notified about.
    pub fn refresh(&self) -> Result<()> {
        let target = self.derive(&self.upstream.rows());
        self.publish(target)
    }

    /// Stop listening to the upstream. The derived list is left as it was.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if already detached.
    pub fn detach(&self) -> Result<()> {
        tracing::debug!(target: targets::DERIVED, "detaching derived source");
        self.upstream.remove_listener(self)
    }

    fn accepts(&self, row: &Row) -> bool {
        match self.filter.read().as_ref() {
            Some(filter) => filter(row),
            None => true,
        }
    }

    /// Apply the filter and sort to `rows`.
    fn derive(&self, rows: &[Row]) -> Vec<Row> {
        let filter = self.filter.read().clone();
        let compare = self.compare.read().clone();

        let mut derived: Vec<Row> = match filter {
            Some(filter) => rows.iter().filter(|row| filter(row)).cloned().collect(),
            None => rows.to_vec(),
        };
        if let Some(compare) = compare {
            derived.sort_by(|a, b| compare(a, b));
        }
        derived
    }

    fn published_position(&self, row: &Row) -> Option<usize> {
        position(&self.view.read(), row)
    }

    /// Published position of the copy of `row` at upstream `index`. The
    /// rows in front of `index` are the same before and after the upstream
    /// removal.
    fn removed_position(&self, index: usize, row: &Row) -> Option<usize> {
        let nth = copies_before(&self.upstream.rows(), row, index);
        nth_position(&self.view.read(), row, nth)
    }

    fn insert_published(&self, index: usize, row: &Row) -> Result<()> {
        self.hub.pre_notify(
            |phase| ListNotification::insert(phase, index, row),
            || {
                let mut view = self.view.write();
                let at = index.min(view.len());
                view.insert(at, row.clone());
                Ok(())
            },
        )
    }

    fn remove_published(&self, index: usize, row: &Row) -> Result<()> {
        self.hub.pre_notify(
            |phase| ListNotification::remove(phase, index, row),
            || {
                let mut view = self.view.write();
                if index >= view.len() {
                    return Err(SourceError::index(index, view.len()));
                }
                view.remove(index);
                Ok(())
            },
        )
    }

    /// Bring the published list to `target` with remove and insert pairs.
    ///
    /// Rows leaving the list go first, back to front; then each position is
    /// fixed front to back, moving rows that are out of place. Copies beyond
    /// the target's end go last.
    fn publish(&self, target: Vec<Row>) -> Result<()> {
        let current = self.rows();
        let mut removed = 0;
        let mut inserted = 0;

        for (index, row) in current.iter().enumerate().rev() {
            if position(&target, row).is_none() {
                self.remove_published(index, row)?;
                removed += 1;
            }
        }

        for (index, row) in target.iter().enumerate() {
            // Everything in front of `index` already matches the target.
            let found = self
                .view
                .read()
                .iter()
                .enumerate()
                .skip(index)
                .find(|(_, r)| r.ptr_eq(row))
                .map(|(at, _)| at);
            match found {
                Some(at) if at == index => {}
                Some(at) => {
                    self.remove_published(at, row)?;
                    self.insert_published(index, row)?;
                    removed += 1;
                    inserted += 1;
                }
                None => {
                    self.insert_published(index, row)?;
                    inserted += 1;
                }
            }
        }

        let surplus = self.rows();
        for (index, row) in surplus.iter().enumerate().skip(target.len()).rev() {
            self.remove_published(index, row)?;
            removed += 1;
        }

        tracing::debug!(
            target: targets::DERIVED,
            removed,
            inserted,
            len = target.len(),
            "derived source republished"
        );
        Ok(())
    }
}

fn field_comparator(name: &str, descending: bool) -> CompareFn {
    let name = name.to_string();
    Arc::new(move |a: &Row, b: &Row| {
        let a = a.get(&name).unwrap_or_default();
        let b = b.get(&name).unwrap_or_default();
        let ordering = a.total_cmp(&b);
        if descending { ordering.reverse() } else { ordering }
    })
}

impl<S: ListData + ?Sized + 'static> ValueListener<Row> for DerivedSource<S> {
    fn change(&self, item: &Row) -> Result<()> {
        let before = self.published_position(item);
        let target = self.derive(&self.upstream.rows());
        let after = position(&target, item);

        match (before, after) {
            (Some(before), Some(after)) if before == after => {
                self.publish(target)?;
                tracing::trace!(target: targets::DERIVED, index = after, "forwarding change");
                return self.hub.notify(&ListNotification::Change { item });
            }
            (None, None) => {}
            (Some(before), Some(after)) => {
                self.remove_published(before, item)?;
                self.insert_published(after, item)?;
            }
            (Some(before), None) => self.remove_published(before, item)?,
            (None, Some(after)) => self.insert_published(after, item)?,
        }
        tracing::trace!(target: targets::DERIVED, ?before, ?after, "change moved row");

        // Filters over outside state may have moved other rows too.
        self.publish(target)
    }
}

impl<S: ListData + ?Sized + 'static> ListListener<Row> for DerivedSource<S> {
    fn pre_insert(&self, index: usize, item: &Row) -> Result<()> {
        if !self.accepts(item) {
            return Ok(());
        }
        // Where the row will land once the upstream insert completes.
        let mut upstream = self.upstream.rows();
        let at = index.min(upstream.len());
        upstream.insert(at, item.clone());
        let nth = copies_before(&upstream, item, at);
        let Some(position) = nth_position(&self.derive(&upstream), item, nth) else {
            return Ok(());
        };
        tracing::trace!(
            target: targets::DERIVED,
            upstream_index = index,
            index = position,
            "forwarding pre_insert"
        );
        self.hub.notify(&ListNotification::PreInsert { index: position, item })
    }

    fn post_insert(&self, index: usize, item: &Row) -> Result<()> {
        if !self.accepts(item) {
            return Ok(());
        }
        let upstream = self.upstream.rows();
        let nth = copies_before(&upstream, item, index);
        let Some(position) = nth_position(&self.derive(&upstream), item, nth) else {
            return Ok(());
        };
        {
            let mut view = self.view.write();
            let at = position.min(view.len());
            view.insert(at, item.clone());
        }
        self.hub.notify(&ListNotification::PostInsert { index: position, item })
    }

    fn pre_remove(&self, index: usize, item: &Row) -> Result<()> {
        match self.removed_position(index, item) {
            Some(position) => self.hub.notify(&ListNotification::PreRemove { index: position, item }),
            None => Ok(()),
        }
    }

    fn post_remove(&self, index: usize, item: &Row) -> Result<()> {
        let Some(position) = self.removed_position(index, item) else {
            return Ok(());
        };
        {
            let mut view = self.view.write();
            if position < view.len() {
                view.remove(position);
            }
        }
        self.hub.notify(&ListNotification::PostRemove { index: position, item })
    }

    fn clear(&self) -> Result<()> {
        *self.view.write() = self.derive(&self.upstream.rows());
        tracing::trace!(target: targets::DERIVED, "forwarding clear");
        self.hub.notify(&ListNotification::Clear)
    }
}

impl<S: ListData + ?Sized + 'static> ListData for DerivedSource<S> {
    fn len(&self) -> usize {
        DerivedSource::len(self)
    }

    fn get(&self, index: usize) -> Result<Row> {
        DerivedSource::get(self, index)
    }

    fn index_of(&self, row: &Row) -> Result<usize> {
        DerivedSource::index_of(self, row)
    }

    fn rows(&self) -> Vec<Row> {
        DerivedSource::rows(self)
    }

    fn hub(&self) -> &Arc<ListHub> {
        &self.hub
    }
}

impl<S: ListData + ?Sized + 'static> std::fmt::Debug for DerivedSource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedSource")
            .field("len", &self.len())
            .field("upstream_len", &self.upstream.len())
            .field("filtered", &self.filter.read().is_some())
            .field("sorted", &self.compare.read().is_some())
            .finish()
    }
}

/// Builder for creating derived sources with a fluent API.
pub struct DerivedSourceBuilder<S: ListData + ?Sized + 'static> {
    upstream: Arc<S>,
    filter: Option<FilterFn>,
    compare: Option<CompareFn>,
}

impl<S: ListData + ?Sized + 'static> DerivedSourceBuilder<S> {
    /// Creates a new builder over `upstream`.
    pub fn new(upstream: Arc<S>) -> Self {
        Self {
            upstream,
            filter: None,
            compare: None,
        }
    }

    /// Sets the filter predicate.
    pub fn filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(f));
        self
    }

    /// Sets the sort comparator.
    pub fn sort<F>(mut self, f: F) -> Self
    where
        F: Fn(&Row, &Row) -> Ordering + Send + Sync + 'static,
    {
        self.compare = Some(Arc::new(f));
        self
    }

    /// Sorts by the value of field `name`.
    pub fn sort_by_field(mut self, name: &str, descending: bool) -> Self {
        self.compare = Some(field_comparator(name, descending));
        self
    }

    /// Builds the derived source and registers it with the upstream.
    pub fn build(self) -> Arc<DerivedSource<S>> {
        let derived = Arc::new(DerivedSource {
            upstream: self.upstream,
            filter: RwLock::new(self.filter),
            compare: RwLock::new(self.compare),
            view: RwLock::new(Vec::new()),
            hub: Arc::new(ListHub::new()),
        });
        let initial = derived.derive(&derived.upstream.rows());
        tracing::debug!(target: targets::DERIVED, len = initial.len(), "derived source built");
        *derived.view.write() = initial;
        derived.upstream.add_listener(derived.clone());
        derived
    }
}
