//! Observable data sources for list, table and tree widgets.
//!
//! Trellis separates the data a widget shows from the widget itself. A
//! source owns its items and tells registered listeners about every change:
//!
//! - [`ListSource`]: a flat, ordered list of [`Row`]s
//! - [`TreeSource`]: a forest of [`Node`]s
//! - [`DerivedSource`]: a filtered and sorted view over any [`ListData`]
//!
//! Structural mutations are announced as `pre_*`/`post_*` pairs, so a
//! listener can prepare before the change and read the settled source
//! afterwards. Field assignments on a row or node announce `change` to the
//! source that owns it.
//!
//! Listener registries hold listeners weakly: keep an `Arc` to your listener
//! for as long as it should be notified.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use trellis::{ListListener, ListSource, Row, SourceConfig, Value, ValueListener};
//!
//! #[derive(Default)]
//! struct Log(Mutex<Vec<String>>);
//!
//! impl ValueListener<Row> for Log {
//!     fn change(&self, row: &Row) -> trellis::Result<()> {
//!         self.0.lock().push(format!("changed {}", row.get("name").unwrap_or_default()));
//!         Ok(())
//!     }
//! }
//!
//! impl ListListener<Row> for Log {
//!     fn post_insert(&self, index: usize, _row: &Row) -> trellis::Result<()> {
//!         self.0.lock().push(format!("inserted at {index}"));
//!         Ok(())
//!     }
//! }
//!
//! let people = ListSource::new(SourceConfig::new(["name", "age"])?);
//! let log = Arc::new(Log::default());
//! people.add_listener(log.clone());
//!
//! let ada = people.append(vec![Value::from("Ada"), Value::from(36)])?;
//! ada.set("name", "Ada Lovelace")?;
//!
//! assert_eq!(*log.0.lock(), vec!["inserted at 0", "changed Ada Lovelace"]);
//! # Ok::<(), trellis::SourceError>(())
//! ```

mod accessors;
mod columns;
mod derived;
mod list_source;
mod node;
mod record;
mod row;
mod tree_source;
mod value;

pub use accessors::{AccessorOverrides, Accessors, SourceConfig, build_accessors, to_accessor};
pub use columns::{AccessorColumn, Attributes, Column};
pub use derived::{CompareFn, DerivedSource, DerivedSourceBuilder, FilterFn};
pub use list_source::{ListData, ListSource};
pub use node::{Node, TreeHub};
pub use record::{RawRecord, TreeRecord};
pub use row::{ListHub, Row};
pub use tree_source::TreeSource;
pub use value::Value;

pub use trellis_core::logging;
pub use trellis_core::{
    BoxedListenerError, Hub, ListListener, ListNotification, ListenerId, Notification, Phase, Result,
    SourceError, TreeListener, TreeNotification, ValueListener, ValueNotification,
};
