//! Listener capability traits.
//!
//! A listener implements the callbacks it cares about; every method has a
//! no-op default, so a listener that only tracks value changes implements
//! just [`ValueListener::change`]. Callbacks return [`Result`] so a failing
//! listener aborts the dispatch it is part of.
//!
//! The item type is generic: list sources notify with rows, tree sources
//! with nodes.

use crate::Result;

/// Receives notifications that an item's fields changed.
pub trait ValueListener<I>: Send + Sync {
    /// A field of `item` was assigned.
    fn change(&self, item: &I) -> Result<()> {
        let _ = item;
        Ok(())
    }
}

/// Receives notifications about a flat, ordered collection.
///
/// Insertions and removals arrive in pairs: `pre_*` before the collection is
/// mutated and `post_*` after, with the same index and item.
pub trait ListListener<I>: ValueListener<I> {
    /// `item` is about to be inserted at `index`.
    fn pre_insert(&self, index: usize, item: &I) -> Result<()> {
        let _ = (index, item);
        Ok(())
    }

    /// `item` has been inserted at `index`.
    fn post_insert(&self, index: usize, item: &I) -> Result<()> {
        let _ = (index, item);
        Ok(())
    }

    /// `item` at `index` is about to be removed.
    fn pre_remove(&self, index: usize, item: &I) -> Result<()> {
        let _ = (index, item);
        Ok(())
    }

    /// `item` formerly at `index` has been removed.
    fn post_remove(&self, index: usize, item: &I) -> Result<()> {
        let _ = (index, item);
        Ok(())
    }

    /// Every item was removed.
    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Receives notifications about a hierarchical collection.
///
/// Same shape as [`ListListener`], with the parent of the affected item
/// (`None` for a root). Indices are relative to the parent's children.
pub trait TreeListener<I>: ValueListener<I> {
    /// `item` is about to be inserted at `index` under `parent`.
    fn pre_insert(&self, index: usize, item: &I, parent: Option<&I>) -> Result<()> {
        let _ = (index, item, parent);
        Ok(())
    }

    /// `item` has been inserted at `index` under `parent`.
    fn post_insert(&self, index: usize, item: &I, parent: Option<&I>) -> Result<()> {
        let _ = (index, item, parent);
        Ok(())
    }

    /// `item` at `index` under `parent` is about to be removed.
    fn pre_remove(&self, index: usize, item: &I, parent: Option<&I>) -> Result<()> {
        let _ = (index, item, parent);
        Ok(())
    }

    /// `item` formerly at `index` under `parent` has been removed.
    fn post_remove(&self, index: usize, item: &I, parent: Option<&I>) -> Result<()> {
        let _ = (index, item, parent);
        Ok(())
    }

    /// Every node was removed.
    fn clear(&self) -> Result<()> {
        Ok(())
    }
}
