//! Notification payloads and their delivery to listeners.
//!
//! A [`Notification`] knows which listener callback it maps to. The hub
//! stays ignorant of listener shapes; it only iterates listeners and hands
//! each one to [`Notification::deliver`].

use crate::Result;
use crate::listener::{ListListener, TreeListener, ValueListener};

/// Which half of a two-phase mutation is being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before the structure is mutated.
    Pre,
    /// After the structure is mutated.
    Post,
}

/// A message that can be delivered to listeners of type `L`.
pub trait Notification<L: ?Sized> {
    /// Event name, e.g. `"pre_insert"`. Used in traces.
    fn name(&self) -> &'static str;

    /// Invoke the matching callback on `listener`.
    fn deliver(&self, listener: &L) -> Result<()>;
}

/// Events emitted by list-shaped sources.
#[derive(Debug)]
pub enum ListNotification<'a, I> {
    Change { item: &'a I },
    PreInsert { index: usize, item: &'a I },
    PostInsert { index: usize, item: &'a I },
    PreRemove { index: usize, item: &'a I },
    PostRemove { index: usize, item: &'a I },
    Clear,
}

impl<'a, I> ListNotification<'a, I> {
    /// The insert event for `phase`.
    pub fn insert(phase: Phase, index: usize, item: &'a I) -> Self {
        match phase {
            Phase::Pre => Self::PreInsert { index, item },
            Phase::Post => Self::PostInsert { index, item },
        }
    }

    /// The remove event for `phase`.
    pub fn remove(phase: Phase, index: usize, item: &'a I) -> Self {
        match phase {
            Phase::Pre => Self::PreRemove { index, item },
            Phase::Post => Self::PostRemove { index, item },
        }
    }
}

impl<I, L> Notification<L> for ListNotification<'_, I>
where
    L: ListListener<I> + ?Sized,
{
    fn name(&self) -> &'static str {
        match self {
            Self::Change { .. } => "change",
            Self::PreInsert { .. } => "pre_insert",
            Self::PostInsert { .. } => "post_insert",
            Self::PreRemove { .. } => "pre_remove",
            Self::PostRemove { .. } => "post_remove",
            Self::Clear => "clear",
        }
    }

    fn deliver(&self, listener: &L) -> Result<()> {
        match *self {
            Self::Change { item } => listener.change(item),
            Self::PreInsert { index, item } => listener.pre_insert(index, item),
            Self::PostInsert { index, item } => listener.post_insert(index, item),
            Self::PreRemove { index, item } => listener.pre_remove(index, item),
            Self::PostRemove { index, item } => listener.post_remove(index, item),
            Self::Clear => listener.clear(),
        }
    }
}

/// Events emitted by tree-shaped sources.
#[derive(Debug)]
pub enum TreeNotification<'a, I> {
    Change {
        item: &'a I,
    },
    PreInsert {
        index: usize,
        item: &'a I,
        parent: Option<&'a I>,
    },
    PostInsert {
        index: usize,
        item: &'a I,
        parent: Option<&'a I>,
    },
    PreRemove {
        index: usize,
        item: &'a I,
        parent: Option<&'a I>,
    },
    PostRemove {
        index: usize,
        item: &'a I,
        parent: Option<&'a I>,
    },
    Clear,
}

impl<'a, I> TreeNotification<'a, I> {
    /// The insert event for `phase`.
    pub fn insert(phase: Phase, index: usize, item: &'a I, parent: Option<&'a I>) -> Self {
        match phase {
            Phase::Pre => Self::PreInsert { index, item, parent },
            Phase::Post => Self::PostInsert { index, item, parent },
        }
    }

    /// The remove event for `phase`.
    pub fn remove(phase: Phase, index: usize, item: &'a I, parent: Option<&'a I>) -> Self {
        match phase {
            Phase::Pre => Self::PreRemove { index, item, parent },
            Phase::Post => Self::PostRemove { index, item, parent },
        }
    }
}

impl<I, L> Notification<L> for TreeNotification<'_, I>
where
    L: TreeListener<I> + ?Sized,
{
    fn name(&self) -> &'static str {
        match self {
            Self::Change { .. } => "change",
            Self::PreInsert { .. } => "pre_insert",
            Self::PostInsert { .. } => "post_insert",
            Self::PreRemove { .. } => "pre_remove",
            Self::PostRemove { .. } => "post_remove",
            Self::Clear => "clear",
        }
    }

    fn deliver(&self, listener: &L) -> Result<()> {
        match *self {
            Self::Change { item } => listener.change(item),
            Self::PreInsert { index, item, parent } => listener.pre_insert(index, item, parent),
            Self::PostInsert { index, item, parent } => listener.post_insert(index, item, parent),
            Self::PreRemove { index, item, parent } => listener.pre_remove(index, item, parent),
            Self::PostRemove { index, item, parent } => listener.post_remove(index, item, parent),
            Self::Clear => listener.clear(),
        }
    }
}

/// Events for sources that only report value changes.
#[derive(Debug)]
pub struct ValueNotification<'a, I> {
    pub item: &'a I,
}

impl<I, L> Notification<L> for ValueNotification<'_, I>
where
    L: ValueListener<I> + ?Sized,
{
    fn name(&self) -> &'static str {
        "change"
    }

    fn deliver(&self, listener: &L) -> Result<()> {
        listener.change(self.item)
    }
}
