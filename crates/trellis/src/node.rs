//! Nodes: the items of tree sources.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use trellis_core::logging::targets;
use trellis_core::{Hub, Result, SourceError, TreeListener, TreeNotification};

use crate::accessors::{Accessors, SourceConfig};
use crate::record::{Fields, TreeRecord};
use crate::value::Value;

/// The listener registry type owned by tree sources.
pub type TreeHub = Hub<dyn TreeListener<Node>>;

/// Counter for generating unique node IDs.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_node_id() -> u64 {
    NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Where a node hangs. All references are non-owning; the parent owns its
/// children and the source owns its roots.
struct Link {
    parent: Weak<NodeInner>,
    owner: Weak<TreeHub>,
    /// Top-level node of the owning source.
    root: bool,
}

struct NodeInner {
    id: u64,
    fields: RwLock<Fields>,
    /// `None` for a leaf that cannot hold children.
    children: RwLock<Option<Vec<Node>>>,
    link: RwLock<Link>,
}

/// One item of a tree source: a row that may also hold child nodes.
///
/// Like [`Row`](crate::Row), `Node` is a shared handle with identity
/// equality. A node built from a record with `children: None` is a leaf;
/// inserting under it turns it into a branch.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Build a detached node (and its subtree) from a tree record.
    ///
    /// The node can later be attached with
    /// [`TreeSource::insert_node`](crate::TreeSource::insert_node).
    pub fn new(config: &SourceConfig, record: TreeRecord) -> Result<Node> {
        let TreeRecord { record, children } = record;
        let fields = Fields::from_raw(record, config.accessors(), config.missing_value())?;
        let node = Node {
            inner: Arc::new(NodeInner {
                id: next_node_id(),
                fields: RwLock::new(fields),
                children: RwLock::new(None),
                link: RwLock::new(Link {
                    parent: Weak::new(),
                    owner: Weak::new(),
                    root: false,
                }),
            }),
        };

        if let Some(children) = children {
            let mut built = Vec::with_capacity(children.len());
            for child in children {
                let child = Node::new(config, child)?;
                child.inner.link.write().parent = Arc::downgrade(&node.inner);
                built.push(child);
            }
            *node.inner.children.write() = Some(built);
        }
        Ok(node)
    }

    /// Unique identifier of this node.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Value of the field or extra attribute `name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.fields.read().get(name).cloned()
    }

    /// Assign the field or extra attribute `name` and notify the owning
    /// source's listeners with `change`.
    ///
    /// # Errors
    ///
    /// [`SourceError::UnknownField`] if the node has no such attribute; a
    /// listener error from the `change` dispatch.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.inner.fields.write().set(name, value.into())?;
        tracing::trace!(target: targets::ROW, node = self.id(), field = name, "node field assigned");

        let owner = self.inner.link.read().owner.upgrade();
        match owner {
            Some(hub) => hub.notify(&TreeNotification::Change { item: self }),
            None => Ok(()),
        }
    }

    /// The accessors this node was built against.
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

    /// Number of children. Leaves have none.
    pub fn len(&self) -> usize {
        self.inner.children.read().as_ref().map_or(0, Vec::len)
    }

    /// Returns `true` if the node has no children.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The child at `index`.
    ///
    /// # Errors
    ///
    /// [`SourceError::Index`] if `index` is out of range.
    pub fn child(&self, index: usize) -> Result<Node> {
        let children = self.inner.children.read();
        let children = children.as_deref().unwrap_or_default();
        children
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::index(index, children.len()))
    }

    /// Snapshot of the children, in order.
    pub fn children(&self) -> Vec<Node> {
        self.inner.children.read().clone().unwrap_or_default()
    }

    /// Position of `child` among this node's children.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if `child` is not a child of this node.
    pub fn index_of(&self, child: &Node) -> Result<usize> {
        self.inner
            .children
            .read()
            .as_deref()
            .and_then(|children| children.iter().position(|c| c.ptr_eq(child)))
            .ok_or_else(|| SourceError::not_found(format!("node {} under node {}", child.id(), self.id())))
    }

    /// Returns `true` if the node has a child collection (even an empty one).
    pub fn can_have_children(&self) -> bool {
        self.inner.children.read().is_some()
    }

    /// The parent node, or `None` for roots and detached nodes.
    pub fn parent(&self) -> Option<Node> {
        self.inner.link.read().parent.upgrade().map(|inner| Node { inner })
    }

    /// Returns `true` if this node is a top-level node of a live source.
    pub fn is_root(&self) -> bool {
        let link = self.inner.link.read();
        link.root && link.owner.strong_count() > 0
    }

    /// Returns `true` if the node hangs under a parent or is a root of a
    /// live source.
    pub fn is_attached(&self) -> bool {
        let link = self.inner.link.read();
        link.parent.strong_count() > 0 || (link.root && link.owner.strong_count() > 0)
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(node) = current {
            depth += 1;
            current = node.parent();
        }
        depth
    }

    /// Returns `true` if both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` if `self` is `other` or one of its ancestors.
    pub(crate) fn is_ancestor_or_self(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.ptr_eq(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    pub(crate) fn is_owned_by(&self, hub: &Arc<TreeHub>) -> bool {
        std::ptr::eq(self.inner.link.read().owner.as_ptr(), Arc::as_ptr(hub))
    }

    /// Hang this node under `parent` (or at the top level) and hand its
    /// subtree to `hub`.
    pub(crate) fn attach(&self, parent: Option<&Node>, hub: &Arc<TreeHub>) {
        {
            let mut link = self.inner.link.write();
            link.parent = parent.map_or_else(Weak::new, |p| Arc::downgrade(&p.inner));
            link.root = parent.is_none();
        }
        self.set_owner(Arc::downgrade(hub));
    }

    /// Cut this node loose. Its own subtree stays intact.
    pub(crate) fn detach(&self) {
        {
            let mut link = self.inner.link.write();
            link.parent = Weak::new();
            link.root = false;
        }
        self.set_owner(Weak::new());
    }

    fn set_owner(&self, owner: Weak<TreeHub>) {
        self.inner.link.write().owner = owner.clone();
        for child in self.children() {
            child.set_owner(owner.clone());
        }
    }

    /// Insert `child` at `index` (clamped), converting a leaf into a branch.
    /// Returns the index used.
    pub(crate) fn insert_child(&self, index: usize, child: Node) -> usize {
        let mut children = self.inner.children.write();
        let children = children.get_or_insert_with(Vec::new);
        let index = index.min(children.len());
        children.insert(index, child);
        index
    }

    /// Remove `child` by identity.
    pub(crate) fn remove_child(&self, child: &Node) -> Option<usize> {
        let mut children = self.inner.children.write();
        let children = children.as_mut()?;
        let index = children.iter().position(|c| c.ptr_eq(child))?;
        children.remove(index);
        Some(index)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Node");
        debug.field("id", &self.id());
        for (name, value) in self.fields() {
            debug.field(&name, &value);
        }
        debug.field("children", &self.len());
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawRecord;

    fn config() -> SourceConfig {
        SourceConfig::new(["name"]).unwrap()
    }

    fn sample() -> Node {
        Node::new(
            &config(),
            TreeRecord::branch(
                "root",
                vec![
                    TreeRecord::leaf("a"),
                    TreeRecord::branch("b", vec![TreeRecord::leaf("b1")]),
                    TreeRecord::branch("c", vec![]),
                ],
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_build_subtree() {
        let root = sample();
        assert_eq!(root.len(), 3);
        assert_eq!(root.child(1).unwrap().get("name"), Some(Value::from("b")));
        assert_eq!(root.child(1).unwrap().child(0).unwrap().depth(), 2);
        assert!(root.child(1).unwrap().parent().unwrap().ptr_eq(&root));
    }

    #[test]
    fn test_leaf_and_empty_branch() {
        let root = sample();
        let leaf = root.child(0).unwrap();
        let empty = root.child(2).unwrap();

        assert!(!leaf.can_have_children());
        assert!(empty.can_have_children());
        assert_eq!(leaf.len(), 0);
        assert_eq!(empty.len(), 0);
        assert!(leaf.children().is_empty());
    }

    #[test]
    fn test_child_out_of_range() {
        let root = sample();
        let err = root.child(3).unwrap_err();
        assert!(matches!(err, SourceError::Index { index: 3, len: 3 }));
        assert!(root.child(0).unwrap().child(0).is_err());
    }

    #[test]
    fn test_index_of() {
        let root = sample();
        let b = root.child(1).unwrap();
        assert_eq!(root.index_of(&b).unwrap(), 1);
        assert!(root.index_of(&root).unwrap_err().is_not_found());
    }

    #[test]
    fn test_detached_node_is_not_attached() {
        let root = sample();
        assert!(!root.is_attached());
        assert!(!root.is_root());
        assert!(root.child(0).unwrap().is_attached());
    }

    #[test]
    fn test_insert_child_converts_leaf() {
        let root = sample();
        let leaf = root.child(0).unwrap();
        let extra = Node::new(&config(), TreeRecord::leaf(RawRecord::scalar("a1"))).unwrap();

        assert_eq!(leaf.insert_child(10, extra.clone()), 0);
        assert!(leaf.can_have_children());
        assert_eq!(leaf.index_of(&extra).unwrap(), 0);
        assert_eq!(leaf.remove_child(&extra), Some(0));
        assert_eq!(leaf.remove_child(&extra), None);
    }

    #[test]
    fn test_ancestry() {
        let root = sample();
        let b = root.child(1).unwrap();
        let b1 = b.child(0).unwrap();
        assert!(root.is_ancestor_or_self(&b1));
        assert!(b.is_ancestor_or_self(&b));
        assert!(!b1.is_ancestor_or_self(&root));
    }

    #[test]
    fn test_set_without_owner() {
        let root = sample();
        root.set("name", "renamed").unwrap();
        assert_eq!(root.get("name"), Some(Value::from("renamed")));
        assert!(root.set("missing", 1).is_err());
    }
}
