//! Hierarchical observable collections of nodes.

use std::sync::Arc;

use parking_lot::RwLock;
use trellis_core::logging::targets;
use trellis_core::{ListenerId, Result, SourceError, TreeListener, TreeNotification};

use crate::accessors::{Accessors, SourceConfig};
use crate::node::{Node, TreeHub};
use crate::record::{RawRecord, TreeRecord};
use crate::value::Value;

/// An observable tree of [`Node`]s.
///
/// Structural mutations anywhere in the tree are announced to the source's
/// listeners as pre/post pairs that carry the affected node, its index among
/// its siblings, and its parent (`None` at the top level). Field assignments
/// on any attached node are announced as `change`.
///
/// # Example
///
/// ```
/// use trellis::{SourceConfig, TreeRecord, TreeSource};
///
/// let tree = TreeSource::with_data(
///     SourceConfig::new(["name"]).unwrap(),
///     vec![TreeRecord::branch("src", vec![TreeRecord::leaf("lib.rs")])],
/// )
/// .unwrap();
///
/// let src = tree.get(0).unwrap();
/// let main = tree.append(Some(&src), "main.rs", None).unwrap();
/// assert_eq!(tree.path_of(&main).unwrap(), vec![0, 1]);
/// ```
pub struct TreeSource {
    config: SourceConfig,
    roots: RwLock<Vec<Node>>,
    hub: Arc<TreeHub>,
}

impl TreeSource {
    /// Creates an empty tree source.
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            roots: RwLock::new(Vec::new()),
            hub: Arc::new(TreeHub::new()),
        }
    }

    /// Creates a tree source populated from `records`. No notifications are
    /// emitted.
    pub fn with_data(config: SourceConfig, records: Vec<TreeRecord>) -> Result<Self> {
        let source = Self::new(config);
        let roots = records
            .into_iter()
            .map(|record| Node::new(&source.config, record))
            .collect::<Result<Vec<_>>>()?;
        for root in &roots {
            root.attach(None, &source.hub);
        }
        tracing::debug!(target: targets::TREE, roots = roots.len(), "tree source populated");
        *source.roots.write() = roots;
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

    /// Number of top-level nodes.
    pub fn len(&self) -> usize {
        self.roots.read().len()
    }

    /// Returns `true` if the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.roots.read().is_empty()
    }

    /// The top-level node at `index`.
    ///
    /// # Errors
    ///
    /// [`SourceError::Index`] if `index` is out of range.
    pub fn get(&self, index: usize) -> Result<Node> {
        let roots = self.roots.read();
        roots.get(index).cloned().ok_or_else(|| SourceError::index(index, roots.len()))
    }

    /// Snapshot of the top-level nodes.
    pub fn roots(&self) -> Vec<Node> {
        self.roots.read().clone()
    }

    /// Children of `parent`, or the top-level nodes for `None`.
    pub fn children_of(&self, parent: Option<&Node>) -> Vec<Node> {
        match parent {
            Some(parent) => parent.children(),
            None => self.roots(),
        }
    }

    /// Position of `node` among its siblings.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the node is not part of this tree.
    pub fn index_of(&self, node: &Node) -> Result<usize> {
        self.ensure_member(node)?;
        match node.parent() {
            Some(parent) => parent.index_of(node),
            None => self.root_index(node),
        }
    }

    fn root_index(&self, node: &Node) -> Result<usize> {
        self.roots
            .read()
            .iter()
            .position(|root| root.ptr_eq(node))
            .ok_or_else(|| SourceError::not_found(format!("node {}", node.id())))
    }

    fn ensure_member(&self, node: &Node) -> Result<()> {
        if node.is_owned_by(&self.hub) && node.is_attached() {
            Ok(())
        } else {
            Err(SourceError::not_found(format!("node {} in this tree", node.id())))
        }
    }

    /// Path of child indices from the top level down to `node`.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the node is not part of this tree.
    pub fn path_of(&self, node: &Node) -> Result<Vec<usize>> {
        self.ensure_member(node)?;
        let mut path = Vec::with_capacity(node.depth() + 1);
        let mut current = node.clone();
        loop {
            match current.parent() {
                Some(parent) => {
                    path.push(parent.index_of(&current)?);
                    current = parent;
                }
                None => {
                    path.push(self.root_index(&current)?);
                    break;
                }
            }
        }
        path.reverse();
        Ok(path)
    }

    /// The node at `path` (see [`path_of`](Self::path_of)).
    ///
    /// # Errors
    ///
    /// [`SourceError::Index`] if the path is empty or a step is out of range.
    pub fn node_at(&self, path: &[usize]) -> Result<Node> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| SourceError::index(0, 0))?;
        let mut node = self.get(*first)?;
        for &index in rest {
            node = node.child(index)?;
        }
        Ok(node)
    }

    /// Build a node (and its subtree) and insert it at `index` under
    /// `parent`, or at the top level for `None`.
    ///
    /// An `index` past the end appends. Inserting under a leaf turns it into
    /// a branch.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if `parent` is not part of this tree; any
    /// error from building the node or from a listener.
    pub fn insert(
        &self,
        parent: Option<&Node>,
        index: usize,
        raw: impl Into<RawRecord>,
        children: Option<Vec<TreeRecord>>,
    ) -> Result<Node> {
        if let Some(parent) = parent {
            self.ensure_member(parent)?;
        }
        let node = Node::new(
            &self.config,
            TreeRecord {
                record: raw.into(),
                children,
            },
        )?;
        self.attach_at(parent, index, &node)?;
        Ok(node)
    }

    /// Insert a new node at the end of `parent`'s children.
    pub fn append(
        &self,
        parent: Option<&Node>,
        raw: impl Into<RawRecord>,
        children: Option<Vec<TreeRecord>>,
    ) -> Result<Node> {
        self.insert(parent, usize::MAX, raw, children)
    }

    /// Attach an existing, detached node (with its subtree) at `index`
    /// under `parent`.
    ///
    /// # Errors
    ///
    /// - [`SourceError::Structure`] if `node` is already attached somewhere,
    ///   or if `parent` is `node` itself or one of its descendants
    /// - [`SourceError::NotFound`] if `parent` is not part of this tree
    pub fn insert_node(&self, parent: Option<&Node>, index: usize, node: &Node) -> Result<()> {
        if node.is_attached() {
            tracing::warn!(target: targets::TREE, node = node.id(), "rejected insert of attached node");
            return Err(SourceError::structure(format!(
                "node {} is already attached; remove it first",
                node.id()
            )));
        }
        if let Some(parent) = parent {
            if node.is_ancestor_or_self(parent) {
                tracing::warn!(target: targets::TREE, node = node.id(), "rejected cyclic insert");
                return Err(SourceError::structure(format!(
                    "node {} cannot be inserted under itself or its descendants",
                    node.id()
                )));
            }
            self.ensure_member(parent)?;
        }
        self.attach_at(parent, index, node)
    }

    fn attach_at(&self, parent: Option<&Node>, index: usize, node: &Node) -> Result<()> {
        let index = index.min(match parent {
            Some(parent) => parent.len(),
            None => self.len(),
        });
        tracing::debug!(
            target: targets::TREE,
            index,
            node = node.id(),
            parent = ?parent.map(Node::id),
            "inserting node"
        );

        self.hub.pre_notify(
            |phase| TreeNotification::insert(phase, index, node, parent),
            || {
                match parent {
                    Some(parent) => {
                        parent.insert_child(index, node.clone());
                    }
                    None => {
                        let mut roots = self.roots.write();
                        let at = index.min(roots.len());
                        roots.insert(at, node.clone());
                    }
                }
                node.attach(parent, &self.hub);
                Ok(())
            },
        )
    }

    /// Remove `node` (with its subtree) from wherever it hangs.
    ///
    /// The removed node is detached and may be re-attached with
    /// [`insert_node`](Self::insert_node).
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the node is not part of this tree; any
    /// listener error. If only `post_remove` fails, the node has already
    /// been removed and detached.
    pub fn remove(&self, node: &Node) -> Result<Node> {
        let index = self.index_of(node)?;
        let parent = node.parent();
        tracing::debug!(target: targets::TREE, index, node = node.id(), "removing node");

        self.hub.pre_notify(
            |phase| TreeNotification::remove(phase, index, node, parent.as_ref()),
            || {
                let removed = match &parent {
                    Some(parent) => parent.remove_child(node),
                    None => {
                        let mut roots = self.roots.write();
                        let at = roots.iter().position(|root| root.ptr_eq(node));
                        at.map(|at| {
                            roots.remove(at);
                            at
                        })
                    }
                };
                if removed.is_none() {
                    return Err(SourceError::not_found(format!("node {}", node.id())));
                }
                node.detach();
                Ok(())
            },
        )?;
        Ok(node.clone())
    }

    /// Replace the node at `index` under `parent` with a new one.
    ///
    /// Announced as a remove pair followed by an insert pair at the same
    /// index.
    pub fn replace(
        &self,
        parent: Option<&Node>,
        index: usize,
        raw: impl Into<RawRecord>,
        children: Option<Vec<TreeRecord>>,
    ) -> Result<Node> {
        let existing = match parent {
            Some(parent) => {
                self.ensure_member(parent)?;
                parent.child(index)?
            }
            None => self.get(index)?,
        };
        let replacement = Node::new(
            &self.config,
            TreeRecord {
                record: raw.into(),
                children,
            },
        )?;
        self.remove(&existing)?;
        self.attach_at(parent, index, &replacement)?;
        Ok(replacement)
    }

    /// Remove every node, emitting a single `clear`.
    pub fn clear(&self) -> Result<()> {
        let removed = std::mem::take(&mut *self.roots.write());
        tracing::debug!(target: targets::TREE, roots = removed.len(), "clearing tree source");
        for root in &removed {
            root.detach();
        }
        self.hub.notify(&TreeNotification::Clear)
    }

    /// First child of `parent` (or top-level node) after `start` matching
    /// `query`. Matching follows [`ListSource::find`](crate::ListSource::find).
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if `start` is not among the searched nodes
    /// or nothing matches.
    pub fn find(
        &self,
        parent: Option<&Node>,
        query: impl Into<RawRecord>,
        start: Option<&Node>,
    ) -> Result<Node> {
        let query = query.into();
        let candidates = self.children_of(parent);
        let from = match start {
            Some(start) => {
                candidates
                    .iter()
                    .position(|node| node.ptr_eq(start))
                    .ok_or_else(|| SourceError::not_found(format!("node {}", start.id())))?
                    + 1
            }
            None => 0,
        };
        candidates
            .into_iter()
            .skip(from)
            .find(|node| query.matches(self.accessors(), |name| node.get(name)))
            .ok_or_else(|| SourceError::not_found(format!("node matching {query:?}")))
    }

    /// Register a listener. Idempotent; the source keeps only a weak
    /// reference.
    pub fn add_listener(&self, listener: Arc<dyn TreeListener<Node>>) -> ListenerId {
        self.hub.add_listener(listener)
    }

    /// Unregister a listener.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the listener is not registered.
    pub fn remove_listener(&self, listener: &dyn TreeListener<Node>) -> Result<()> {
        self.hub.remove_listener(listener)
    }

    /// Snapshot of the registered listeners.
    pub fn listeners(&self) -> Vec<Arc<dyn TreeListener<Node>>> {
        self.hub.listeners()
    }

    /// The listener registry.
    pub fn hub(&self) -> &Arc<TreeHub> {
        &self.hub
    }
}

impl std::fmt::Debug for TreeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeSource")
            .field("accessors", self.accessors())
            .field("roots", &self.len())
            .field("listeners", &self.hub.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use trellis_core::ValueListener;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    fn label(node: Option<&Node>) -> String {
        node.and_then(|n| n.get("name"))
            .map_or_else(|| "-".to_string(), |v| v.to_string())
    }

    impl ValueListener<Node> for Recorder {
        fn change(&self, item: &Node) -> Result<()> {
            self.events.lock().push(format!("change {}", label(Some(item))));
            Ok(())
        }
    }

    impl TreeListener<Node> for Recorder {
        fn pre_insert(&self, index: usize, item: &Node, parent: Option<&Node>) -> Result<()> {
            self.events
                .lock()
                .push(format!("pre_insert {index} {} under {}", label(Some(item)), label(parent)));
            Ok(())
        }

        fn post_insert(&self, index: usize, _item: &Node, parent: Option<&Node>) -> Result<()> {
            self.events.lock().push(format!("post_insert {index} under {}", label(parent)));
            Ok(())
        }

        fn pre_remove(&self, index: usize, item: &Node, parent: Option<&Node>) -> Result<()> {
            self.events
                .lock()
                .push(format!("pre_remove {index} {} under {}", label(Some(item)), label(parent)));
            Ok(())
        }

        fn post_remove(&self, index: usize, _item: &Node, parent: Option<&Node>) -> Result<()> {
            self.events.lock().push(format!("post_remove {index} under {}", label(parent)));
            Ok(())
        }

        fn clear(&self) -> Result<()> {
            self.events.lock().push("clear".into());
            Ok(())
        }
    }

    fn tree() -> TreeSource {
        TreeSource::with_data(
            SourceConfig::new(["name"]).unwrap(),
            vec![
                TreeRecord::branch("a", vec![TreeRecord::leaf("a0"), TreeRecord::leaf("a1")]),
                TreeRecord::leaf("b"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_populated_tree() {
        let tree = tree();
        assert_eq!(tree.len(), 2);
        let a = tree.get(0).unwrap();
        assert!(a.is_root());
        assert_eq!(a.len(), 2);
        assert!(!a.child(0).unwrap().is_root());
        assert!(tree.get(1).unwrap().parent().is_none());
    }

    #[test]
    fn test_insert_under_parent() {
        let tree = tree();
        let recorder = Arc::new(Recorder::default());
        tree.add_listener(recorder.clone());
        let a = tree.get(0).unwrap();

        let node = tree.insert(Some(&a), 1, "new", None).unwrap();
        assert_eq!(a.index_of(&node).unwrap(), 1);
        assert!(node.parent().unwrap().ptr_eq(&a));
        assert_eq!(
            recorder.take(),
            vec!["pre_insert 1 new under a", "post_insert 1 under a"]
        );
    }

    #[test]
    fn test_insert_under_leaf_makes_branch() {
        let tree = tree();
        let b = tree.get(1).unwrap();
        assert!(!b.can_have_children());

        tree.append(Some(&b), "b0", None).unwrap();
        assert!(b.can_have_children());
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_top_level_insert_has_no_parent() {
        let tree = tree();
        let recorder = Arc::new(Recorder::default());
        tree.add_listener(recorder.clone());

        tree.insert(None, 0, "top", Some(vec![])).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(recorder.take(), vec!["pre_insert 0 top under -", "post_insert 0 under -"]);
    }

    #[test]
    fn test_remove_subtree() {
        let tree = tree();
        let recorder = Arc::new(Recorder::default());
        tree.add_listener(recorder.clone());
        let a = tree.get(0).unwrap();
        let a1 = a.child(1).unwrap();

        tree.remove(&a1).unwrap();
        assert_eq!(a.len(), 1);
        assert!(a1.parent().is_none());
        assert!(tree.path_of(&a1).is_err());
        assert_eq!(
            recorder.take(),
            vec!["pre_remove 1 a1 under a", "post_remove 1 under a"]
        );

        tree.remove(&a).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(!a.is_attached());
        assert_eq!(recorder.take(), vec!["pre_remove 0 a under -", "post_remove 0 under -"]);
    }

    #[test]
    fn test_removed_subtree_is_silent() {
        let tree = tree();
        let recorder = Arc::new(Recorder::default());
        tree.add_listener(recorder.clone());
        let a = tree.get(0).unwrap();
        let a0 = a.child(0).unwrap();

        tree.remove(&a).unwrap();
        recorder.take();
        a0.set("name", "renamed").unwrap();
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_nested_change_notifies() {
        let tree = tree();
        let recorder = Arc::new(Recorder::default());
        tree.add_listener(recorder.clone());

        tree.node_at(&[0, 1]).unwrap().set("name", "A1").unwrap();
        assert_eq!(recorder.take(), vec!["change A1"]);
    }

    #[test]
    fn test_paths() {
        let tree = tree();
        let a1 = tree.node_at(&[0, 1]).unwrap();
        assert_eq!(a1.get("name"), Some(Value::from("a1")));
        assert_eq!(tree.path_of(&a1).unwrap(), vec![0, 1]);
        assert_eq!(tree.path_of(&tree.get(1).unwrap()).unwrap(), vec![1]);
        assert!(tree.node_at(&[]).is_err());
        assert!(tree.node_at(&[0, 5]).unwrap_err().is_index());
    }

    #[test]
    fn test_insert_node_rejects_cycles_and_double_attach() {
        let tree = tree();
        let a = tree.get(0).unwrap();
        let a0 = a.child(0).unwrap();

        let err = tree.insert_node(None, 0, &a0).unwrap_err();
        assert!(matches!(err, SourceError::Structure(_)));

        tree.remove(&a).unwrap();
        let err = tree.insert_node(Some(&a0), 0, &a).unwrap_err();
        assert!(matches!(err, SourceError::Structure(_)));
        let err = tree.insert_node(Some(&a), 0, &a).unwrap_err();
        assert!(matches!(err, SourceError::Structure(_)));

        tree.insert_node(None, 5, &a).unwrap();
        assert_eq!(tree.path_of(&a0).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_foreign_parent_rejected() {
        let tree = tree();
        let other = tree_with_name("z");
        let foreign = other.get(0).unwrap();

        let err = tree.insert(Some(&foreign), 0, "x", None).unwrap_err();
        assert!(err.is_not_found());
    }

    fn tree_with_name(name: &str) -> TreeSource {
        TreeSource::with_data(SourceConfig::new(["name"]).unwrap(), vec![TreeRecord::leaf(name)]).unwrap()
    }

    #[test]
    fn test_replace() {
        let tree = tree();
        let recorder = Arc::new(Recorder::default());
        tree.add_listener(recorder.clone());
        let a = tree.get(0).unwrap();

        let replacement = tree.replace(Some(&a), 0, "fresh", None).unwrap();
        assert_eq!(a.index_of(&replacement).unwrap(), 0);
        assert_eq!(
            recorder.take(),
            vec![
                "pre_remove 0 a0 under a",
                "post_remove 0 under a",
                "pre_insert 0 fresh under a",
                "post_insert 0 under a",
            ]
        );
    }

    #[test]
    fn test_clear() {
        let tree = tree();
        let recorder = Arc::new(Recorder::default());
        tree.add_listener(recorder.clone());
        let a = tree.get(0).unwrap();

        tree.clear().unwrap();
        assert!(tree.is_empty());
        assert!(!a.is_root());
        assert_eq!(recorder.take(), vec!["clear"]);
    }

    #[test]
    fn test_find() {
        let tree = tree();
        let a = tree.get(0).unwrap();
        assert!(tree.find(None, "b", None).unwrap().ptr_eq(&tree.get(1).unwrap()));
        assert_eq!(tree.find(Some(&a), "a1", None).unwrap().get("name"), Some(Value::from("a1")));
        assert!(tree.find(None, "a1", None).is_err());
    }
}
