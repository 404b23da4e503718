//! Arena-backed XML trees holding instance data.
//!
//! Nodes live in an `indextree` arena owned by the tree. Attributes are stored
//! as arena nodes under their owner element so that they can be bound,
//! annotated and mutated like any other node; [`XmlTree::children`] hides them.

use crate::error::DomError;
use core::cmp::Ordering;
use indextree::{Arena, Node, NodeId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Kind and payload of an instance node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element { name: String },
    Attribute { name: String, value: String },
    Text { text: String },
}

impl NodeKind {
    #[inline]
    pub const fn is_attribute(&self) -> bool {
        matches!(self, Self::Attribute { .. })
    }

    #[inline]
    pub const fn is_element(&self) -> bool {
        matches!(self, Self::Element { .. })
    }

    #[inline]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// Local name for elements and attributes.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Element { name } | Self::Attribute { name, .. } => Some(name),
            Self::Document | Self::Text { .. } => None,
        }
    }
}

/// Where a grafted fragment lands relative to an existing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before(NodeId),
    After(NodeId),
    /// Appended as the last child.
    Into(NodeId),
    /// Prepended as the first child.
    IntoFirst(NodeId),
}

#[derive(Debug, Clone)]
struct FragmentNode {
    parent: Option<usize>,
    kind: NodeKind,
    source: Option<NodeId>,
}

/// Detached copy of a subtree, in document order.
///
/// Fragments decouple reading from writing: a subtree can be copied out of a
/// tree and grafted back into the same tree or a different one.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    nodes: Vec<FragmentNode>,
}

impl Fragment {
    /// A fragment holding a single element with text content.
    pub fn element(name: &str, text: &str) -> Self {
        let mut nodes = vec![FragmentNode {
            parent: None,
            kind: NodeKind::Element {
                name: name.to_owned(),
            },
            source: None,
        }];
        if !text.is_empty() {
            nodes.push(FragmentNode {
                parent: Some(0),
                kind: NodeKind::Text {
                    text: text.to_owned(),
                },
                source: None,
            });
        }
        Self { nodes }
    }

    /// Kind of the fragment's top node.
    pub fn root_kind(&self) -> Option<&NodeKind> {
        self.nodes.first().map(|node| &node.kind)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Nodes created by [`XmlTree::graft`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grafted {
    /// Top node of the grafted subtree.
    pub root: NodeId,
    /// `(source, copy)` pairs for every node copied from an existing tree.
    pub pairs: Vec<(NodeId, NodeId)>,
}

/// XML document stored in an arena.
#[derive(Debug, Clone)]
pub struct XmlTree {
    arena: Arena<NodeKind>,
    root: NodeId,
}

impl Default for XmlTree {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlTree {
    /// Create an empty tree holding only the document node.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeKind::Document);
        Self { arena, root }
    }

    /// Parse XML text into a tree.
    ///
    /// Whitespace-only text, comments and processing instructions are
    /// dropped; element and attribute names keep their local part.
    ///
    /// # Errors
    /// Returns [`DomError::Parse`] when the text is not well-formed.
    pub fn parse(text: &str) -> Result<Self, DomError> {
        let document = roxmltree::Document::parse(text)?;
        let mut tree = Self::new();
        let root = tree.root;
        tree.import(document.root_element(), root)?;
        Ok(tree)
    }

    fn import(&mut self, source: roxmltree::Node<'_, '_>, parent: NodeId) -> Result<(), DomError> {
        let element = self.arena.new_node(NodeKind::Element {
            name: source.tag_name().name().to_owned(),
        });
        parent.checked_append(element, &mut self.arena)?;
        for attribute in source.attributes() {
            let node = self.arena.new_node(NodeKind::Attribute {
                name: attribute.name().to_owned(),
                value: attribute.value().to_owned(),
            });
            element.checked_append(node, &mut self.arena)?;
        }
        for child in source.children() {
            if child.is_element() {
                self.import(child, element)?;
            } else if child.is_text() {
                let text = child.text().unwrap_or_default();
                if !text.trim().is_empty() {
                    let node = self.arena.new_node(NodeKind::Text {
                        text: text.to_owned(),
                    });
                    element.checked_append(node, &mut self.arena)?;
                }
            }
        }
        Ok(())
    }

    /// The document node.
    #[inline]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// The single element child of the document node, if any.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .into_iter()
            .find(|child| self.kind(*child).is_some_and(NodeKind::is_element))
    }

    /// Kind of a live node; `None` once the node has been removed, even if
    /// the arena slot was reused since.
    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.arena
            .get(node)
            .filter(|entry| !entry.is_removed() && !node.is_removed(&self.arena))
            .map(|entry| entry.get())
    }

    #[inline]
    pub fn is_live(&self, node: NodeId) -> bool {
        self.kind(node).is_some()
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.kind(node).and_then(NodeKind::name)
    }

    /// Parent of a node. The parent of an attribute is its owner element.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena
            .get(node)
            .filter(|entry| !entry.is_removed() && !node.is_removed(&self.arena))
            .and_then(Node::parent)
    }

    /// Element and text children, attributes excluded.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        if !self.is_live(node) {
            return Vec::new();
        }
        node.children(&self.arena)
            .filter(|child| !self.arena[*child].get().is_attribute())
            .collect()
    }

    /// Element children only.
    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|child| self.arena[*child].get().is_element())
            .collect()
    }

    pub fn attributes(&self, node: NodeId) -> Vec<NodeId> {
        if !self.is_live(node) {
            return Vec::new();
        }
        node.children(&self.arena)
            .filter(|child| self.arena[*child].get().is_attribute())
            .collect()
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.attributes(node)
            .into_iter()
            .find(|attribute| self.name(*attribute) == Some(name))
    }

    /// Every node below `node` in document order, attributes included,
    /// `node` itself excluded.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        if !self.is_live(node) {
            return Vec::new();
        }
        node.descendants(&self.arena).skip(1).collect()
    }

    /// XPath string value of a node.
    pub fn string_value(&self, node: NodeId) -> String {
        match self.kind(node) {
            Some(NodeKind::Attribute { value, .. }) => value.clone(),
            Some(NodeKind::Text { text }) => text.clone(),
            Some(NodeKind::Element { .. } | NodeKind::Document) => {
                let mut value = String::new();
                for descendant in node.descendants(&self.arena) {
                    if let NodeKind::Text { text } = self.arena[descendant].get() {
                        value.push_str(text);
                    }
                }
                value
            }
            None => String::new(),
        }
    }

    /// Replace the value of a node.
    ///
    /// For elements, text children are replaced by a single text node while
    /// element children are kept.
    ///
    /// # Errors
    /// Fails for stale nodes and for the document node.
    pub fn set_value(&mut self, node: NodeId, new_value: &str) -> Result<(), DomError> {
        let kind = self.kind(node).cloned().ok_or(DomError::StaleNode)?;
        match kind {
            NodeKind::Document => Err(DomError::InvalidTarget("set the value of a document node")),
            NodeKind::Attribute { name, .. } => {
                *self.arena[node].get_mut() = NodeKind::Attribute {
                    name,
                    value: new_value.to_owned(),
                };
                Ok(())
            }
            NodeKind::Text { .. } => {
                *self.arena[node].get_mut() = NodeKind::Text {
                    text: new_value.to_owned(),
                };
                Ok(())
            }
            NodeKind::Element { .. } => {
                let texts: Vec<NodeId> = node
                    .children(&self.arena)
                    .filter(|child| self.arena[*child].get().is_text())
                    .collect();
                for text in texts {
                    text.remove(&mut self.arena);
                }
                if !new_value.is_empty() {
                    let text = self.arena.new_node(NodeKind::Text {
                        text: new_value.to_owned(),
                    });
                    node.checked_append(text, &mut self.arena)?;
                }
                Ok(())
            }
        }
    }

    /// Copy a subtree out of the tree.
    ///
    /// # Errors
    /// Returns [`DomError::StaleNode`] when `node` was removed.
    pub fn fragment(&self, node: NodeId) -> Result<Fragment, DomError> {
        if !self.is_live(node) {
            return Err(DomError::StaleNode);
        }
        let mut positions: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut nodes = Vec::new();
        for current in node.descendants(&self.arena) {
            let parent = if current == node {
                None
            } else {
                self.arena[current]
                    .parent()
                    .and_then(|parent| positions.get(&parent).copied())
            };
            positions.insert(current, nodes.len());
            nodes.push(FragmentNode {
                parent,
                kind: self.arena[current].get().clone(),
                source: Some(current),
            });
        }
        Ok(Fragment { nodes })
    }

    /// Insert a copy of `fragment` at `position`.
    ///
    /// # Errors
    /// Fails when the anchor is stale, when a document node would be grafted,
    /// or when an attribute would be placed outside an element.
    pub fn graft(&mut self, fragment: &Fragment, position: InsertPosition) -> Result<Grafted, DomError> {
        let Some(first) = fragment.nodes.first() else {
            return Err(DomError::InvalidTarget("insert an empty fragment"));
        };
        if matches!(first.kind, NodeKind::Document) {
            return Err(DomError::InvalidTarget("insert a document node"));
        }
        let anchor = match position {
            InsertPosition::Before(anchor)
            | InsertPosition::After(anchor)
            | InsertPosition::Into(anchor)
            | InsertPosition::IntoFirst(anchor) => anchor,
        };
        if !self.is_live(anchor) {
            return Err(DomError::StaleNode);
        }
        if first.kind.is_attribute() && !matches!(position, InsertPosition::Into(_) | InsertPosition::IntoFirst(_)) {
            return Err(DomError::InvalidTarget("insert an attribute next to a node"));
        }

        let mut created: Vec<NodeId> = Vec::with_capacity(fragment.nodes.len());
        let mut pairs = Vec::new();
        for entry in &fragment.nodes {
            let node = self.arena.new_node(entry.kind.clone());
            if let Some(parent) = entry.parent.and_then(|index| created.get(index).copied()) {
                parent.checked_append(node, &mut self.arena)?;
            }
            if let Some(source) = entry.source {
                pairs.push((source, node));
            }
            created.push(node);
        }
        let root = created[0];
        match position {
            InsertPosition::Before(anchor) => anchor.checked_insert_before(root, &mut self.arena)?,
            InsertPosition::After(anchor) => anchor.checked_insert_after(root, &mut self.arena)?,
            InsertPosition::Into(anchor) => anchor.checked_append(root, &mut self.arena)?,
            InsertPosition::IntoFirst(anchor) => anchor.checked_prepend(root, &mut self.arena)?,
        }
        Ok(Grafted { root, pairs })
    }

    /// Remove a node and its subtree.
    ///
    /// # Errors
    /// The document node and the document element cannot be removed.
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        if !self.is_live(node) {
            return Err(DomError::StaleNode);
        }
        if node == self.root || self.parent(node) == Some(self.root) {
            return Err(DomError::RootRemoval);
        }
        node.remove_subtree(&mut self.arena);
        Ok(())
    }

    /// Compare two live nodes by document order.
    pub fn compare_order(&self, first: NodeId, second: NodeId) -> Ordering {
        if first == second {
            return Ordering::Equal;
        }
        self.order_path(first).cmp(&self.order_path(second))
    }

    fn order_path(&self, node: NodeId) -> SmallVec<usize, 16> {
        let mut path: SmallVec<usize, 16> = SmallVec::new();
        for ancestor in node.ancestors(&self.arena) {
            path.push(ancestor.preceding_siblings(&self.arena).count());
        }
        path.reverse();
        path
    }

    /// Serialize a subtree to XML text.
    pub fn to_xml(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Document) => {
                for child in self.children(node) {
                    self.write_node(child, out);
                }
            }
            Some(NodeKind::Element { name }) => {
                out.push('<');
                out.push_str(name);
                for attribute in self.attributes(node) {
                    if let Some(NodeKind::Attribute { name: attr_name, value }) = self.kind(attribute) {
                        out.push(' ');
                        out.push_str(attr_name);
                        out.push_str("=\"");
                        out.push_str(&escape(value));
                        out.push('"');
                    }
                }
                let children = self.children(node);
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for child in children {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
            Some(NodeKind::Attribute { value, .. }) => out.push_str(&escape(value)),
            Some(NodeKind::Text { text }) => out.push_str(&escape(text)),
            None => {}
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XmlTree {
        XmlTree::parse(r#"<order id="7"><item>a</item><item>b</item><total/></order>"#).unwrap()
    }

    /// # Panics
    /// Panics if parsing drops attributes or whitespace handling regresses.
    #[test]
    fn parse_keeps_attributes_out_of_children() {
        let tree = sample();
        let order = tree.document_element().unwrap();
        assert_eq!(tree.name(order), Some("order"));
        assert_eq!(tree.element_children(order).len(), 3);
        let id = tree.attribute(order, "id").unwrap();
        assert_eq!(tree.string_value(id), "7");
        assert_eq!(tree.parent(id), Some(order));
        assert_eq!(tree.string_value(order), "ab");
    }

    /// # Panics
    /// Panics if setting an element value disturbs element children.
    #[test]
    fn set_value_replaces_only_text() {
        let mut tree = XmlTree::parse("<a>x<b>y</b>z</a>").unwrap();
        let root = tree.document_element().unwrap();
        tree.set_value(root, "new").unwrap();
        assert_eq!(tree.to_xml(root), "<a><b>y</b>new</a>");
        tree.set_value(root, "").unwrap();
        assert_eq!(tree.to_xml(root), "<a><b>y</b></a>");
    }

    /// # Panics
    /// Panics if grafting does not preserve order or source pairs.
    #[test]
    fn fragment_graft_round_trip_within_tree() {
        let mut tree = sample();
        let order = tree.document_element().unwrap();
        let items = tree.element_children(order);
        let fragment = tree.fragment(items[1]).unwrap();
        let grafted = tree.graft(&fragment, InsertPosition::After(items[1])).unwrap();
        assert_eq!(grafted.pairs.len(), 2);
        assert_eq!(grafted.pairs[0].0, items[1]);
        assert_eq!(
            tree.to_xml(order),
            r#"<order id="7"><item>a</item><item>b</item><item>b</item><total/></order>"#
        );
        assert_eq!(tree.compare_order(items[1], grafted.root), Ordering::Less);
        assert_eq!(tree.compare_order(order, items[0]), Ordering::Less);
    }

    /// # Panics
    /// Panics if the document element can be removed.
    #[test]
    fn remove_protects_document_element() {
        let mut tree = sample();
        let order = tree.document_element().unwrap();
        assert!(matches!(tree.remove(order), Err(DomError::RootRemoval)));
        let first = tree.element_children(order)[0];
        tree.remove(first).unwrap();
        assert!(!tree.is_live(first));
        assert_eq!(tree.element_children(order).len(), 2);
    }
}
