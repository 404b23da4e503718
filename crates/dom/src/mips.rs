//! Model item properties and other per-node side tables.
//!
//! Instance trees carry no annotations themselves. Everything the engine
//! computes about a node lives in tables keyed by the node's arena id, which
//! stay valid for as long as the node is live and survive copy-on-write of
//! the tree because cloning an arena preserves ids.

use crate::tree::{NodeKind, XmlTree};
use core::iter;
use indextree::NodeId;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Properties computed for a single node by binds and validation.
///
/// `relevant` and `readonly` hold the node's local value; inheritance from
/// ancestors is applied by [`MipTable::view`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools, reason = "One flag per boolean model item property")]
pub struct NodeMips {
    pub relevant: bool,
    pub readonly: bool,
    pub required: bool,
    /// Result of the bind `constraint` and of the required-but-empty check.
    pub constraint: bool,
    /// Result of the bind `type` check.
    pub type_valid: bool,
    /// Result of schema validation.
    pub schema_valid: bool,
    pub type_name: Option<String>,
    pub custom: BTreeMap<String, String>,
}

impl Default for NodeMips {
    fn default() -> Self {
        Self {
            relevant: true,
            readonly: false,
            required: false,
            constraint: true,
            type_valid: true,
            schema_valid: true,
            type_name: None,
            custom: BTreeMap::new(),
        }
    }
}

impl NodeMips {
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.constraint && self.type_valid && self.schema_valid
    }
}

/// Effective properties of a node, inheritance applied.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools, reason = "One flag per boolean model item property")]
pub struct MipView {
    pub relevant: bool,
    pub readonly: bool,
    pub required: bool,
    pub valid: bool,
    pub type_name: Option<String>,
    pub custom: BTreeMap<String, String>,
}

impl Default for MipView {
    fn default() -> Self {
        Self {
            relevant: true,
            readonly: false,
            required: false,
            valid: true,
            type_name: None,
            custom: BTreeMap::new(),
        }
    }
}

/// Side table of model item properties keyed by node.
#[derive(Debug, Clone, Default)]
pub struct MipTable {
    entries: FxHashMap<NodeId, NodeMips>,
}

impl MipTable {
    pub fn get(&self, node: NodeId) -> Option<&NodeMips> {
        self.entries.get(&node)
    }

    /// Entry for `node`, created with defaults when missing.
    pub fn entry(&mut self, node: NodeId) -> &mut NodeMips {
        self.entries.entry(node).or_default()
    }

    /// Reset everything recalculate recomputes.
    pub fn clear_computed(&mut self) {
        for mips in self.entries.values_mut() {
            mips.relevant = true;
            mips.readonly = false;
            mips.required = false;
            mips.type_name = None;
            mips.custom.clear();
        }
    }

    /// Reset bind-based validation results.
    pub fn clear_validation(&mut self) {
        for mips in self.entries.values_mut() {
            mips.constraint = true;
            mips.type_valid = true;
        }
    }

    /// Reset cached schema validation results.
    pub fn clear_schema_validation(&mut self) {
        for mips in self.entries.values_mut() {
            mips.schema_valid = true;
        }
    }

    /// Drop entries for nodes that are no longer part of `tree`.
    pub fn prune(&mut self, tree: &XmlTree) {
        self.entries.retain(|node, _| tree.is_live(*node));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Relevance with inheritance: a node is relevant only if it and all of
    /// its ancestors are.
    pub fn is_relevant(&self, tree: &XmlTree, node: NodeId) -> bool {
        ancestry(tree, node)
            .all(|current| self.entries.get(&current).is_none_or(|mips| mips.relevant))
    }

    /// Read-only with inheritance: a node is read-only if it or any ancestor is.
    pub fn is_readonly(&self, tree: &XmlTree, node: NodeId) -> bool {
        ancestry(tree, node)
            .any(|current| self.entries.get(&current).is_some_and(|mips| mips.readonly))
    }

    pub fn view(&self, tree: &XmlTree, node: NodeId) -> MipView {
        let local = self.entries.get(&node);
        MipView {
            relevant: self.is_relevant(tree, node),
            readonly: self.is_readonly(tree, node),
            required: local.is_some_and(|mips| mips.required),
            valid: local.is_none_or(NodeMips::is_valid),
            type_name: local.and_then(|mips| mips.type_name.clone()),
            custom: local.map(|mips| mips.custom.clone()).unwrap_or_default(),
        }
    }

    /// Whether any node with properties is currently invalid.
    pub fn has_invalid(&self, tree: &XmlTree) -> bool {
        self.entries
            .iter()
            .any(|(node, mips)| !mips.is_valid() && tree.is_live(*node))
    }
}

fn ancestry(tree: &XmlTree, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    let mut current = Some(node);
    iter::from_fn(move || {
        let here = current?;
        current = tree
            .parent(here)
            .filter(|parent| !matches!(tree.kind(*parent), Some(NodeKind::Document)));
        Some(here)
    })
}

/// Per-node record of which case each switch had selected.
///
/// Effective ids of switches inside repeats embed iteration numbers that a
/// structural mutation can shift. Before such a mutation the selections are
/// parked here against the data node of the enclosing iteration and read back
/// once the new iteration numbers are known.
#[derive(Debug, Clone, Default)]
pub struct SwitchCaseTable {
    entries: FxHashMap<NodeId, FxHashMap<String, String>>,
}

impl SwitchCaseTable {
    pub fn set(&mut self, node: NodeId, switch_id: &str, case_id: &str) {
        self.entries
            .entry(node)
            .or_default()
            .insert(switch_id.to_owned(), case_id.to_owned());
    }

    pub fn case_for(&self, node: NodeId, switch_id: &str) -> Option<&str> {
        self.entries
            .get(&node)
            .and_then(|cases| cases.get(switch_id))
            .map(String::as_str)
    }

    /// Copy the record of `source` onto `destination`; each node keeps its
    /// own map.
    pub fn copy(&mut self, source: NodeId, destination: NodeId) {
        if let Some(cases) = self.entries.get(&source).cloned() {
            self.entries.insert(destination, cases);
        } else {
            self.entries.remove(&destination);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if relevance or readonly fail to inherit.
    #[test]
    fn relevance_and_readonly_inherit_from_ancestors() {
        let tree = XmlTree::parse("<a><b><c/></b></a>").unwrap();
        let outer = tree.document_element().unwrap();
        let middle = tree.element_children(outer)[0];
        let inner = tree.element_children(middle)[0];
        let mut table = MipTable::default();
        table.entry(middle).relevant = false;
        table.entry(outer).readonly = true;
        assert!(!table.is_relevant(&tree, inner));
        assert!(table.is_relevant(&tree, outer));
        assert!(table.is_readonly(&tree, inner));

        table.clear_computed();
        assert!(table.is_relevant(&tree, inner));
        assert!(!table.is_readonly(&tree, inner));
    }

    /// # Panics
    /// Panics if validity does not combine all checks.
    #[test]
    fn view_combines_validity_flags() {
        let tree = XmlTree::parse("<a/>").unwrap();
        let node = tree.document_element().unwrap();
        let mut table = MipTable::default();
        assert!(table.view(&tree, node).valid);
        table.entry(node).schema_valid = false;
        assert!(!table.view(&tree, node).valid);
        assert!(table.has_invalid(&tree));
        table.clear_schema_validation();
        assert!(table.view(&tree, node).valid);
    }

    /// # Panics
    /// Panics if copies share state.
    #[test]
    fn switch_table_copies_are_independent() {
        let tree = XmlTree::parse("<a><b/><c/></a>").unwrap();
        let root = tree.document_element().unwrap();
        let children = tree.element_children(root);
        let mut table = SwitchCaseTable::default();
        table.set(children[0], "switch", "case-2");
        table.copy(children[0], children[1]);
        table.set(children[0], "switch", "case-1");
        assert_eq!(table.case_for(children[1], "switch"), Some("case-2"));
        assert_eq!(table.case_for(children[0], "switch"), Some("case-1"));
    }
}
