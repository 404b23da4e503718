//! Instances: one XML tree plus the metadata and side tables a model keeps
//! for it.

use crate::error::DomError;
use crate::mips::{MipTable, MipView, SwitchCaseTable};
use crate::tree::XmlTree;
use core::time::Duration;
use indextree::NodeId;
use log::debug;
use std::sync::Arc;

/// Stable address of an instance inside a containing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    /// Position of the owning model in document order.
    pub model: u32,
    /// Position of the instance inside its model.
    pub slot: u32,
}

impl InstanceKey {
    #[inline]
    pub const fn new(model: u32, slot: u32) -> Self {
        Self { model, slot }
    }
}

/// A node of some instance.
///
/// Nodes never point back at their instance; the key travels with the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub instance: InstanceKey,
    pub node: NodeId,
}

impl NodeRef {
    #[inline]
    pub const fn new(instance: InstanceKey, node: NodeId) -> Self {
        Self { instance, node }
    }
}

/// How strictly schema validation applies to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    Strict,
    Lax,
    Skip,
}

impl ValidationMode {
    /// Parse the `validation` attribute; unknown values fall back to strict.
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("lax") => Self::Lax,
            Some("none" | "skip") => Self::Skip,
            _ => Self::Strict,
        }
    }
}

/// Caching settings of an externally loaded instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CachePolicy {
    pub shared: bool,
    pub ttl: Option<Duration>,
}

/// Instance document owned by a model.
#[derive(Debug, Clone)]
pub struct Instance {
    key: InstanceKey,
    static_id: String,
    effective_id: String,
    model_id: String,
    source_uri: Option<String>,
    cache: CachePolicy,
    validation: ValidationMode,
    readonly: bool,
    replaced: bool,
    tree: Arc<XmlTree>,
    mips: MipTable,
    switch_cases: SwitchCaseTable,
}

impl Instance {
    pub fn new(key: InstanceKey, static_id: &str, model_id: &str, tree: Arc<XmlTree>) -> Self {
        Self {
            key,
            static_id: static_id.to_owned(),
            effective_id: static_id.to_owned(),
            model_id: model_id.to_owned(),
            source_uri: None,
            cache: CachePolicy::default(),
            validation: ValidationMode::default(),
            readonly: false,
            replaced: false,
            tree,
            mips: MipTable::default(),
            switch_cases: SwitchCaseTable::default(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, uri: &str) -> Self {
        self.source_uri = Some(uri.to_owned());
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Effective id for an instance instantiated inside a repeat iteration.
    #[must_use]
    pub fn with_effective_id(mut self, effective_id: &str) -> Self {
        self.effective_id = effective_id.to_owned();
        self
    }

    #[inline]
    pub const fn key(&self) -> InstanceKey {
        self.key
    }

    pub fn static_id(&self) -> &str {
        &self.static_id
    }

    pub fn effective_id(&self) -> &str {
        &self.effective_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn source_uri(&self) -> Option<&str> {
        self.source_uri.as_deref()
    }

    #[inline]
    pub const fn cache(&self) -> CachePolicy {
        self.cache
    }

    #[inline]
    pub const fn validation(&self) -> ValidationMode {
        self.validation
    }

    #[inline]
    pub const fn is_readonly(&self) -> bool {
        self.readonly
    }

    #[inline]
    pub const fn is_replaced(&self) -> bool {
        self.replaced
    }

    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    /// Shared handle on the current tree.
    pub fn shared_tree(&self) -> Arc<XmlTree> {
        Arc::clone(&self.tree)
    }

    /// Whether the tree is currently shared with another holder, typically
    /// the instance cache.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.tree) > 1
    }

    /// Mutable access to the tree, copying it first if it is shared.
    ///
    /// # Errors
    /// Returns [`DomError::ReadOnly`] for read-only instances.
    pub fn tree_mut(&mut self) -> Result<&mut XmlTree, DomError> {
        if self.readonly {
            return Err(DomError::ReadOnly(self.effective_id.clone()));
        }
        if self.is_shared() {
            debug!("instance `{}`: copy-on-write of shared tree", self.effective_id);
        }
        Ok(Arc::make_mut(&mut self.tree))
    }

    /// Node reference for an arena id of this instance.
    #[inline]
    pub const fn node(&self, node: NodeId) -> NodeRef {
        NodeRef::new(self.key, node)
    }

    /// The document node.
    pub fn root(&self) -> NodeRef {
        self.node(self.tree.root())
    }

    pub fn document_element(&self) -> Option<NodeRef> {
        self.tree.document_element().map(|node| self.node(node))
    }

    pub fn value(&self, node: NodeId) -> String {
        self.tree.string_value(node)
    }

    /// Set a node value, returning whether it changed.
    ///
    /// # Errors
    /// Fails for read-only instances, stale nodes and document nodes.
    pub fn set_value(&mut self, node: NodeId, value: &str) -> Result<bool, DomError> {
        if self.tree.string_value(node) == value {
            return Ok(false);
        }
        self.tree_mut()?.set_value(node, value)?;
        Ok(true)
    }

    pub fn mips(&self) -> &MipTable {
        &self.mips
    }

    pub fn mips_mut(&mut self) -> &mut MipTable {
        &mut self.mips
    }

    pub fn mip_view(&self, node: NodeId) -> MipView {
        self.mips.view(&self.tree, node)
    }

    pub fn switch_cases(&self) -> &SwitchCaseTable {
        &self.switch_cases
    }

    pub fn switch_cases_mut(&mut self) -> &mut SwitchCaseTable {
        &mut self.switch_cases
    }

    /// Install a tree received in response to a submission.
    ///
    /// Side tables refer to nodes of the previous tree and are dropped.
    pub fn replace_tree(&mut self, tree: Arc<XmlTree>) {
        self.tree = tree;
        self.replaced = true;
        self.mips.clear();
        self.switch_cases.clear();
    }

    /// Put back a tree captured earlier, as done by `xforms-reset`.
    pub fn restore_tree(&mut self, tree: Arc<XmlTree>) {
        self.tree = tree;
        self.mips.clear();
        self.switch_cases.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Instance {
        let tree = XmlTree::parse("<data><value>5</value></data>").unwrap();
        Instance::new(InstanceKey::new(0, 0), "main", "model", Arc::new(tree))
    }

    /// # Panics
    /// Panics if equal values are reported as changes.
    #[test]
    fn set_value_reports_changes_only() {
        let mut instance = instance();
        let data = instance.tree().document_element().unwrap();
        let value = instance.tree().element_children(data)[0];
        assert!(!instance.set_value(value, "5").unwrap());
        assert!(instance.set_value(value, "6").unwrap());
        assert_eq!(instance.value(value), "6");
    }

    /// # Panics
    /// Panics if a shared tree is mutated in place.
    #[test]
    fn mutation_copies_shared_tree() {
        let mut instance = instance();
        let published = instance.shared_tree();
        assert!(instance.is_shared());
        let data = published.document_element().unwrap();
        let value = published.element_children(data)[0];
        instance.set_value(value, "7").unwrap();
        assert_eq!(published.string_value(value), "5");
        assert_eq!(instance.value(value), "7");
        assert!(!instance.is_shared());
    }

    /// # Panics
    /// Panics if read-only instances accept writes.
    #[test]
    fn readonly_instances_reject_writes() {
        let mut instance = instance().with_readonly(true);
        let data = instance.tree().document_element().unwrap();
        assert!(matches!(instance.set_value(data, "x"), Err(DomError::ReadOnly(_))));
    }
}
