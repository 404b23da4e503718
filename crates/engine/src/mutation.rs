//! Instance mutations and control state changes requested by actions.
//!
//! Structural mutations keep repeat indexes and switch selections attached
//! to the items they belong to: selections are parked on instance nodes
//! before the tree changes and picked up again under the new effective ids.

use crate::action::InsertPlace;
use crate::document::ContainingDocument;
use log::{debug, trace};
use rustc_hash::FxHashSet;
use xforms_controls::{
    ControlKind, adjust_indexes_after_insert, adjust_indexes_for_delete, adjust_repeat_indexes, clamp_index,
};
use xforms_dom::{InsertPosition, Instance, NodeRef, XmlTree};
use xforms_model::{PendingEvent, Phase, XFormsError, XFormsEvent};

/// Where an insertion lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTarget {
    /// Beside a node of the bound node-set.
    Sibling(NodeRef, InsertPlace),
    /// As last child of the context node, for an empty node-set.
    Child(NodeRef),
}

impl InsertTarget {
    const fn node(self) -> NodeRef {
        match self {
            Self::Sibling(node, _) | Self::Child(node) => node,
        }
    }
}

impl ContainingDocument {
    fn tree_of(&self, node: NodeRef) -> anyhow::Result<&XmlTree> {
        self.models
            .get(node.instance.model as usize)
            .and_then(|model| model.instance(node.instance))
            .map(Instance::tree)
            .ok_or_else(|| XFormsError::IllegalState("node of an unknown instance".to_owned()).into())
    }

    /// Copy `origin` nodes to `target`. Returns the inserted nodes in
    /// document order.
    pub(crate) fn insert_nodes(&mut self, target: InsertTarget, origin: &[NodeRef]) -> anyhow::Result<Vec<NodeRef>> {
        self.rebuild_controls()?;
        self.externalize_switches();

        let mut fragments = Vec::with_capacity(origin.len());
        for source in origin {
            fragments.push((*source, self.tree_of(*source)?.fragment(source.node)?));
        }

        let destination = target.node();
        let model = self
            .models
            .get_mut(destination.instance.model as usize)
            .ok_or_else(|| XFormsError::IllegalState("insert into an unknown model".to_owned()))?;
        let instance = model
            .instance_mut(destination.instance)
            .ok_or_else(|| XFormsError::IllegalState("insert into an unknown instance".to_owned()))?;

        let mut position = match target {
            InsertTarget::Sibling(node, InsertPlace::Before) => InsertPosition::Before(node.node),
            InsertTarget::Sibling(node, InsertPlace::After) => InsertPosition::After(node.node),
            InsertTarget::Child(node) => InsertPosition::Into(node.node),
        };
        let mut inserted = Vec::with_capacity(fragments.len());
        for (source, fragment) in &fragments {
            let grafted = instance.tree_mut()?.graft(fragment, position)?;
            if source.instance == destination.instance {
                for (copied_from, copy) in &grafted.pairs {
                    instance.switch_cases_mut().copy(*copied_from, *copy);
                }
            }
            inserted.push(instance.node(grafted.root));
            position = InsertPosition::After(grafted.root);
        }
        let instance_id = instance.effective_id().to_owned();
        model.mark_structural_change();
        let model_id = model.id().to_owned();
        self.tracker.data_changed(&model_id);
        debug!("inserted {} node(s) into `{instance_id}`", inserted.len());

        self.rebuild_controls()?;
        self.internalize_switches();
        adjust_indexes_after_insert(&self.tree, &self.controls, &mut self.indexes, &inserted);
        self.dispatch(PendingEvent::new(XFormsEvent::Insert, &instance_id))?;
        Ok(inserted)
    }

    /// Delete nodes one by one, keeping repeat indexes on the items they
    /// pointed at. Returns how many nodes were removed.
    pub(crate) fn delete_nodes(&mut self, nodes: &[NodeRef]) -> anyhow::Result<usize> {
        let mut touched: Vec<String> = Vec::new();
        for node in nodes {
            self.rebuild_controls()?;
            self.externalize_switches();
            let updates = adjust_indexes_for_delete(&self.tree, &self.controls, &self.indexes, *node);

            let model = self
                .models
                .get_mut(node.instance.model as usize)
                .ok_or_else(|| XFormsError::IllegalState("delete in an unknown model".to_owned()))?;
            let instance = model
                .instance_mut(node.instance)
                .ok_or_else(|| XFormsError::IllegalState("delete in an unknown instance".to_owned()))?;
            instance.tree_mut()?.remove(node.node)?;
            let instance_id = instance.effective_id().to_owned();
            model.mark_structural_change();
            let model_id = model.id().to_owned();
            self.tracker.data_changed(&model_id);
            trace!("deleted node from `{instance_id}`");

            updates.apply(&mut self.indexes);
            self.rebuild_controls()?;
            self.internalize_switches();
            adjust_repeat_indexes(&self.tree, &self.controls, &mut self.indexes, &updates.reinitialized);
            if !touched.contains(&instance_id) {
                touched.push(instance_id);
            }
        }
        for instance_id in &touched {
            self.dispatch(PendingEvent::new(XFormsEvent::Delete, instance_id))?;
        }
        Ok(nodes.len())
    }

    /// Set the index of a repeat. Out-of-range values are clamped after
    /// `xforms-scroll-first` or `xforms-scroll-last`; nested repeats restart
    /// at their start index.
    pub(crate) fn set_repeat_index(&mut self, repeat_id: &str, index: f64) -> anyhow::Result<()> {
        if index.is_nan() {
            debug!("setindex: index of `{repeat_id}` is not a number, ignoring");
            return Ok(());
        }
        self.rebuild_controls()?;
        let Some(effective_id) = self.effective_id_for(repeat_id) else {
            debug!("setindex: repeat `{repeat_id}` not found, ignoring");
            return Ok(());
        };
        let Some(size) = self
            .tree
            .find(&effective_id)
            .filter(|control| control.kind == ControlKind::Repeat)
            .map(|control| control.nodeset.len())
        else {
            debug!("setindex: repeat `{effective_id}` not found, ignoring");
            return Ok(());
        };

        let requested = index.round();
        if requested < 1.0 {
            self.dispatch(PendingEvent::new(XFormsEvent::ScrollFirst, &effective_id))?;
            self.indexes.set(repeat_id, clamp_index(1, size));
        } else if requested > size as f64 {
            self.dispatch(PendingEvent::new(XFormsEvent::ScrollLast, &effective_id))?;
            self.indexes.set(repeat_id, size);
        } else {
            self.indexes.set(repeat_id, requested as usize);
        }

        let nested: FxHashSet<String> = self
            .controls
            .nested_repeat_ids(repeat_id)
            .into_iter()
            .map(str::to_owned)
            .collect();
        for nested_id in &nested {
            self.indexes.set(nested_id, 0);
        }
        self.rebuild_controls()?;
        adjust_repeat_indexes(&self.tree, &self.controls, &mut self.indexes, &nested);
        self.controls_stale = true;
        debug!("setindex: `{repeat_id}` is now {:?}", self.indexes.get(repeat_id));
        self.recalculate_all()
    }

    /// Recompute calculated values in every model, as index changes may
    /// affect `index()` in `calculate` binds.
    fn recalculate_all(&mut self) -> anyhow::Result<()> {
        let model_ids: Vec<String> = self.models.iter().map(|model| model.id().to_owned()).collect();
        for (position, model_id) in model_ids.iter().enumerate() {
            self.models[position].request_phase(Phase::Recalculate);
            self.run_phase(model_id, Phase::Recalculate)?;
        }
        Ok(())
    }

    /// Select a case. A no-op, returning false, when the case is unknown,
    /// already selected, or its switch is not relevant.
    pub(crate) fn toggle_case(&mut self, case_id: &str) -> anyhow::Result<bool> {
        self.rebuild_controls()?;
        let Some(switch_id) = self.controls.switch_of_case(case_id).map(str::to_owned) else {
            debug!("toggle: no case `{case_id}`, ignoring");
            return Ok(false);
        };
        let (Some(case_effective), Some(switch_effective)) =
            (self.effective_id_for(case_id), self.effective_id_for(&switch_id))
        else {
            debug!("toggle: case `{case_id}` is in an empty repeat, ignoring");
            return Ok(false);
        };
        if !self.tree.find(&switch_effective).is_some_and(|switch| switch.relevant) {
            debug!("toggle: switch `{switch_effective}` is not relevant, ignoring");
            return Ok(false);
        }
        let Some(previous) = self.switches.select(&switch_effective, &case_effective) else {
            return Ok(false);
        };
        if let Some(previous) = previous {
            self.dispatch(PendingEvent::new(XFormsEvent::Deselect, &previous))?;
        }
        self.controls_stale = true;
        self.dispatch(PendingEvent::new(XFormsEvent::Select, &case_effective))?;
        Ok(true)
    }

    pub(crate) fn show_dialog(&mut self, dialog_id: &str, neighbor: Option<&str>, constrain: bool) -> anyhow::Result<()> {
        let Some(effective_id) = self.effective_id_for(dialog_id) else {
            debug!("show: no dialog `{dialog_id}`, ignoring");
            return Ok(());
        };
        let mut event = PendingEvent::new(XFormsEvent::DialogOpen, &effective_id);
        if let Some(neighbor) = neighbor {
            let neighbor = self.effective_id_for(neighbor).unwrap_or_else(|| neighbor.to_owned());
            event = event.with_detail(neighbor);
        }
        self.dispatch(event)?;
        if let Some(dialog) = self.dialogs.get_mut(&effective_id) {
            dialog.constrain = constrain;
        }
        Ok(())
    }

    pub(crate) fn hide_dialog(&mut self, dialog_id: &str) -> anyhow::Result<()> {
        let Some(effective_id) = self.effective_id_for(dialog_id) else {
            debug!("hide: no dialog `{dialog_id}`, ignoring");
            return Ok(());
        };
        self.dispatch(PendingEvent::new(XFormsEvent::DialogClose, &effective_id))?;
        Ok(())
    }
}
