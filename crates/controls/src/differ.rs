//! Turns two control snapshots into the updates the client needs.
//!
//! Controls are paired in order. A missing "before" side means the subtree
//! just became visible: properties are then only sent where they differ
//! from what the client assumes for fresh markup.

use crate::control::{Control, ControlTree, DialogState};
use crate::descriptor::ControlKind;
use crate::id;
use crate::index::RepeatIndexes;
use log::trace;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Relevance the client assumes for controls it has never seen.
pub const DEFAULT_RELEVANCE_FOR_NEW_ITERATION: bool = true;

/// One instruction of the client update protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientUpdate {
    /// Changed properties of a control, in protocol order, and its value.
    Control {
        id: String,
        attributes: Vec<(String, String)>,
        value: Option<String>,
    },
    /// Relevance of one repeat iteration.
    RepeatIteration { id: String, iteration: usize, relevant: bool },
    /// Clone the repeat template for iterations `start..=end`.
    CopyRepeatTemplate {
        id: String,
        parent_indexes: String,
        start: usize,
        end: usize,
    },
    /// Remove the last `count` iterations.
    DeleteRepeatElements { id: String, parent_indexes: String, count: usize },
    Dialog {
        id: String,
        visible: bool,
        neighbor: Option<String>,
    },
    RepeatIndex { id: String, index: usize },
}

/// Receives client updates as they are produced.
pub trait UpdateSink {
    /// Record one update, in the order the differ emits them.
    fn apply_update(&mut self, update: ClientUpdate) -> anyhow::Result<()>;
}

impl UpdateSink for Vec<ClientUpdate> {
    fn apply_update(&mut self, update: ClientUpdate) -> anyhow::Result<()> {
        self.push(update);
        Ok(())
    }
}

/// Compares control snapshots.
pub struct ControlsDiffer<'diff, K: UpdateSink + ?Sized> {
    sink: &'diff mut K,
    /// Controls whose value the client changed in this request. They are
    /// always reported so the client sees the value the server kept.
    value_changed: &'diff FxHashSet<String>,
}

impl<'diff, K: UpdateSink + ?Sized> ControlsDiffer<'diff, K> {
    pub fn new(sink: &'diff mut K, value_changed: &'diff FxHashSet<String>) -> Self {
        Self { sink, value_changed }
    }

    /// Diff two full snapshots. Without a previous snapshot everything is
    /// treated as newly visible.
    pub fn diff_trees(&mut self, before: Option<&ControlTree>, after: &ControlTree) -> anyhow::Result<()> {
        self.diff(before.map(|tree| tree.roots.as_slice()), &after.roots)
    }

    /// Diff two lists of sibling controls. `before`, when present, must
    /// pair up with `after`.
    pub fn diff(&mut self, before: Option<&[Control]>, after: &[Control]) -> anyhow::Result<()> {
        let before = before.filter(|controls| !controls.is_empty());
        if after.is_empty() {
            anyhow::ensure!(before.is_none(), "illegal state when comparing controls: controls disappeared");
            return Ok(());
        }
        if let Some(before) = before {
            anyhow::ensure!(
                before.len() == after.len(),
                "illegal state when comparing controls: {} controls before, {} after",
                before.len(),
                after.len()
            );
        }
        for (index, new) in after.iter().enumerate() {
            let old = before.and_then(|controls| controls.get(index));
            self.diff_control(old, new)?;
            self.diff_children(old, new)?;
        }
        Ok(())
    }

    fn diff_control(&mut self, old: Option<&Control>, new: &Control) -> anyhow::Result<()> {
        if new.kind == ControlKind::Dialog {
            return self.diff_dialog(old, new);
        }
        if !new.kind.is_single_node() || new.internal {
            return Ok(());
        }
        let forced = self.value_changed.contains(&new.effective_id);
        if new.equals_external(old) && !forced {
            return Ok(());
        }
        if new.kind == ControlKind::RepeatIteration {
            return self.diff_iteration(old, new);
        }

        let newly_visible = old.is_none();
        let mut attributes = Vec::new();
        let mut output = false;

        let mut flag = |name: &str, changed: bool, value: bool| {
            if changed {
                attributes.push((name.to_owned(), value.to_string()));
                output = true;
            }
        };
        flag(
            "readonly",
            old.map_or(new.readonly, |old| old.readonly != new.readonly),
            new.readonly,
        );
        flag(
            "required",
            old.map_or(new.required, |old| old.required != new.required),
            new.required,
        );
        flag(
            "relevant",
            old.map_or(new.relevant != DEFAULT_RELEVANCE_FOR_NEW_ITERATION, |old| {
                old.relevant != new.relevant
            }),
            new.relevant,
        );
        flag("valid", old.map_or(!new.valid, |old| old.valid != new.valid), new.valid);

        for (name, value) in &new.custom {
            let previous = old.and_then(|old| old.custom.get(name));
            if previous != Some(value) {
                attributes.push((name.clone(), value.clone()));
                output = true;
            }
        }
        if let Some(old) = old {
            for name in old.custom.keys().filter(|name| !new.custom.contains_key(*name)) {
                attributes.push((name.clone(), String::new()));
                output = true;
            }
        }

        let type_name = new.type_name.as_deref().unwrap_or_default();
        if old.is_none_or(|old| old.type_name != new.type_name) {
            let is_default = type_name.is_empty() || matches!(type_name, "xs:string" | "xforms:string");
            output |= add_attribute(&mut attributes, "type", type_name, newly_visible, is_default);
        }
        let texts = [
            ("label", old.map(|old| &old.label), &new.label),
            ("help", old.map(|old| &old.help), &new.help),
            ("hint", old.map(|old| &old.hint), &new.hint),
            ("alert", old.map(|old| &old.alert), &new.alert),
        ];
        for (name, previous, current) in texts {
            if previous != Some(current) {
                let text = current.as_deref().unwrap_or_default();
                output |= add_attribute(&mut attributes, name, text, newly_visible, text.is_empty());
            }
        }
        if new.kind == ControlKind::Switch
            && old.is_none_or(|old| old.selected_case != new.selected_case)
        {
            let case = new.selected_case.as_deref().unwrap_or_default();
            output |= add_attribute(&mut attributes, "case", case, newly_visible, case.is_empty());
        }

        let value = new
            .kind
            .sends_value()
            .then(|| if new.relevant { new.value.clone().unwrap_or_default() } else { String::new() });
        let emit = match &value {
            Some(value) => output || !newly_visible || !value.is_empty(),
            None => output,
        };
        if emit {
            trace!("control `{}`: {} changed attributes", new.effective_id, attributes.len());
            self.sink.apply_update(ClientUpdate::Control {
                id: new.effective_id.clone(),
                attributes,
                value,
            })?;
        }
        Ok(())
    }

    fn diff_iteration(&mut self, old: Option<&Control>, new: &Control) -> anyhow::Result<()> {
        let changed = old.map_or(!new.relevant, |old| old.relevant != new.relevant);
        if changed {
            self.sink.apply_update(ClientUpdate::RepeatIteration {
                id: repeat_effective_id(new),
                iteration: new.iteration,
                relevant: new.relevant,
            })?;
        }
        Ok(())
    }

    fn diff_dialog(&mut self, old: Option<&Control>, new: &Control) -> anyhow::Result<()> {
        let hidden = DialogState::default();
        let before = old.and_then(|old| old.dialog.as_ref()).unwrap_or(&hidden);
        let after = new.dialog.as_ref().unwrap_or(&hidden);
        if before.visible != after.visible || (after.visible && before.neighbor != after.neighbor) {
            self.sink.apply_update(ClientUpdate::Dialog {
                id: new.effective_id.clone(),
                visible: after.visible,
                neighbor: after.neighbor.clone(),
            })?;
        }
        Ok(())
    }

    fn diff_children(&mut self, old: Option<&Control>, new: &Control) -> anyhow::Result<()> {
        if !new.kind.capabilities().has_children {
            return Ok(());
        }
        match new.kind {
            ControlKind::Repeat => self.diff_repeat(old, new),
            ControlKind::Switch => {
                // Only the selected case is visible to the client.
                let Some(case) = new.selected_case_control() else {
                    return Ok(());
                };
                let previous = old
                    .and_then(Control::selected_case_control)
                    .filter(|previous| previous.effective_id == case.effective_id);
                self.diff(previous.map(|previous| previous.children.as_slice()), &case.children)
            }
            _ => self.diff(old.map(|old| old.children.as_slice()), &new.children),
        }
    }

    fn diff_repeat(&mut self, old: Option<&Control>, new: &Control) -> anyhow::Result<()> {
        let after = new.children.as_slice();
        let size_after = after.len();
        match old {
            Some(old) if !old.children.is_empty() => {
                let before = old.children.as_slice();
                let size_before = before.len();
                if size_after > size_before {
                    self.copy_template(new, size_before + 1, size_after)?;
                    self.diff(Some(before), &after[..size_before])?;
                    self.diff(None, &after[size_before..])
                } else {
                    if size_after < size_before {
                        self.delete_iterations(new, size_before - size_after)?;
                    }
                    self.diff(Some(&before[..size_after]), after)
                }
            }
            Some(_) => {
                // Growing from empty, e.g. after an instance replacement.
                if size_after > 0 {
                    self.copy_template(new, 1, size_after)?;
                }
                self.diff(None, after)
            }
            None => {
                // A repeat inside a new subtree: the client already has the
                // first iteration from the enclosing template.
                if size_after > 1 {
                    self.copy_template(new, 2, size_after)?;
                } else if size_after == 0 {
                    self.delete_iterations(new, 1)?;
                }
                self.diff(None, after)
            }
        }
    }

    fn copy_template(&mut self, repeat: &Control, start: usize, end: usize) -> anyhow::Result<()> {
        self.sink.apply_update(ClientUpdate::CopyRepeatTemplate {
            id: repeat.static_id.clone(),
            parent_indexes: id::suffix_of(&repeat.effective_id).to_owned(),
            start,
            end,
        })
    }

    fn delete_iterations(&mut self, repeat: &Control, count: usize) -> anyhow::Result<()> {
        self.sink.apply_update(ClientUpdate::DeleteRepeatElements {
            id: repeat.static_id.clone(),
            parent_indexes: id::suffix_of(&repeat.effective_id).to_owned(),
            count,
        })
    }

    /// Report repeats whose index changed, after the control updates.
    pub fn diff_indexes(&mut self, before: &RepeatIndexes, after: &RepeatIndexes) -> anyhow::Result<()> {
        for (repeat_id, index) in after.changed_since(before) {
            self.sink.apply_update(ClientUpdate::RepeatIndex { id: repeat_id, index })?;
        }
        Ok(())
    }
}

/// Add an attribute unless the control is new and the value is what the
/// client assumes anyway. Returns whether it was added.
fn add_attribute(
    attributes: &mut Vec<(String, String)>,
    name: &str,
    value: &str,
    newly_visible: bool,
    is_default: bool,
) -> bool {
    if newly_visible && is_default {
        return false;
    }
    attributes.push((name.to_owned(), value.to_owned()));
    true
}

/// An iteration is reported under its repeat: `lines·2` for iteration 2 of
/// `lines` becomes `lines` with the enclosing suffix kept.
fn repeat_effective_id(iteration: &Control) -> String {
    let Some(mut iterations) = id::iterations(&iteration.effective_id) else {
        return iteration.static_id.clone();
    };
    iterations.pop();
    id::effective_id(&iteration.static_id, &iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::iter;

    fn input(effective_id: &str, value: &str) -> Control {
        let mut control = Control::new(ControlKind::Input, id::static_id(effective_id), effective_id);
        control.value = Some(value.to_owned());
        control
    }

    fn diff(before: Option<&[Control]>, after: &[Control]) -> Vec<ClientUpdate> {
        let mut updates = Vec::new();
        let value_changed = FxHashSet::default();
        ControlsDiffer::new(&mut updates, &value_changed).diff(before, after).unwrap();
        updates
    }

    /// # Panics
    /// Panics if identical snapshots produce updates.
    #[test]
    fn identical_snapshots_produce_nothing() {
        let mut controls = vec![input("name", "Ada"), input("city", "London")];
        controls[0].label = Some("Name".to_owned());
        controls[1].valid = false;
        assert!(diff(Some(controls.as_slice()), &controls).is_empty());
    }

    /// # Panics
    /// Panics if only changed properties are not reported.
    #[test]
    fn only_changed_properties_are_sent() {
        let before = vec![input("name", "Ada")];
        let mut after = before.clone();
        after[0].required = true;
        after[0].hint = Some("Your name".to_owned());
        assert_eq!(
            diff(Some(before.as_slice()), &after),
            vec![ClientUpdate::Control {
                id: "name".to_owned(),
                attributes: vec![
                    ("required".to_owned(), "true".to_owned()),
                    ("hint".to_owned(), "Your name".to_owned()),
                ],
                value: Some("Ada".to_owned()),
            }]
        );
    }

    /// # Panics
    /// Panics if a value changed by the client is not echoed back.
    #[test]
    fn value_changed_controls_are_forced() {
        let controls = vec![input("name", "Ada")];
        let mut updates = Vec::new();
        let value_changed: FxHashSet<String> = iter::once("name".to_owned()).collect();
        ControlsDiffer::new(&mut updates, &value_changed)
            .diff(Some(controls.as_slice()), &controls)
            .unwrap();
        assert_eq!(updates.len(), 1);
    }

    /// # Panics
    /// Panics if the relevance default for new controls is not applied.
    #[test]
    fn new_controls_send_relevance_only_when_not_default() {
        // Relevant and empty: the client template already shows this.
        assert!(diff(None, &[input("name", "")]).is_empty());

        let mut hidden = input("name", "Ada");
        hidden.relevant = false;
        assert_eq!(
            diff(None, &[hidden]),
            vec![ClientUpdate::Control {
                id: "name".to_owned(),
                attributes: vec![("relevant".to_owned(), "false".to_owned())],
                value: Some(String::new()),
            }]
        );
    }

    /// # Panics
    /// Panics if mismatched sibling lists are accepted.
    #[test]
    fn mismatched_lists_are_rejected() {
        let mut updates = Vec::new();
        let value_changed = FxHashSet::default();
        let before = [input("a", "")];
        let after = [input("a", ""), input("b", "")];
        let result = ControlsDiffer::new(&mut updates, &value_changed).diff(Some(before.as_slice()), &after);
        assert!(result.is_err());
    }
}
