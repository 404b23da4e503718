//! Dynamic controls: one snapshot of the control tree with everything the
//! client can see evaluated.

use crate::descriptor::ControlKind;
use std::collections::BTreeMap;
use xforms_dom::NodeRef;

/// Visibility of an `xxforms:dialog`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogState {
    pub visible: bool,
    /// Effective id of the control the dialog is shown next to.
    pub neighbor: Option<String>,
    pub constrain: bool,
}

/// One concrete control.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools, reason = "Mirrors the boolean model item properties")]
pub struct Control {
    pub effective_id: String,
    pub static_id: String,
    pub kind: ControlKind,
    /// Bound node; for an iteration, the node of its repeat item.
    pub binding: Option<NodeRef>,
    /// Node-set of a repeat.
    pub nodeset: Vec<NodeRef>,
    pub relevant: bool,
    pub readonly: bool,
    pub required: bool,
    pub valid: bool,
    pub type_name: Option<String>,
    pub custom: BTreeMap<String, String>,
    pub label: Option<String>,
    pub help: Option<String>,
    pub hint: Option<String>,
    pub alert: Option<String>,
    /// External value of a value control.
    pub value: Option<String>,
    /// 1-based position of an iteration.
    pub iteration: usize,
    /// Selected case of a switch, as an effective id. `None` while the
    /// switch is not relevant.
    pub selected_case: Option<String>,
    pub dialog: Option<DialogState>,
    /// Internal groups are never reported.
    pub internal: bool,
    pub children: Vec<Control>,
}

impl Control {
    pub fn new(kind: ControlKind, static_id: &str, effective_id: &str) -> Self {
        Self {
            effective_id: effective_id.to_owned(),
            static_id: static_id.to_owned(),
            kind,
            binding: None,
            nodeset: Vec::new(),
            relevant: true,
            readonly: false,
            required: false,
            valid: true,
            type_name: None,
            custom: BTreeMap::new(),
            label: None,
            help: None,
            hint: None,
            alert: None,
            value: None,
            iteration: 0,
            selected_case: None,
            dialog: None,
            internal: false,
            children: Vec::new(),
        }
    }

    /// Whether the client would see no difference between `self` and
    /// `other`. A missing `other` is never equal.
    pub fn equals_external(&self, other: Option<&Self>) -> bool {
        let Some(other) = other else {
            return false;
        };
        self.effective_id == other.effective_id
            && self.relevant == other.relevant
            && self.readonly == other.readonly
            && self.required == other.required
            && self.valid == other.valid
            && self.type_name == other.type_name
            && self.custom == other.custom
            && self.label == other.label
            && self.help == other.help
            && self.hint == other.hint
            && self.alert == other.alert
            && self.value == other.value
            && self.selected_case == other.selected_case
            && self.dialog == other.dialog
    }

    /// The case children of a switch that is currently selected.
    pub fn selected_case_control(&self) -> Option<&Self> {
        let selected = self.selected_case.as_deref()?;
        self.children.iter().find(|case| case.effective_id == selected)
    }
}

/// A full snapshot of the controls of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlTree {
    pub roots: Vec<Control>,
}

impl ControlTree {
    pub const fn new(roots: Vec<Control>) -> Self {
        Self { roots }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Find a control by effective id.
    pub fn find(&self, effective_id: &str) -> Option<&Control> {
        fn find_in<'tree>(controls: &'tree [Control], effective_id: &str) -> Option<&'tree Control> {
            controls.iter().find_map(|control| {
                if control.effective_id == effective_id {
                    Some(control)
                } else {
                    find_in(&control.children, effective_id)
                }
            })
        }
        find_in(&self.roots, effective_id)
    }

    /// Chain of controls from a root down to `effective_id`, inclusive.
    pub fn ancestry(&self, effective_id: &str) -> Vec<&Control> {
        fn walk<'tree>(controls: &'tree [Control], effective_id: &str, path: &mut Vec<&'tree Control>) -> bool {
            for control in controls {
                path.push(control);
                if control.effective_id == effective_id || walk(&control.children, effective_id, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        walk(&self.roots, effective_id, &mut path);
        path
    }

    /// Closest enclosing iteration of a control.
    pub fn enclosing_iteration(&self, effective_id: &str) -> Option<&Control> {
        let mut ancestry = self.ancestry(effective_id);
        ancestry.pop();
        ancestry
            .into_iter()
            .rev()
            .find(|control| control.kind == ControlKind::RepeatIteration)
    }

    /// Every control in document order, containers before their children.
    pub fn flatten(&self) -> Vec<&Control> {
        fn collect<'tree>(controls: &'tree [Control], out: &mut Vec<&'tree Control>) {
            for control in controls {
                out.push(control);
                collect(&control.children, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.roots, &mut out);
        out
    }

    /// Concrete controls instantiated from a static id.
    pub fn by_static_id(&self, static_id: &str) -> Vec<&Control> {
        self.flatten()
            .into_iter()
            .filter(|control| control.static_id == static_id && control.kind != ControlKind::RepeatIteration)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ControlTree {
        let mut repeat = Control::new(ControlKind::Repeat, "lines", "lines");
        for iteration in 1..=2 {
            let mut item = Control::new(ControlKind::RepeatIteration, "lines", &format!("lines\u{b7}{iteration}"));
            item.iteration = iteration;
            item.children
                .push(Control::new(ControlKind::Input, "qty", &format!("qty\u{b7}{iteration}")));
            repeat.children.push(item);
        }
        ControlTree::new(vec![repeat])
    }

    /// # Panics
    /// Panics if lookups by id fail.
    #[test]
    fn finds_controls_and_iterations() {
        let tree = sample();
        assert_eq!(tree.find("qty\u{b7}2").map(|qty| qty.kind), Some(ControlKind::Input));
        assert_eq!(tree.enclosing_iteration("qty\u{b7}2").map(|item| item.iteration), Some(2));
        assert_eq!(tree.by_static_id("qty").len(), 2);
        assert_eq!(tree.flatten().len(), 5);
    }

    /// # Panics
    /// Panics if external equality ignores a visible change.
    #[test]
    fn external_equality_covers_visible_state() {
        let tree = sample();
        let qty = tree.find("qty\u{b7}1").unwrap();
        let mut changed = qty.clone();
        assert!(qty.equals_external(Some(&changed)));
        changed.hint = Some("how many".to_owned());
        assert!(!qty.equals_external(Some(&changed)));
        assert!(!qty.equals_external(None));
    }
}
