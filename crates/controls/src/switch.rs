//! Selected cases of switches, and keeping them attached to the right
//! repeat items across insertions and deletions.

use crate::control::{Control, ControlTree};
use crate::descriptor::ControlKind;
use crate::id;
use log::{debug, trace};
use rustc_hash::FxHashMap;
use xforms_dom::NodeRef;

/// Where switch selections are parked while effective ids are unstable.
///
/// Implemented by the document over the instances' per-node switch tables.
pub trait CaseStore {
    fn set_case(&mut self, node: NodeRef, switch_id: &str, case_id: &str);
    fn case_for(&self, node: NodeRef, switch_id: &str) -> Option<String>;
}

/// Switch effective id to selected case effective id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchState {
    selected: FxHashMap<String, String>,
}

impl SwitchState {
    /// Effective id of the case selected in a switch.
    pub fn selected(&self, switch_id: &str) -> Option<&str> {
        self.selected.get(switch_id).map(String::as_str)
    }

    /// Select a case. Returns the previously selected case when it changed.
    pub fn select(&mut self, switch_id: &str, case_id: &str) -> Option<Option<String>> {
        let previous = self.selected.insert(switch_id.to_owned(), case_id.to_owned());
        if previous.as_deref() == Some(case_id) {
            return None;
        }
        debug!("switch `{switch_id}`: case `{case_id}` selected");
        Some(previous)
    }

    /// Number of switches with a recorded selection.
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Whether no switch has a recorded selection.
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Forget every selection, so switches fall back to their default case.
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Before a structural mutation: record the static id of every case
    /// selected inside a repeat on the node of its closest enclosing
    /// iteration. Returns whether anything was recorded.
    pub fn externalize(&self, tree: &ControlTree, store: &mut dyn CaseStore) -> bool {
        let mut found = false;
        for (switch_id, case_id) in &self.selected {
            if !id::is_repeated(switch_id) {
                continue;
            }
            let Some(node) = tree
                .enclosing_iteration(switch_id)
                .and_then(|iteration| iteration.binding)
            else {
                continue;
            };
            trace!("parking case `{case_id}` of `{switch_id}`");
            store.set_case(node, id::static_id(switch_id), id::static_id(case_id));
            found = true;
        }
        found
    }

    /// After a structural mutation and rebuild of `tree`: give every switch
    /// inside a repeat the case parked on its iteration's node, under the
    /// new effective ids. Switches that no longer exist are forgotten, and
    /// repeated switches with nothing parked fall back to their default.
    pub fn internalize(&mut self, tree: &ControlTree, store: &dyn CaseStore) {
        let mut switches = Vec::new();
        collect_switches(&tree.roots, None, &mut switches);

        let mut selected = FxHashMap::default();
        for (switch, iteration_node) in switches {
            let suffix = id::suffix_of(&switch.effective_id);
            let parked = iteration_node.and_then(|node| store.case_for(node, &switch.static_id));
            let case_id = match parked {
                Some(case_static_id) if !suffix.is_empty() => {
                    Some(format!("{case_static_id}{}{suffix}", id::REPEAT_SEPARATOR))
                }
                Some(case_static_id) => Some(case_static_id),
                None if suffix.is_empty() => self.selected.get(&switch.effective_id).cloned(),
                None => None,
            };
            if let Some(case_id) = case_id {
                selected.insert(switch.effective_id.clone(), case_id);
            }
        }
        self.selected = selected;
    }
}

fn collect_switches<'tree>(
    controls: &'tree [Control],
    iteration_node: Option<NodeRef>,
    out: &mut Vec<(&'tree Control, Option<NodeRef>)>,
) {
    for control in controls {
        let node = if control.kind == ControlKind::RepeatIteration {
            control.binding
        } else {
            iteration_node
        };
        if control.kind == ControlKind::Switch {
            out.push((control, node));
        }
        collect_switches(&control.children, node, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xforms_dom::{InstanceKey, XmlTree};

    #[derive(Default)]
    struct Parked(FxHashMap<(NodeRef, String), String>);

    impl CaseStore for Parked {
        fn set_case(&mut self, node: NodeRef, switch_id: &str, case_id: &str) {
            self.0.insert((node, switch_id.to_owned()), case_id.to_owned());
        }

        fn case_for(&self, node: NodeRef, switch_id: &str) -> Option<String> {
            self.0.get(&(node, switch_id.to_owned())).cloned()
        }
    }

    fn tree(nodes: &[NodeRef]) -> ControlTree {
        let mut repeat = Control::new(ControlKind::Repeat, "items", "items");
        for (index, node) in nodes.iter().enumerate() {
            let position = index + 1;
            let mut item = Control::new(ControlKind::RepeatIteration, "items", &id::effective_id("items", &[position]));
            item.iteration = position;
            item.binding = Some(*node);
            item.children.push(Control::new(
                ControlKind::Switch,
                "details",
                &id::effective_id("details", &[position]),
            ));
            repeat.children.push(item);
        }
        ControlTree::new(vec![repeat])
    }

    /// # Panics
    /// Panics if a selection does not follow its node when items shift.
    #[test]
    fn selection_follows_node_across_insert() {
        let xml = XmlTree::parse("<items><item/><item/><item/></items>").unwrap();
        let root = xml.document_element().unwrap();
        let items: Vec<NodeRef> = xml
            .element_children(root)
            .into_iter()
            .map(|node| NodeRef::new(InstanceKey::new(0, 0), node))
            .collect();

        let before = tree(&items[1..]);
        let mut state = SwitchState::default();
        state.select(&id::effective_id("details", &[1]), &id::effective_id("edit", &[1]));

        let mut store = Parked::default();
        assert!(state.externalize(&before, &mut store));

        // An item was inserted before: the selected item is now the second.
        let after = tree(&items);
        state.internalize(&after, &store);
        assert_eq!(
            state.selected(&id::effective_id("details", &[2])),
            Some(id::effective_id("edit", &[2]).as_str())
        );
        assert_eq!(state.selected(&id::effective_id("details", &[1])), None);
    }

    /// # Panics
    /// Panics if reselecting the same case is reported as a change.
    #[test]
    fn select_reports_changes_only() {
        let mut state = SwitchState::default();
        assert_eq!(state.select("tabs", "first"), Some(None));
        assert_eq!(state.select("tabs", "first"), None);
        assert_eq!(state.select("tabs", "second"), Some(Some("first".to_owned())));
    }
}
