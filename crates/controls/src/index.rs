//! Repeat indexes and the algorithms that keep them within bounds as
//! node-sets change.
//!
//! Indexes are keyed by repeat static id: a nested repeat has one index,
//! which applies within the currently indexed iteration of its enclosing
//! repeats. Walks over the tree therefore only descend into the iteration
//! at the current index of each repeat ("following repeats").

use crate::control::{Control, ControlTree};
use crate::descriptor::{ControlKind, StaticState};
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};
use xforms_dom::NodeRef;

/// Current index of every repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepeatIndexes {
    indexes: FxHashMap<String, usize>,
}

impl RepeatIndexes {
    /// Every repeat at its start index; bounds are applied by the first
    /// adjustment.
    pub fn initial(state: &StaticState) -> Self {
        let indexes = state
            .repeat_ids()
            .iter()
            .map(|repeat_id| (repeat_id.clone(), state.start_index(repeat_id)))
            .collect();
        Self { indexes }
    }

    /// Current 1-based index of a repeat, `0` when it is empty.
    pub fn get(&self, repeat_id: &str) -> Option<usize> {
        self.indexes.get(repeat_id).copied()
    }

    /// Overwrite the index of a repeat.
    pub fn set(&mut self, repeat_id: &str, index: usize) {
        let previous = self.indexes.insert(repeat_id.to_owned(), index);
        if previous != Some(index) {
            trace!("repeat `{repeat_id}`: index {previous:?} -> {index}");
        }
    }

    /// The map handed to XPath evaluation for `index()`.
    pub const fn as_map(&self) -> &FxHashMap<String, usize> {
        &self.indexes
    }

    /// Repeats whose index differs from `previous`, sorted by id.
    pub fn changed_since(&self, previous: &Self) -> Vec<(String, usize)> {
        let mut changed: Vec<(String, usize)> = self
            .indexes
            .iter()
            .filter(|(repeat_id, index)| previous.get(repeat_id) != Some(**index))
            .map(|(repeat_id, index)| (repeat_id.clone(), *index))
            .collect();
        changed.sort();
        changed
    }
}

/// Callbacks for [`visit_controls_follow_repeats`].
pub trait ControlVisitor {
    /// Called before the children of `control` are visited. Index changes
    /// made here decide which iteration of a repeat is visited next.
    fn start(&mut self, control: &Control, indexes: &mut RepeatIndexes);

    fn end(&mut self, _control: &Control) {}
}

/// Walk the controls in document order, descending only into relevant
/// containers and, for repeats, only into the iteration at the current
/// index.
pub fn visit_controls_follow_repeats<V: ControlVisitor + ?Sized>(
    controls: &[Control],
    indexes: &mut RepeatIndexes,
    visitor: &mut V,
) {
    for control in controls {
        visitor.start(control, indexes);
        if control.kind == ControlKind::Repeat {
            let current = indexes.get(&control.static_id).unwrap_or(0);
            if let Some(iteration) = current.checked_sub(1).and_then(|index| control.children.get(index))
                && iteration.relevant
            {
                visit_controls_follow_repeats(&iteration.children, indexes, visitor);
            }
        } else if control.relevant {
            visit_controls_follow_repeats(&control.children, indexes, visitor);
        }
        visitor.end(control);
    }
}

/// Clamp `index` into `[1, size]`, or 0 for an empty node-set.
pub const fn clamp_index(index: usize, size: usize) -> usize {
    if size == 0 {
        0
    } else if index < 1 {
        1
    } else if index > size {
        size
    } else {
        index
    }
}

/// After a refresh: bring every visited repeat's index within bounds and
/// zero the repeats the walk never reached.
pub fn adjust_indexes(tree: &ControlTree, indexes: &mut RepeatIndexes) {
    struct Clamp {
        visited: FxHashSet<String>,
    }

    impl ControlVisitor for Clamp {
        fn start(&mut self, control: &Control, indexes: &mut RepeatIndexes) {
            if control.kind == ControlKind::Repeat {
                let current = indexes.get(&control.static_id).unwrap_or(0);
                indexes.set(&control.static_id, clamp_index(current, control.nodeset.len()));
                self.visited.insert(control.static_id.clone());
            }
        }
    }

    let mut clamp = Clamp {
        visited: FxHashSet::default(),
    };
    visit_controls_follow_repeats(&tree.roots, indexes, &mut clamp);
    let unvisited: Vec<String> = indexes
        .indexes
        .keys()
        .filter(|repeat_id| !clamp.visited.contains(*repeat_id))
        .cloned()
        .collect();
    for repeat_id in unvisited {
        indexes.set(&repeat_id, 0);
    }
}

/// After an insertion, with `tree` rebuilt over the new nodes: the first
/// repeat whose node-set holds inserted nodes points at the one inserted
/// last, and the repeats nested in it restart at their start index. Other
/// repeats are clamped.
pub fn adjust_indexes_after_insert(
    tree: &ControlTree,
    state: &StaticState,
    indexes: &mut RepeatIndexes,
    inserted: &[NodeRef],
) {
    struct AfterInsert<'adjust> {
        state: &'adjust StaticState,
        inserted: &'adjust [NodeRef],
        /// Effective id of the repeat holding the inserted nodes, while
        /// visiting inside it.
        found: Option<String>,
    }

    impl ControlVisitor for AfterInsert<'_> {
        fn start(&mut self, control: &Control, indexes: &mut RepeatIndexes) {
            if control.kind != ControlKind::Repeat {
                return;
            }
            let repeat_id = control.static_id.as_str();
            let size = control.nodeset.len();
            if self.found.is_some() {
                // Nested in the affected repeat: restart.
                indexes.set(repeat_id, clamp_index(self.state.start_index(repeat_id), size));
                return;
            }
            if size == 0 {
                indexes.set(repeat_id, 0);
                return;
            }
            match position_of_last_inserted(&control.nodeset, self.inserted) {
                Some(position) => {
                    debug!("repeat `{repeat_id}`: index moves to inserted node at {position}");
                    indexes.set(repeat_id, position);
                    for nested in self.state.nested_repeat_ids(repeat_id) {
                        indexes.set(nested, 0);
                    }
                    self.found = Some(control.effective_id.clone());
                }
                None => {
                    let current = indexes.get(repeat_id).unwrap_or(0);
                    indexes.set(repeat_id, clamp_index(current, size));
                }
            }
        }

        fn end(&mut self, control: &Control) {
            if self.found.as_deref() == Some(control.effective_id.as_str()) {
                self.found = None;
            }
        }
    }

    let mut visitor = AfterInsert {
        state,
        inserted,
        found: None,
    };
    visit_controls_follow_repeats(&tree.roots, indexes, &mut visitor);
}

/// 1-based position in `nodeset` of the inserted node that was inserted
/// last.
fn position_of_last_inserted(nodeset: &[NodeRef], inserted: &[NodeRef]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, node) in nodeset.iter().enumerate() {
        let Some(order) = inserted.iter().position(|candidate| candidate == node) else {
            continue;
        };
        if best.is_none_or(|(best_order, _)| order > best_order) {
            best = Some((order, index + 1));
        }
        if order + 1 == inserted.len() {
            break;
        }
    }
    best.map(|(_, position)| position)
}

/// Index changes computed before a deletion, applied after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexUpdates {
    pub updates: Vec<(String, usize)>,
    /// Nested repeats reset by the deletion; they restart at their start
    /// index once the tree is rebuilt.
    pub reinitialized: FxHashSet<String>,
}

impl IndexUpdates {
    pub fn apply(&self, indexes: &mut RepeatIndexes) {
        for (repeat_id, index) in &self.updates {
            indexes.set(repeat_id, *index);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Before deleting `node`, with `tree` still showing it: compute how the
/// index of the first repeat containing it changes so that it keeps
/// pointing at the same item.
pub fn adjust_indexes_for_delete(
    tree: &ControlTree,
    state: &StaticState,
    indexes: &RepeatIndexes,
    node: NodeRef,
) -> IndexUpdates {
    struct ForDelete<'adjust> {
        state: &'adjust StaticState,
        node: NodeRef,
        result: IndexUpdates,
        done: bool,
    }

    impl ControlVisitor for ForDelete<'_> {
        fn start(&mut self, control: &Control, indexes: &mut RepeatIndexes) {
            if self.done || control.kind != ControlKind::Repeat {
                return;
            }
            let Some(deleted_at) = control.nodeset.iter().position(|candidate| *candidate == self.node) else {
                return;
            };
            let repeat_id = control.static_id.as_str();
            let size = control.nodeset.len();
            let current = indexes.get(repeat_id).unwrap_or(0);
            let (new_index, reinitialize) = index_after_delete(current, deleted_at + 1, size);
            debug!("repeat `{repeat_id}`: deleting item {} moves index {current} -> {new_index}", deleted_at + 1);
            self.result.updates.push((repeat_id.to_owned(), new_index));
            if reinitialize {
                for nested in self.state.nested_repeat_ids(repeat_id) {
                    self.result.updates.push((nested.to_owned(), 0));
                    self.result.reinitialized.insert(nested.to_owned());
                }
            }
            self.done = true;
        }
    }

    let mut scratch = indexes.clone();
    let mut visitor = ForDelete {
        state,
        node,
        result: IndexUpdates::default(),
        done: false,
    };
    visit_controls_follow_repeats(&tree.roots, &mut scratch, &mut visitor);
    visitor.result
}

/// New index of a repeat of `size` items at index `current` once the item
/// at `deleted` (1-based) is removed, and whether nested repeats restart.
pub const fn index_after_delete(current: usize, deleted: usize, size: usize) -> (usize, bool) {
    if size == 1 {
        (0, false)
    } else if current == deleted {
        if deleted == size { (current - 1, true) } else { (current, true) }
    } else if current < deleted {
        (current, false)
    } else {
        (current - 1, false)
    }
}

/// Bring indexes within bounds after node-sets changed; repeats in
/// `force_update` restart at their start index.
pub fn adjust_repeat_indexes(
    tree: &ControlTree,
    state: &StaticState,
    indexes: &mut RepeatIndexes,
    force_update: &FxHashSet<String>,
) {
    struct Bounds<'adjust> {
        state: &'adjust StaticState,
        force_update: &'adjust FxHashSet<String>,
    }

    impl ControlVisitor for Bounds<'_> {
        fn start(&mut self, control: &Control, indexes: &mut RepeatIndexes) {
            if control.kind != ControlKind::Repeat {
                return;
            }
            let repeat_id = control.static_id.as_str();
            let index = if self.force_update.contains(repeat_id) {
                self.state.start_index(repeat_id)
            } else {
                indexes.get(repeat_id).unwrap_or(0)
            };
            indexes.set(repeat_id, clamp_index(index, control.nodeset.len()));
        }
    }

    visit_controls_follow_repeats(&tree.roots, indexes, &mut Bounds { state, force_update });
}
