//! XForms controls.
//!
//! The static side is a tree of [`ControlDescriptor`]s analysed once into a
//! [`StaticState`]. Each refresh evaluates it against the instances into a
//! [`ControlTree`] snapshot; the [`ControlsDiffer`] compares two snapshots
//! and emits the [`ClientUpdate`]s the client needs.
//!
//! Repeat indexes and switch selections live beside the snapshots in
//! [`RepeatIndexes`] and [`SwitchState`], with the algorithms that keep
//! them consistent across insertions and deletions.

#![allow(
    clippy::missing_errors_doc,
    reason = "Errors carry the control location through anyhow context"
)]
#![allow(
    clippy::module_name_repetitions,
    reason = "ControlKind and ControlTree are the established names"
)]

pub mod builder;
pub mod control;
pub mod descriptor;
pub mod differ;
pub mod id;
pub mod index;
pub mod refresh;
pub mod switch;

pub use builder::{ControlScope, TreeBuilder};
pub use control::{Control, ControlTree, DialogState};
pub use descriptor::{Capabilities, ControlDescriptor, ControlKind, ControlTexts, StaticInfo, StaticState, TextSource};
pub use differ::{ClientUpdate, ControlsDiffer, DEFAULT_RELEVANCE_FOR_NEW_ITERATION, UpdateSink};
pub use index::{
    ControlVisitor, IndexUpdates, RepeatIndexes, adjust_indexes, adjust_indexes_after_insert,
    adjust_indexes_for_delete, adjust_repeat_indexes, clamp_index, index_after_delete,
    visit_controls_follow_repeats,
};
pub use refresh::refresh_events;
pub use switch::{CaseStore, SwitchState};
