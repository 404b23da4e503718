//! Instance store for the XForms engine.
//!
//! Instance documents are XML trees kept in `indextree` arenas. Nodes are
//! addressed by [`NodeRef`], a pair of instance key and arena id, so nothing
//! in a tree points back at its owner. Model item properties and the
//! switch/case bookkeeping that must survive structural mutations live in
//! side tables keyed by node id.
//!
//! Externally loaded instances may be shared between documents through the
//! [`InstanceCache`]; shared trees are immutable and copied on first write.

#![allow(
    clippy::missing_errors_doc,
    reason = "Error conditions are described on the error enum"
)]
#![allow(
    clippy::module_name_repetitions,
    reason = "Types like InstanceCache read better than Cache"
)]

pub mod cache;
pub mod connection;
pub mod error;
pub mod instance;
pub mod mips;
pub mod tree;

pub use cache::{CacheKey, InstanceCache};
pub use connection::ConnectionResult;
pub use error::DomError;
pub use instance::{CachePolicy, Instance, InstanceKey, NodeRef, ValidationMode};
pub use indextree::NodeId;
pub use mips::{MipTable, MipView, NodeMips, SwitchCaseTable};
pub use tree::{Fragment, Grafted, InsertPosition, NodeKind, XmlTree};
