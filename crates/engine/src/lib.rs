//! The XForms engine.
//!
//! A [`ContainingDocument`] holds the models and controls of one form. It
//! dispatches events to the handlers the form declares, runs their actions
//! through the [`ActionInterpreter`], drains the pending model phases in
//! rebuild, recalculate, revalidate, refresh order and diffs the control
//! tree after every client request.

#![allow(
    clippy::missing_errors_doc,
    reason = "Errors are anyhow chains naming the action and its location"
)]
#![allow(
    clippy::module_name_repetitions,
    reason = "EngineConfig and ContainingDocument are the established names"
)]

pub mod action;
pub mod config;
pub mod cycle;
pub mod document;
pub mod interpreter;
pub mod mutation;

pub use action::{ActionElement, ActionKind, EventHandler, InsertPlace, LoadShow};
pub use config::EngineConfig;
pub use cycle::{ClientEvent, CycleOutcome, LoadRequest};
pub use document::{ContainingDocument, DocumentScope, FormDefinition};
pub use interpreter::ActionInterpreter;
pub use mutation::InsertTarget;
