//! XForms models and their deferred update phases.
//!
//! A [`Model`] owns its instances and binds. Actions mark it dirty through
//! its [`DeferredActionContext`]; the document then drains the pending
//! phases in rebuild, recalculate, revalidate, refresh order. Every phase
//! reports to a [`DependencyTracker`], including the ones that had nothing
//! to do.

#![allow(
    clippy::missing_errors_doc,
    reason = "Phases fail with XFormsError, documented on the type"
)]
#![allow(
    clippy::module_name_repetitions,
    reason = "XFormsError and XFormsEvent are the established names"
)]

pub mod bind;
pub mod deferred;
pub mod dependencies;
pub mod error;
pub mod event;
pub mod model;
pub mod schema;
pub mod types;
pub mod variable;

pub use bind::Bind;
pub use deferred::DeferredActionContext;
pub use dependencies::{DependencyTracker, Phase, PhaseRecord, Revision};
pub use error::{Location, XFormsError};
pub use event::{PendingEvent, XFormsEvent};
pub use model::{Evaluation, InstanceDescriptor, Loading, Model, ModelDescriptor, ModelView};
pub use schema::{NoResources, ResourceResolver, SchemaValidator};
pub use types::{DataType, Primitive};
pub use variable::VariableDescriptor;
