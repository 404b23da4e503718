//! XPath evaluation for the XForms engine.
//!
//! The engine never depends on a concrete XPath implementation: it goes
//! through [`XPathEvaluator`] with a [`DocumentView`] of its instances. The
//! [`SimpleEvaluator`] covers the path subset forms actually use.
//!
//! [`ContextStack`] tracks the binding context actions and controls are
//! evaluated against.

#![allow(
    clippy::missing_errors_doc,
    reason = "Every fallible function returns XPathError, documented on the type"
)]
#![allow(
    clippy::module_name_repetitions,
    reason = "XPathError and XPathEvaluator are the established names"
)]

pub mod context;
pub mod error;
pub mod eval;
pub mod simple;
pub mod value;
pub mod view;

pub use context::{BindingContext, BindingScope, BindingSpec, ContextStack};
pub use error::{XPathError, XPathErrorKind};
pub use eval::{evaluate, evaluate_boolean, evaluate_nodes, evaluate_number, evaluate_string, expand_avt, is_avt};
pub use simple::SimpleEvaluator;
pub use value::{Value, Variables, format_number, node_string, parse_number};
pub use view::{DocumentView, EvalContext, XPathEvaluator};
