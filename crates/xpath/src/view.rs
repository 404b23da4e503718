//! The seam between the engine and whichever XPath implementation evaluates
//! its expressions.

use crate::error::XPathError;
use crate::value::{Value, Variables};
use xforms_dom::{InstanceKey, NodeRef, XmlTree};

/// What an evaluator may see of the containing document.
pub trait DocumentView {
    /// Tree of an instance.
    fn tree(&self, instance: InstanceKey) -> Option<&XmlTree>;

    /// Document element of instance `id` of `model`, or of the model's
    /// default (first) instance when `id` is `None`. `model` defaults to the
    /// first model of the document.
    fn instance_root(&self, model: Option<&str>, id: Option<&str>) -> Option<NodeRef>;

    /// Current index of a repeat, for the `index()` function.
    fn repeat_index(&self, repeat_id: &str) -> Option<usize>;
}

/// Dynamic context of one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'ctx> {
    /// Context node-set; the context item is `nodes[position - 1]`.
    pub nodes: &'ctx [NodeRef],
    /// 1-based context position.
    pub position: usize,
    pub variables: &'ctx Variables,
    /// In-scope model, used by `instance()` and by absolute paths without a
    /// context node.
    pub model: Option<&'ctx str>,
    /// Whether dynamic errors are logged and replaced by an empty result.
    pub lenient: bool,
}

impl<'ctx> EvalContext<'ctx> {
    pub fn new(nodes: &'ctx [NodeRef], position: usize, variables: &'ctx Variables) -> Self {
        Self {
            nodes,
            position,
            variables,
            model: None,
            lenient: false,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<&'ctx str>) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// The context item, if the context node-set is not empty.
    pub fn item(&self) -> Option<NodeRef> {
        self.position
            .checked_sub(1)
            .and_then(|index| self.nodes.get(index))
            .copied()
    }

    /// Size of the context node-set.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }
}

/// An XPath implementation.
///
/// The engine treats evaluation as opaque: it hands over an expression, a
/// view of its instances and a dynamic context and gets a [`Value`] back.
pub trait XPathEvaluator: Send + Sync {
    /// Evaluate `expression`.
    ///
    /// # Errors
    /// Syntax errors are [`Static`](crate::XPathErrorKind::Static); failures
    /// depending on data are [`Dynamic`](crate::XPathErrorKind::Dynamic).
    fn evaluate(&self, view: &dyn DocumentView, context: &EvalContext<'_>, expression: &str) -> Result<Value, XPathError>;
}
