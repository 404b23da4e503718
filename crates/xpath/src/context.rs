//! The binding context stack.
//!
//! Actions and controls evaluate their expressions against the innermost
//! frame. A frame records the in-scope model, the node-set with the current
//! position inside it, and the variables it declares. Frames are pushed and
//! popped in strict nesting order; the base frame set by [`ContextStack::reset`]
//! is never popped.

use crate::error::XPathError;
use crate::eval::evaluate_nodes;
use crate::value::{Value, Variables};
use crate::view::{DocumentView, EvalContext, XPathEvaluator};
use log::trace;
use xforms_dom::NodeRef;

/// One frame of the stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingContext {
    pub model: Option<String>,
    pub node_set: Vec<NodeRef>,
    /// 1-based position of the context item in `node_set`.
    pub position: usize,
    /// Whether this frame was produced by a `ref`, `nodeset` or `bind`.
    pub new_bind: bool,
    pub variables: Vec<(String, Value)>,
    /// Id of the element that pushed the frame.
    pub element_id: Option<String>,
}

impl BindingContext {
    /// Frame rooted at a model's default instance.
    pub fn for_model(model: &str, root: Option<NodeRef>) -> Self {
        Self {
            model: Some(model.to_owned()),
            node_set: root.into_iter().collect(),
            position: 1,
            ..Self::default()
        }
    }

    /// The context item, `None` when the node-set is empty.
    pub fn single_node(&self) -> Option<NodeRef> {
        self.position
            .checked_sub(1)
            .and_then(|index| self.node_set.get(index))
            .copied()
    }

    /// Evaluation context over this frame.
    pub fn eval_context<'ctx>(&'ctx self, variables: &'ctx Variables, lenient: bool) -> EvalContext<'ctx> {
        EvalContext::new(&self.node_set, self.position, variables)
            .with_model(self.model.as_deref())
            .with_lenient(lenient)
    }
}

/// Binding attributes of an element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingSpec {
    pub model: Option<String>,
    pub context: Option<String>,
    pub reference: Option<String>,
    pub bind: Option<String>,
    pub element_id: Option<String>,
}

impl BindingSpec {
    pub fn reference(expression: &str) -> Self {
        Self {
            reference: Some(expression.to_owned()),
            ..Self::default()
        }
    }

    pub fn has_binding(&self) -> bool {
        self.reference.is_some() || self.bind.is_some()
    }
}

/// What [`ContextStack::push_binding`] needs from the containing document.
pub trait BindingScope {
    fn view(&self) -> &dyn DocumentView;

    fn evaluator(&self) -> &dyn XPathEvaluator;

    /// Whether dynamic XPath errors are ignorable.
    fn lenient(&self) -> bool;

    /// Id of the first model of the document.
    fn default_model(&self) -> Option<&str>;

    /// Document element of a model's default instance.
    fn model_root(&self, model: &str) -> Option<NodeRef>;

    /// Owning model and node-set of a bind, `None` for an unknown bind.
    fn bind_nodes(&self, bind_id: &str) -> Option<(String, Vec<NodeRef>)>;
}

#[derive(Debug, Clone)]
pub struct ContextStack {
    frames: Vec<BindingContext>,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self::new(BindingContext::default())
    }
}

impl ContextStack {
    pub fn new(base: BindingContext) -> Self {
        Self { frames: vec![base] }
    }

    /// Drop every frame and start again from `base`.
    pub fn reset(&mut self, base: BindingContext) {
        self.frames.clear();
        self.frames.push(base);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> &BindingContext {
        // `frames` is never empty: `pop` keeps the base frame.
        &self.frames[self.frames.len() - 1]
    }

    pub fn push(&mut self, frame: BindingContext) {
        trace!("push binding depth={} nodes={}", self.frames.len(), frame.node_set.len());
        self.frames.push(frame);
    }

    /// Pop the innermost frame. The base frame stays.
    pub fn pop(&mut self) -> Option<BindingContext> {
        if self.frames.len() > 1 { self.frames.pop() } else { None }
    }

    /// Push the current node-set again with the context item moved to
    /// `position`, as done for each item of a repeat or an `iterate`.
    pub fn push_iteration(&mut self, position: usize) {
        let current = self.current();
        let frame = BindingContext {
            model: current.model.clone(),
            node_set: current.node_set.clone(),
            position,
            new_bind: true,
            variables: Vec::new(),
            element_id: None,
        };
        self.push(frame);
    }

    /// Push a frame declaring one variable, keeping the current focus.
    pub fn push_variable(&mut self, name: &str, value: Value) {
        let current = self.current();
        let frame = BindingContext {
            model: current.model.clone(),
            node_set: current.node_set.clone(),
            position: current.position,
            new_bind: false,
            variables: vec![(name.to_owned(), value)],
            element_id: None,
        };
        self.push(frame);
    }

    /// Variables in scope; inner declarations shadow outer ones.
    pub fn variables(&self) -> Variables {
        let mut variables = Variables::default();
        for frame in &self.frames {
            for (name, value) in &frame.variables {
                variables.insert(name.clone(), value.clone());
            }
        }
        variables
    }

    /// Evaluate the binding attributes of an element and push the resulting
    /// frame.
    ///
    /// A `model` different from the current one moves the focus to that
    /// model's default instance. `context` is then evaluated, followed by
    /// `bind` or `ref`. Without any of these the current focus is inherited.
    pub fn push_binding<S: BindingScope + ?Sized>(&mut self, scope: &S, binding: &BindingSpec) -> Result<(), XPathError> {
        let current = self.current();
        let mut model = current.model.clone();
        let mut node_set = current.node_set.clone();
        let mut position = current.position;
        let mut new_bind = false;

        if let Some(requested) = binding.model.as_deref().filter(|requested| model.as_deref() != Some(*requested)) {
            model = Some(requested.to_owned());
            node_set = scope.model_root(requested).into_iter().collect();
            position = 1;
        }
        if model.is_none() {
            model = scope.default_model().map(str::to_owned);
        }

        let variables = self.variables();
        if let Some(expression) = &binding.context {
            let context = EvalContext::new(&node_set, position, &variables)
                .with_model(model.as_deref())
                .with_lenient(scope.lenient());
            node_set = evaluate_nodes(scope.evaluator(), scope.view(), &context, expression)?;
            position = 1;
        }

        if let Some(bind_id) = &binding.bind {
            let (bind_model, bound) = scope
                .bind_nodes(bind_id)
                .ok_or_else(|| XPathError::static_error(bind_id, "reference to non-existing bind"))?;
            model = Some(bind_model);
            node_set = bound;
            position = 1;
            new_bind = true;
        } else if let Some(expression) = &binding.reference {
            let context = EvalContext::new(&node_set, position, &variables)
                .with_model(model.as_deref())
                .with_lenient(scope.lenient());
            node_set = evaluate_nodes(scope.evaluator(), scope.view(), &context, expression)?;
            position = 1;
            new_bind = true;
        }

        self.push(BindingContext {
            model,
            node_set,
            position,
            new_bind,
            variables: Vec::new(),
            element_id: binding.element_id.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xforms_dom::{InstanceKey, XmlTree};

    fn root_node() -> NodeRef {
        let tree = XmlTree::parse("<data/>").unwrap();
        NodeRef::new(InstanceKey::new(0, 0), tree.root())
    }

    /// # Panics
    /// Panics if the base frame can be popped.
    #[test]
    fn base_frame_survives_pop() {
        let mut stack = ContextStack::new(BindingContext::for_model("main", Some(root_node())));
        assert_eq!(stack.pop(), None);
        stack.push_iteration(1);
        assert_eq!(stack.depth(), 2);
        assert!(stack.pop().is_some());
        assert_eq!(stack.current().model.as_deref(), Some("main"));
    }

    /// # Panics
    /// Panics if inner variables do not shadow outer ones.
    #[test]
    fn inner_variables_shadow_outer() {
        let mut stack = ContextStack::default();
        stack.push_variable("total", Value::Number(1.0));
        stack.push_variable("total", Value::Number(2.0));
        assert_eq!(stack.variables().get("total"), Some(&Value::Number(2.0)));
        stack.pop();
        assert_eq!(stack.variables().get("total"), Some(&Value::Number(1.0)));
    }

    /// # Panics
    /// Panics if the empty node-set yields a context item.
    #[test]
    fn empty_node_set_has_no_single_node() {
        let frame = BindingContext {
            position: 1,
            ..BindingContext::default()
        };
        assert_eq!(frame.single_node(), None);
    }
}
