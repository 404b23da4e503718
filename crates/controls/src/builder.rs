//! Evaluates the static controls against the current instances to produce a
//! [`ControlTree`].

use crate::control::{Control, ControlTree, DialogState};
use crate::descriptor::{ControlDescriptor, ControlKind, StaticState, TextSource};
use crate::id::{self, Iterations};
use crate::switch::SwitchState;
use anyhow::Context as _;
use log::trace;
use rustc_hash::FxHashMap;
use xforms_dom::{MipView, NodeRef};
use xforms_xpath::{BindingContext, BindingScope, ContextStack, XPathError, evaluate_string, node_string};

/// What building controls needs from the document beyond binding
/// resolution.
pub trait ControlScope: BindingScope {
    /// Effective model item properties of a bound node.
    fn mips(&self, node: NodeRef) -> MipView;
}

/// Builds control trees for one document.
pub struct TreeBuilder<'build, S: ControlScope + ?Sized> {
    scope: &'build S,
    switches: &'build mut SwitchState,
    dialogs: &'build FxHashMap<String, DialogState>,
    stack: ContextStack,
}

impl<'build, S: ControlScope + ?Sized> TreeBuilder<'build, S> {
    pub fn new(
        scope: &'build S,
        switches: &'build mut SwitchState,
        dialogs: &'build FxHashMap<String, DialogState>,
    ) -> Self {
        Self {
            scope,
            switches,
            dialogs,
            stack: ContextStack::default(),
        }
    }

    /// Build the whole tree, starting from `base` (normally the default
    /// model's root). Switches without a selection get their default case.
    pub fn build(mut self, state: &StaticState, base: BindingContext) -> anyhow::Result<ControlTree> {
        self.stack.reset(base);
        let mut roots = Vec::with_capacity(state.roots().len());
        for descriptor in state.roots() {
            roots.push(self.build_control(descriptor, &Iterations::new(), true)?);
        }
        Ok(ControlTree::new(roots))
    }

    fn build_control(
        &mut self,
        descriptor: &ControlDescriptor,
        iterations: &Iterations,
        parent_relevant: bool,
    ) -> anyhow::Result<Control> {
        let effective_id = id::effective_id(&descriptor.static_id, iterations);
        self.stack
            .push_binding(self.scope, &descriptor.binding)
            .with_context(|| format!("evaluating binding of `{effective_id}` at {}", descriptor.location))?;
        let built = self.populate(descriptor, &effective_id, iterations, parent_relevant);
        self.stack.pop();
        built
    }

    fn populate(
        &mut self,
        descriptor: &ControlDescriptor,
        effective_id: &str,
        iterations: &Iterations,
        parent_relevant: bool,
    ) -> anyhow::Result<Control> {
        let mut control = Control::new(descriptor.kind, &descriptor.static_id, effective_id);
        control.internal = descriptor.is_internal_group();

        let bound = descriptor.binding.has_binding() && descriptor.kind != ControlKind::Repeat;
        control.relevant = parent_relevant;
        if bound {
            control.binding = self.stack.current().single_node();
            match control.binding {
                Some(node) => self.apply_mips(&mut control, node),
                None => control.relevant = false,
            }
        }

        if descriptor.kind.capabilities().has_value {
            let value = if control.relevant {
                self.value(descriptor, control.binding)
                    .with_context(|| format!("evaluating value of `{effective_id}` at {}", descriptor.location))?
            } else {
                String::new()
            };
            control.value = Some(value);
        }
        if control.relevant {
            self.texts(descriptor, &mut control)
                .with_context(|| format!("evaluating texts of `{effective_id}` at {}", descriptor.location))?;
        }

        match descriptor.kind {
            ControlKind::Repeat => self.repeat(descriptor, &mut control, iterations)?,
            ControlKind::Switch => {
                for child in &descriptor.children {
                    control.children.push(self.build_control(child, iterations, control.relevant)?);
                }
                let selected = self.selected_case(descriptor, effective_id, iterations);
                control.selected_case = control.relevant.then_some(selected).flatten();
            }
            ControlKind::Dialog => {
                control.dialog = Some(self.dialogs.get(effective_id).cloned().unwrap_or_default());
                for child in &descriptor.children {
                    control.children.push(self.build_control(child, iterations, control.relevant)?);
                }
            }
            _ => {
                for child in &descriptor.children {
                    control.children.push(self.build_control(child, iterations, control.relevant)?);
                }
            }
        }
        Ok(control)
    }

    fn apply_mips(&self, control: &mut Control, node: NodeRef) {
        let mips = self.scope.mips(node);
        control.relevant = control.relevant && mips.relevant;
        control.readonly = mips.readonly;
        control.required = mips.required;
        control.valid = mips.valid;
        control.type_name = mips.type_name;
        control.custom = mips.custom;
    }

    fn repeat(&mut self, descriptor: &ControlDescriptor, control: &mut Control, iterations: &Iterations) -> anyhow::Result<()> {
        control.nodeset = self.stack.current().node_set.clone();
        trace!("repeat `{}`: {} iterations", control.effective_id, control.nodeset.len());
        for (index, node) in control.nodeset.clone().into_iter().enumerate() {
            let position = index + 1;
            let mut inner = iterations.clone();
            inner.push(position);
            let mut iteration = Control::new(
                ControlKind::RepeatIteration,
                &descriptor.static_id,
                &id::effective_id(&descriptor.static_id, &inner),
            );
            iteration.iteration = position;
            iteration.binding = Some(node);
            iteration.relevant = control.relevant && self.scope.mips(node).relevant;

            self.stack.push_iteration(position);
            let mut children = Vec::with_capacity(descriptor.children.len());
            let mut failure = None;
            for child in &descriptor.children {
                match self.build_control(child, &inner, iteration.relevant) {
                    Ok(built) => children.push(built),
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }
            self.stack.pop();
            if let Some(error) = failure {
                return Err(error);
            }
            iteration.children = children;
            control.children.push(iteration);
        }
        Ok(())
    }

    fn value(&self, descriptor: &ControlDescriptor, binding: Option<NodeRef>) -> Result<String, XPathError> {
        if let Some(expression) = &descriptor.value {
            return self.evaluate(expression);
        }
        Ok(binding
            .map(|node| node_string(self.scope.view(), node))
            .unwrap_or_default())
    }

    fn texts(&self, descriptor: &ControlDescriptor, control: &mut Control) -> Result<(), XPathError> {
        let texts = &descriptor.texts;
        control.label = self.text(texts.label.as_ref())?;
        control.help = self.text(texts.help.as_ref())?;
        control.hint = self.text(texts.hint.as_ref())?;
        control.alert = self.text(texts.alert.as_ref())?;
        Ok(())
    }

    fn text(&self, source: Option<&TextSource>) -> Result<Option<String>, XPathError> {
        match source {
            None => Ok(None),
            Some(TextSource::Literal(text)) => Ok(Some(text.clone())),
            Some(TextSource::Expression(expression)) => self.evaluate(expression).map(Some),
        }
    }

    fn evaluate(&self, expression: &str) -> Result<String, XPathError> {
        let variables = self.stack.variables();
        let context = self.stack.current().eval_context(&variables, self.scope.lenient());
        evaluate_string(self.scope.evaluator(), self.scope.view(), &context, expression)
    }

    /// Selected case of a switch, choosing and recording the default when
    /// none is selected yet.
    fn selected_case(&mut self, descriptor: &ControlDescriptor, effective_id: &str, iterations: &Iterations) -> Option<String> {
        if let Some(selected) = self.switches.selected(effective_id) {
            return Some(selected.to_owned());
        }
        let default = descriptor
            .children
            .iter()
            .filter(|child| child.kind == ControlKind::Case)
            .find(|case| case.selected)
            .or_else(|| descriptor.children.iter().find(|child| child.kind == ControlKind::Case))?;
        let case_id = id::effective_id(&default.static_id, iterations);
        self.switches.select(effective_id, &case_id);
        Some(case_id)
    }
}
