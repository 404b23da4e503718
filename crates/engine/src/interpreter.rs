//! Runs action elements against a containing document.
//!
//! Each action is evaluated in the binding context of its element: the
//! `if` and `while` guards against the in-scope context item, then the
//! action's own binding. `xxforms:iterate` runs the whole thing once per
//! node of its node-set.

use crate::action::{ActionElement, ActionKind, InsertPlace, LoadShow};
use crate::cycle::LoadRequest;
use crate::document::ContainingDocument;
use crate::mutation::InsertTarget;
use anyhow::Context as _;
use log::{debug, trace};
use xforms_dom::NodeRef;
use xforms_model::{PendingEvent, Phase, XFormsError, XFormsEvent};
use xforms_xpath::{
    BindingScope, BindingSpec, ContextStack, evaluate_boolean, evaluate_nodes, evaluate_number, evaluate_string,
    expand_avt, is_avt,
};

/// Interprets one handler's action tree.
pub struct ActionInterpreter<'doc> {
    document: &'doc mut ContainingDocument,
    stack: ContextStack,
    /// Context item in scope before the running action pushed its binding.
    in_scope: Option<NodeRef>,
    event: PendingEvent,
}

impl<'doc> ActionInterpreter<'doc> {
    pub fn new(document: &'doc mut ContainingDocument, event: &PendingEvent, observer: &str) -> Self {
        let stack = ContextStack::new(document.observer_context(observer));
        Self {
            document,
            stack,
            in_scope: None,
            event: event.clone(),
        }
    }

    pub fn run(&mut self, action: &ActionElement) -> anyhow::Result<()> {
        trace!("running {} for {}", action.name(), self.event.event.name());
        self.run_action(action)
    }

    fn run_action(&mut self, action: &ActionElement) -> anyhow::Result<()> {
        self.run_iterations(action)
            .with_context(|| format!("running action \"{}\" at {}", action.name(), action.location))
    }

    fn run_iterations(&mut self, action: &ActionElement) -> anyhow::Result<()> {
        let Some(iterate) = &action.iterate else {
            return self.run_guarded(action, &action.binding);
        };
        // `model` and `context` apply to the iterate expression; the
        // binding of each run starts from the iterated node.
        let outer = BindingSpec {
            model: action.binding.model.clone(),
            context: action.binding.context.clone(),
            reference: Some(iterate.clone()),
            bind: None,
            element_id: None,
        };
        let inner = BindingSpec {
            model: None,
            context: None,
            ..action.binding.clone()
        };
        self.push(&outer)?;
        let count = self.stack.current().node_set.len();
        let mut result = Ok(());
        for position in 1..=count {
            self.stack.push_iteration(position);
            result = self.run_guarded(action, &inner);
            self.stack.pop();
            if result.is_err() {
                break;
            }
        }
        self.stack.pop();
        result
    }

    fn run_guarded(&mut self, action: &ActionElement, binding: &BindingSpec) -> anyhow::Result<()> {
        loop {
            if let Some(condition) = &action.condition
                && !self.guard(condition, "if")?
            {
                break;
            }
            if let Some(condition) = &action.while_condition
                && !self.guard(condition, "while")?
            {
                break;
            }
            self.in_scope = self.stack.current().single_node();
            self.push(binding)?;
            let result = self.execute(action);
            self.stack.pop();
            result?;
            if action.while_condition.is_none() {
                break;
            }
        }
        Ok(())
    }

    fn push(&mut self, binding: &BindingSpec) -> anyhow::Result<()> {
        let scope = self.document.scope();
        self.stack.push_binding(&scope, binding)?;
        Ok(())
    }

    /// An `if` or `while` guard. Without a context item the action does
    /// not run.
    fn guard(&self, expression: &str, kind: &str) -> anyhow::Result<bool> {
        if self.stack.current().single_node().is_none() {
            debug!("not running action: no context item for `{kind}` condition");
            return Ok(false);
        }
        let scope = self.document.scope();
        let variables = self.stack.variables();
        let context = self.stack.current().eval_context(&variables, scope.lenient());
        Ok(evaluate_boolean(scope.evaluator(), &scope, &context, expression)?)
    }

    fn string(&self, expression: &str) -> anyhow::Result<String> {
        let scope = self.document.scope();
        let variables = self.stack.variables();
        let context = self.stack.current().eval_context(&variables, scope.lenient());
        Ok(evaluate_string(scope.evaluator(), &scope, &context, expression)?)
    }

    fn number(&self, expression: &str) -> anyhow::Result<f64> {
        let scope = self.document.scope();
        let variables = self.stack.variables();
        let context = self.stack.current().eval_context(&variables, scope.lenient());
        Ok(evaluate_number(scope.evaluator(), &scope, &context, expression)?)
    }

    fn nodes(&self, expression: &str) -> anyhow::Result<Vec<NodeRef>> {
        let scope = self.document.scope();
        let variables = self.stack.variables();
        let context = self.stack.current().eval_context(&variables, scope.lenient());
        Ok(evaluate_nodes(scope.evaluator(), &scope, &context, expression)?)
    }

    fn avt(&self, template: &str) -> anyhow::Result<String> {
        let scope = self.document.scope();
        let variables = self.stack.variables();
        let context = self.stack.current().eval_context(&variables, scope.lenient());
        Ok(expand_avt(scope.evaluator(), &scope, &context, template)?)
    }

    /// Model named by a phase action, defaulting to the in-scope one.
    fn model_of(&self, model: Option<&String>) -> Option<String> {
        model
            .cloned()
            .or_else(|| self.stack.current().model.clone())
            .or_else(|| self.document.models().first().map(|first| first.id().to_owned()))
    }

    fn execute(&mut self, action: &ActionElement) -> anyhow::Result<()> {
        match &action.kind {
            ActionKind::Block => {
                for child in &action.children {
                    self.run_action(child)?;
                }
                Ok(())
            }
            ActionKind::SetValue { value, content } => {
                let Some(node) = self.stack.current().single_node() else {
                    debug!("setvalue: no destination node, ignoring");
                    return Ok(());
                };
                let text = match value {
                    Some(expression) => self.string(expression)?,
                    None => content.clone(),
                };
                self.document.set_node_value(node, &text)?;
                Ok(())
            }
            ActionKind::Insert { at, position, origin } => self.insert(at.as_deref(), *position, origin.as_deref()),
            ActionKind::Delete { at } => self.delete(at.as_deref()),
            ActionKind::SetIndex { repeat, index } => {
                if self.stack.current().single_node().is_none() {
                    debug!("setindex: no context item, ignoring");
                    return Ok(());
                }
                let index = self.number(index)?;
                self.document.set_repeat_index(repeat, index)
            }
            ActionKind::Toggle { case } => {
                let case_id = if is_avt(case) {
                    if self.stack.current().single_node().is_none() {
                        debug!("toggle: no context item for `{case}`, ignoring");
                        return Ok(());
                    }
                    self.avt(case)?
                } else {
                    case.clone()
                };
                self.document.toggle_case(&case_id)?;
                Ok(())
            }
            ActionKind::Load { resource, show, target } => {
                self.load(action, resource.as_deref(), *show, target.as_deref())
            }
            ActionKind::Dispatch { name, target } => {
                let event = XFormsEvent::from_name(name)
                    .ok_or_else(|| XFormsError::validation(&action.location, format!("unknown event `{name}`")))?;
                let Some(target) = self.document.resolve_target(target) else {
                    debug!("dispatch: no target `{target}`, ignoring");
                    return Ok(());
                };
                self.document.dispatch(PendingEvent::new(event, &target))?;
                Ok(())
            }
            ActionKind::Rebuild { model } => self.phase(model.as_ref(), Phase::Rebuild),
            ActionKind::Recalculate { model } => self.phase(model.as_ref(), Phase::Recalculate),
            ActionKind::Revalidate { model } => self.phase(model.as_ref(), Phase::Revalidate),
            ActionKind::Refresh { model } => self.phase(model.as_ref(), Phase::Refresh),
            ActionKind::Reset { model } => {
                let Some(model_id) = self.model_of(model.as_ref()) else {
                    return Ok(());
                };
                self.document.dispatch(PendingEvent::new(XFormsEvent::Reset, &model_id))?;
                Ok(())
            }
            ActionKind::Show {
                dialog,
                neighbor,
                constrain,
            } => self.document.show_dialog(dialog, neighbor.as_deref(), *constrain),
            ActionKind::Hide { dialog } => self.document.hide_dialog(dialog),
        }
    }

    fn phase(&mut self, model: Option<&String>, phase: Phase) -> anyhow::Result<()> {
        let Some(model_id) = self.model_of(model) else {
            debug!("{phase:?}: no model, ignoring");
            return Ok(());
        };
        self.document.force_phase(&model_id, phase)
    }

    fn insert(&mut self, at: Option<&str>, place: InsertPlace, origin: Option<&str>) -> anyhow::Result<()> {
        let nodeset = self.stack.current().node_set.clone();
        let origins = match origin {
            Some(expression) => self.nodes(expression)?,
            None => nodeset.last().copied().into_iter().collect(),
        };
        if origins.is_empty() {
            debug!("insert: nothing to copy, ignoring");
            return Ok(());
        }
        let target = if nodeset.is_empty() {
            let Some(parent) = self.in_scope else {
                debug!("insert: empty node-set and no context node, ignoring");
                return Ok(());
            };
            InsertTarget::Child(parent)
        } else {
            let size = nodeset.len();
            let index = match at {
                Some(expression) => {
                    let requested = self.number(expression)?;
                    if requested.is_nan() {
                        size
                    } else {
                        requested.round().clamp(1.0, size as f64) as usize
                    }
                }
                None => size,
            };
            InsertTarget::Sibling(nodeset[index - 1], place)
        };
        self.document.insert_nodes(target, &origins)?;
        Ok(())
    }

    fn delete(&mut self, at: Option<&str>) -> anyhow::Result<()> {
        let nodeset = self.stack.current().node_set.clone();
        if nodeset.is_empty() {
            debug!("delete: empty node-set, ignoring");
            return Ok(());
        }
        let targets = match at {
            Some(expression) => {
                let requested = self.number(expression)?;
                if requested.is_nan() {
                    debug!("delete: `at` is not a number, ignoring");
                    return Ok(());
                }
                let index = requested.round().clamp(1.0, nodeset.len() as f64) as usize;
                vec![nodeset[index - 1]]
            }
            None => nodeset,
        };
        self.document.delete_nodes(&targets)?;
        Ok(())
    }

    fn load(
        &mut self,
        action: &ActionElement,
        resource: Option<&str>,
        show: LoadShow,
        target: Option<&str>,
    ) -> anyhow::Result<()> {
        let frame = self.stack.current();
        let bound = action.binding.has_binding();
        let resolved = match (bound, resource) {
            (true, Some(_)) => {
                debug!("load: both a binding and `resource`, ignoring");
                return Ok(());
            }
            (true, None) => {
                let Some(value) = frame.single_node().and_then(|node| self.document.node_value(node)) else {
                    debug!("load: binding points to no node, ignoring");
                    return Ok(());
                };
                value
            }
            (false, Some(resource)) if is_avt(resource) => {
                if frame.single_node().is_none() {
                    debug!("load: no context item for `{resource}`, ignoring");
                    return Ok(());
                }
                self.avt(resource)?
            }
            (false, Some(resource)) => resource.to_owned(),
            (false, None) => {
                return Err(XFormsError::validation(
                    &action.location,
                    "xforms:load requires either a binding or a `resource` attribute",
                )
                .into());
            }
        };
        self.document.queue_load(LoadRequest {
            resource: resolved.trim().to_owned(),
            target: target.map(str::to_owned),
            replace: show == LoadShow::Replace,
        });
        Ok(())
    }
}
