//! The containing document: models, controls and the event machinery that
//! ties them together.

use crate::action::EventHandler;
use crate::config::EngineConfig;
use crate::cycle::LoadRequest;
use crate::interpreter::ActionInterpreter;
use anyhow::Context as _;
use core::mem;
use log::{debug, info, trace, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::info_span;
use xforms_controls::{
    CaseStore, Control, ControlDescriptor, ControlKind, ControlScope, ControlTree, DialogState, RepeatIndexes,
    StaticState, SwitchState, TreeBuilder, adjust_indexes, id, refresh_events,
};
use xforms_dom::{Instance, InstanceCache, InstanceKey, MipView, NodeRef, XmlTree};
use xforms_model::{
    DependencyTracker, Evaluation, Loading, Model, ModelDescriptor, NoResources, PendingEvent, Phase,
    ResourceResolver, XFormsError, XFormsEvent,
};
use xforms_xpath::{
    BindingContext, BindingScope, DocumentView, SimpleEvaluator, Variables, XPathEvaluator, evaluate_string,
};

/// Passes [`ContainingDocument::run_pending_phases`] makes before giving
/// up on handlers that keep dirtying their models.
pub const MAX_SETTLE_PASSES: usize = 32;

/// Everything static analysis produces for one form.
#[derive(Debug, Clone, Default)]
pub struct FormDefinition {
    pub models: Vec<ModelDescriptor>,
    pub controls: Vec<ControlDescriptor>,
    pub handlers: Vec<EventHandler>,
}

impl FormDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model(mut self, model: ModelDescriptor) -> Self {
        self.models.push(model);
        self
    }

    #[must_use]
    pub fn control(mut self, control: ControlDescriptor) -> Self {
        self.controls.push(control);
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: EventHandler) -> Self {
        self.handlers.push(handler);
        self
    }
}

/// Read access to the whole document for XPath evaluation and control
/// building.
pub struct DocumentScope<'doc> {
    models: &'doc [Model],
    indexes: &'doc RepeatIndexes,
    evaluator: &'doc dyn XPathEvaluator,
    lenient: bool,
}

impl<'doc> DocumentScope<'doc> {
    pub fn new(
        models: &'doc [Model],
        indexes: &'doc RepeatIndexes,
        evaluator: &'doc dyn XPathEvaluator,
        lenient: bool,
    ) -> Self {
        Self {
            models,
            indexes,
            evaluator,
            lenient,
        }
    }

    pub fn evaluation(&self) -> Evaluation<'doc> {
        Evaluation {
            evaluator: self.evaluator,
            lenient: self.lenient,
            repeat_indexes: self.indexes.as_map(),
        }
    }

    fn model(&self, model_id: &str) -> Option<&'doc Model> {
        self.models.iter().find(|model| model.id() == model_id)
    }

    /// Base binding context: the root of the first model's default instance.
    pub fn base_context(&self) -> BindingContext {
        self.models.first().map_or_else(BindingContext::default, |model| {
            BindingContext::for_model(model.id(), self.model_root(model.id()))
        })
    }
}

impl DocumentView for DocumentScope<'_> {
    fn tree(&self, instance: InstanceKey) -> Option<&XmlTree> {
        self.models
            .get(instance.model as usize)
            .and_then(|model| model.instance(instance))
            .map(Instance::tree)
    }

    fn instance_root(&self, model: Option<&str>, id: Option<&str>) -> Option<NodeRef> {
        let in_scope = model.and_then(|model_id| self.model(model_id)).or_else(|| self.models.first());
        let instance = match id {
            Some(id) => in_scope
                .and_then(|model| model.instance_by_id(id))
                .or_else(|| self.models.iter().find_map(|model| model.instance_by_id(id))),
            None => in_scope.and_then(Model::default_instance),
        };
        instance.and_then(Instance::document_element)
    }

    fn repeat_index(&self, repeat_id: &str) -> Option<usize> {
        self.indexes.get(repeat_id)
    }
}

impl BindingScope for DocumentScope<'_> {
    fn view(&self) -> &dyn DocumentView {
        self
    }

    fn evaluator(&self) -> &dyn XPathEvaluator {
        self.evaluator
    }

    fn lenient(&self) -> bool {
        self.lenient
    }

    fn default_model(&self) -> Option<&str> {
        self.models.first().map(Model::id)
    }

    fn model_root(&self, model: &str) -> Option<NodeRef> {
        self.model(model)
            .and_then(Model::default_instance)
            .and_then(Instance::document_element)
    }

    fn bind_nodes(&self, bind_id: &str) -> Option<(String, Vec<NodeRef>)> {
        for model in self.models {
            match model.bind_nodeset(self.evaluation(), bind_id) {
                Ok(Some(nodes)) => return Some((model.id().to_owned(), nodes)),
                Ok(None) => {}
                Err(error) => {
                    warn!("bind `{bind_id}`: {error}");
                    return Some((model.id().to_owned(), Vec::new()));
                }
            }
        }
        None
    }
}

impl ControlScope for DocumentScope<'_> {
    fn mips(&self, node: NodeRef) -> MipView {
        self.models
            .get(node.instance.model as usize)
            .and_then(|model| model.mip_view(node).ok())
            .unwrap_or_default()
    }
}

/// Switch selections parked on instance nodes.
struct ModelCases<'doc> {
    models: &'doc mut [Model],
}

impl CaseStore for ModelCases<'_> {
    fn set_case(&mut self, node: NodeRef, switch_id: &str, case_id: &str) {
        if let Some(instance) = self
            .models
            .get_mut(node.instance.model as usize)
            .and_then(|model| model.instance_mut(node.instance))
        {
            instance.switch_cases_mut().set(node.node, switch_id, case_id);
        }
    }

    fn case_for(&self, node: NodeRef, switch_id: &str) -> Option<String> {
        self.models
            .get(node.instance.model as usize)
            .and_then(|model| model.instance(node.instance))
            .and_then(|instance| instance.switch_cases().case_for(node.node, switch_id))
            .map(str::to_owned)
    }
}

/// One live form: its models, its controls and their dynamic state.
pub struct ContainingDocument {
    config: EngineConfig,
    evaluator: Arc<dyn XPathEvaluator>,
    resolver: Arc<dyn ResourceResolver + Send + Sync>,
    cache: Arc<InstanceCache>,
    pub(crate) models: Vec<Model>,
    pub(crate) controls: Arc<StaticState>,
    handlers: Arc<[EventHandler]>,
    pub(crate) tree: ControlTree,
    pub(crate) indexes: RepeatIndexes,
    pub(crate) switches: SwitchState,
    pub(crate) dialogs: FxHashMap<String, DialogState>,
    pub(crate) tracker: DependencyTracker,
    pub(crate) loads: Vec<LoadRequest>,
    pub(crate) value_changed: FxHashSet<String>,
    /// Control state changed outside the models (selected cases, dialogs,
    /// repeat indexes): the next refresh must rebuild the tree.
    pub(crate) controls_stale: bool,
    ready: bool,
}

impl ContainingDocument {
    /// A document that has not been initialized yet.
    pub fn new(
        form: FormDefinition,
        config: EngineConfig,
        evaluator: Arc<dyn XPathEvaluator>,
        resolver: Arc<dyn ResourceResolver + Send + Sync>,
        cache: Arc<InstanceCache>,
    ) -> Self {
        let models = form
            .models
            .into_iter()
            .enumerate()
            .map(|(position, descriptor)| {
                Model::new(Arc::new(descriptor), position as u32).with_bind_validation(config.bind_validation)
            })
            .collect();
        let controls = Arc::new(StaticState::new(form.controls));
        let indexes = RepeatIndexes::initial(&controls);
        Self {
            config,
            evaluator,
            resolver,
            cache,
            models,
            controls,
            handlers: form.handlers.into(),
            tree: ControlTree::default(),
            indexes,
            switches: SwitchState::default(),
            dialogs: FxHashMap::default(),
            tracker: DependencyTracker::new(),
            loads: Vec::new(),
            value_changed: FxHashSet::default(),
            controls_stale: false,
            ready: false,
        }
    }

    /// A document using the built-in evaluator, no external resources and
    /// a private instance cache.
    pub fn standalone(form: FormDefinition, config: EngineConfig) -> Self {
        let cache = Arc::new(InstanceCache::new(config.instance_cache_size));
        Self::new(form, config, Arc::new(SimpleEvaluator::new()), Arc::new(NoResources), cache)
    }

    /// Settings the document was created with.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether initialization completed.
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Models in document order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Model by id.
    pub fn model(&self, model_id: &str) -> Option<&Model> {
        self.models.iter().find(|model| model.id() == model_id)
    }

    /// The latest control tree.
    pub const fn controls(&self) -> &ControlTree {
        &self.tree
    }

    /// The control descriptors, indexed by static id.
    pub fn static_state(&self) -> &StaticState {
        &self.controls
    }

    /// Control of the latest tree by effective id.
    pub fn control(&self, effective_id: &str) -> Option<&Control> {
        self.tree.find(effective_id)
    }

    /// Current index of a repeat by static id.
    pub fn repeat_index(&self, repeat_id: &str) -> Option<usize> {
        self.indexes.get(repeat_id)
    }

    /// All repeat indexes.
    pub const fn repeat_indexes(&self) -> &RepeatIndexes {
        &self.indexes
    }

    /// Effective id of the case selected in a switch.
    pub fn selected_case(&self, switch_id: &str) -> Option<&str> {
        self.switches.selected(switch_id)
    }

    /// Visibility of a dialog that has been shown or hidden.
    pub fn dialog(&self, dialog_id: &str) -> Option<&DialogState> {
        self.dialogs.get(dialog_id)
    }

    /// Dependency tracker of the models.
    pub const fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// Dependency tracker of the models, for clearing its history.
    pub fn tracker_mut(&mut self) -> &mut DependencyTracker {
        &mut self.tracker
    }

    /// Shared instance cache.
    pub fn cache(&self) -> &InstanceCache {
        &self.cache
    }

    /// XPath scope over the models and repeat indexes.
    pub fn scope(&self) -> DocumentScope<'_> {
        DocumentScope::new(
            &self.models,
            &self.indexes,
            &*self.evaluator,
            self.config.ignore_dynamic_xpath_errors,
        )
    }

    /// Evaluate an expression as a string from the root of the default
    /// instance.
    pub fn evaluate(&self, expression: &str) -> anyhow::Result<String> {
        let scope = self.scope();
        let base = scope.base_context();
        let variables = Variables::default();
        let context = base.eval_context(&variables, scope.lenient());
        evaluate_string(&*self.evaluator, &scope, &context, expression)
            .with_context(|| format!("evaluating `{expression}`"))
    }

    /// Run `xforms-model-construct`, `xforms-model-construct-done` and
    /// `xforms-ready`, building the first control tree on the way.
    pub fn initialize(&mut self) -> anyhow::Result<()> {
        let _span = info_span!("xforms.initialize").entered();
        anyhow::ensure!(!self.ready, XFormsError::IllegalState("document already initialized".to_owned()));

        let model_ids: Vec<String> = self.models.iter().map(|model| model.id().to_owned()).collect();
        for model_id in &model_ids {
            self.dispatch(PendingEvent::new(XFormsEvent::ModelConstruct, model_id))?;
        }
        for model_id in &model_ids {
            self.dispatch(PendingEvent::new(XFormsEvent::ModelConstructDone, model_id))?;
        }

        self.indexes = RepeatIndexes::initial(&self.controls);
        self.refresh()?;

        for model_id in &model_ids {
            self.dispatch(PendingEvent::new(XFormsEvent::Ready, model_id))?;
        }
        self.run_pending_phases()?;

        for model in &mut self.models {
            model.capture_reset_state();
        }
        self.ready = true;
        info!(
            "document ready: {} model(s), {} control(s)",
            self.models.len(),
            self.tree.flatten().len()
        );
        Ok(())
    }

    /// Dispatch an event: run the handlers observing the target and its
    /// ancestors, then the default action. Returns whether any handler ran.
    pub fn dispatch(&mut self, event: PendingEvent) -> anyhow::Result<bool> {
        debug!("dispatching {} to `{}`", event.event.name(), event.target);
        let handled = self.run_handlers(&event)?;
        self.default_action(&event)?;
        Ok(handled)
    }

    /// Effective ids observing an event at `target`, innermost first.
    fn observers(&self, target: &str) -> Vec<String> {
        let mut chain: Vec<String> = self
            .tree
            .ancestry(target)
            .into_iter()
            .rev()
            .filter(|control| control.kind != ControlKind::RepeatIteration)
            .map(|control| control.effective_id.clone())
            .collect();
        if chain.is_empty() {
            chain.push(target.to_owned());
        }
        chain
    }

    fn run_handlers(&mut self, event: &PendingEvent) -> anyhow::Result<bool> {
        let handlers = Arc::clone(&self.handlers);
        let mut handled = false;
        for observer in self.observers(&event.target) {
            let observer_static = id::static_id(&observer);
            for handler in handlers
                .iter()
                .filter(|handler| handler.observer == observer_static && handler.observes(event.event))
            {
                handled = true;
                trace!("{} on `{observer}`: running {}", event.event.name(), handler.action.name());
                ActionInterpreter::new(self, event, &observer)
                    .run(&handler.action)
                    .with_context(|| format!("handling {} on `{observer}`", event.event.name()))?;
            }
        }
        Ok(handled)
    }

    fn default_action(&mut self, event: &PendingEvent) -> anyhow::Result<()> {
        match event.event {
            XFormsEvent::ModelConstruct => self.construct_model(&event.target),
            XFormsEvent::Rebuild => self.run_phase(&event.target, Phase::Rebuild),
            XFormsEvent::Recalculate => self.run_phase(&event.target, Phase::Recalculate),
            XFormsEvent::Revalidate => self.run_phase(&event.target, Phase::Revalidate),
            XFormsEvent::Refresh => self.refresh(),
            XFormsEvent::Reset => self.reset_model(&event.target),
            XFormsEvent::DialogOpen => {
                let dialog = self.dialogs.entry(event.target.clone()).or_insert(DialogState {
                    visible: false,
                    neighbor: None,
                    constrain: true,
                });
                dialog.visible = true;
                dialog.neighbor.clone_from(&event.detail);
                self.controls_stale = true;
                Ok(())
            }
            XFormsEvent::DialogClose => {
                if let Some(dialog) = self.dialogs.get_mut(&event.target) {
                    dialog.visible = false;
                    dialog.neighbor = None;
                    self.controls_stale = true;
                }
                Ok(())
            }
            XFormsEvent::ModelConstructDone
            | XFormsEvent::Ready
            | XFormsEvent::ComputeException
            | XFormsEvent::LinkException
            | XFormsEvent::ValueChanged
            | XFormsEvent::InstanceValueChanged
            | XFormsEvent::Valid
            | XFormsEvent::Invalid
            | XFormsEvent::InstanceValid
            | XFormsEvent::InstanceInvalid
            | XFormsEvent::Enabled
            | XFormsEvent::Disabled
            | XFormsEvent::Readonly
            | XFormsEvent::Readwrite
            | XFormsEvent::Required
            | XFormsEvent::Optional
            | XFormsEvent::ScrollFirst
            | XFormsEvent::ScrollLast
            | XFormsEvent::Select
            | XFormsEvent::Deselect
            | XFormsEvent::Insert
            | XFormsEvent::Delete
            | XFormsEvent::DomActivate => Ok(()),
        }
    }

    fn model_position(&self, model_id: &str) -> Option<usize> {
        self.models.iter().position(|model| model.id() == model_id)
    }

    fn construct_model(&mut self, model_id: &str) -> anyhow::Result<()> {
        let Some(position) = self.model_position(model_id) else {
            debug!("model-construct: no model `{model_id}`");
            return Ok(());
        };
        let evaluation = Evaluation {
            evaluator: &*self.evaluator,
            lenient: self.config.ignore_dynamic_xpath_errors,
            repeat_indexes: self.indexes.as_map(),
        };
        let loading = Loading {
            resolver: &*self.resolver,
            cache: &self.cache,
            default_ttl: self.config.instance_cache_ttl(),
        };
        let result = self.models[position].construct(evaluation, loading, &mut self.tracker);
        match result {
            Ok(events) => {
                for event in events {
                    self.dispatch(event)?;
                }
                Ok(())
            }
            Err(error) if error.is_link() => self.raise_exception(XFormsEvent::LinkException, model_id, error),
            Err(error) if error.is_compute() => self.raise_exception(XFormsEvent::ComputeException, model_id, error),
            Err(error) => Err(anyhow::Error::new(error).context(format!("constructing model `{model_id}`"))),
        }
    }

    /// Run one phase of one model if its flag is set.
    pub(crate) fn run_phase(&mut self, model_id: &str, phase: Phase) -> anyhow::Result<()> {
        if phase == Phase::Refresh {
            return self.refresh();
        }
        let Some(position) = self.model_position(model_id) else {
            debug!("{phase:?}: no model `{model_id}`");
            return Ok(());
        };
        let evaluation = Evaluation {
            evaluator: &*self.evaluator,
            lenient: self.config.ignore_dynamic_xpath_errors,
            repeat_indexes: self.indexes.as_map(),
        };
        let model = &mut self.models[position];
        let result = match phase {
            Phase::Rebuild => model.do_rebuild(evaluation, &mut self.tracker).map(|_| Vec::new()),
            Phase::Recalculate => model
                .do_recalculate(evaluation, &mut self.tracker, false)
                .map(|_| Vec::new()),
            Phase::Revalidate => model.do_revalidate(evaluation, &mut self.tracker),
            Phase::Refresh => Ok(Vec::new()),
        };
        match result {
            Ok(events) => {
                for event in events {
                    self.dispatch(event)?;
                }
                Ok(())
            }
            Err(error) if error.is_compute() => self.raise_exception(XFormsEvent::ComputeException, model_id, error),
            Err(error) => Err(anyhow::Error::new(error).context(format!("{phase:?} of model `{model_id}`"))),
        }
    }

    /// Dispatch an exception event; nobody handling it ends the cycle with
    /// the underlying error.
    fn raise_exception(&mut self, event: XFormsEvent, target: &str, error: XFormsError) -> anyhow::Result<()> {
        let handled = self.dispatch(PendingEvent::new(event, target).with_detail(error.to_string()))?;
        if handled || !event.is_fatal_when_unhandled() {
            warn!("{} on `{target}` handled: {error}", event.name());
            return Ok(());
        }
        Err(anyhow::Error::new(error).context(format!("{} not handled on `{target}`", event.name())))
    }

    fn reset_model(&mut self, model_id: &str) -> anyhow::Result<()> {
        let Some(position) = self.model_position(model_id) else {
            return Ok(());
        };
        if !self.models[position].restore_reset_state(&mut self.tracker) {
            debug!("reset: model `{model_id}` has no captured state");
            return Ok(());
        }
        info!("model `{model_id}` reset");
        for event in [
            XFormsEvent::Rebuild,
            XFormsEvent::Recalculate,
            XFormsEvent::Revalidate,
            XFormsEvent::Refresh,
        ] {
            self.dispatch(PendingEvent::new(event, model_id))?;
        }
        Ok(())
    }

    /// Flag one phase of a model and dispatch its event, as the explicit
    /// phase actions do.
    pub(crate) fn force_phase(&mut self, model_id: &str, phase: Phase) -> anyhow::Result<()> {
        let Some(position) = self.model_position(model_id) else {
            debug!("{phase:?}: no model `{model_id}`, ignoring");
            return Ok(());
        };
        self.models[position].request_phase(phase);
        let event = match phase {
            Phase::Rebuild => XFormsEvent::Rebuild,
            Phase::Recalculate => XFormsEvent::Recalculate,
            Phase::Revalidate => XFormsEvent::Revalidate,
            Phase::Refresh => XFormsEvent::Refresh,
        };
        self.dispatch(PendingEvent::new(event, model_id))?;
        Ok(())
    }

    /// Whether any model or the controls still have work pending.
    pub fn is_pending(&self) -> bool {
        self.controls_stale || self.models.iter().any(|model| model.deferred().is_pending())
    }

    /// Drain pending phases until everything settles. Each pass runs
    /// rebuild, recalculate and revalidate as flagged on every model in
    /// document order, then refreshes the controls once. Handlers of the
    /// events raised on the way may dirty a model again, which starts
    /// another pass.
    pub fn run_pending_phases(&mut self) -> anyhow::Result<()> {
        let _span = info_span!("xforms.rrrr").entered();
        let mut passes = 0;
        while self.is_pending() {
            passes += 1;
            anyhow::ensure!(
                passes <= MAX_SETTLE_PASSES,
                XFormsError::IllegalState(format!("models still pending after {MAX_SETTLE_PASSES} settling passes"))
            );
            trace!("settling pass {passes}");
            for position in 0..self.models.len() {
                let model_id = self.models[position].id().to_owned();
                if self.models[position].deferred().rebuild {
                    self.dispatch(PendingEvent::new(XFormsEvent::Rebuild, &model_id))?;
                }
                if self.models[position].deferred().recalculate {
                    self.dispatch(PendingEvent::new(XFormsEvent::Recalculate, &model_id))?;
                }
                if self.models[position].deferred().revalidate {
                    self.dispatch(PendingEvent::new(XFormsEvent::Revalidate, &model_id))?;
                }
            }
            // Handlers of the revalidation events may have dirtied a model:
            // its earlier phases go first, on the next pass.
            let earlier_pending = self.models.iter().any(|model| {
                let deferred = model.deferred();
                deferred.rebuild || deferred.recalculate || deferred.revalidate
            });
            if !earlier_pending {
                self.refresh()?;
            }
        }
        Ok(())
    }

    /// Rebuild the control tree without dispatching anything.
    pub(crate) fn rebuild_controls(&mut self) -> anyhow::Result<()> {
        self.tree = self.build_tree()?;
        Ok(())
    }

    fn build_tree(&mut self) -> anyhow::Result<ControlTree> {
        let scope = DocumentScope::new(
            &self.models,
            &self.indexes,
            &*self.evaluator,
            self.config.ignore_dynamic_xpath_errors,
        );
        let base = scope.base_context();
        TreeBuilder::new(&scope, &mut self.switches, &self.dialogs).build(&self.controls, base)
    }

    /// Whether the control tree may differ from one built now: some
    /// model's data changed since it last refreshed, or control state
    /// changed outside the models.
    fn needs_new_tree(&self) -> bool {
        self.controls_stale
            || self.tree.is_empty()
            || self
                .models
                .iter()
                .any(|model| self.tracker.is_stale(model.id(), Phase::Refresh))
    }

    /// Refresh: rebuild the controls, bring repeat indexes within bounds
    /// and dispatch the events describing what changed. The tree is kept
    /// as is when no data changed since the last refresh.
    pub fn refresh(&mut self) -> anyhow::Result<()> {
        let _span = info_span!("xforms.refresh").entered();
        if !self.needs_new_tree() {
            debug!("refresh: no data changed since the last refresh, keeping controls");
            for model in &mut self.models {
                model.complete_refresh(&mut self.tracker);
            }
            return Ok(());
        }
        let tree = self.build_tree()?;
        adjust_indexes(&tree, &mut self.indexes);
        let previous = mem::replace(&mut self.tree, tree);
        self.controls_stale = false;
        for model in &mut self.models {
            model.complete_refresh(&mut self.tracker);
        }
        if previous.is_empty() {
            return Ok(());
        }
        for event in refresh_events(&previous, &self.tree) {
            self.dispatch(event)?;
        }
        Ok(())
    }

    /// Park repeated switch selections on their iteration nodes.
    pub(crate) fn externalize_switches(&mut self) {
        let mut store = ModelCases {
            models: &mut self.models,
        };
        self.switches.externalize(&self.tree, &mut store);
    }

    /// Restore parked switch selections under the current effective ids.
    pub(crate) fn internalize_switches(&mut self) {
        let store = ModelCases {
            models: &mut self.models,
        };
        self.switches.internalize(&self.tree, &store);
    }

    /// Effective id of a control under the current repeat indexes, `None`
    /// for unknown controls and for controls in empty repeats.
    pub(crate) fn effective_id_for(&self, static_id: &str) -> Option<String> {
        let mut iterations = Vec::new();
        let mut repeat = self.controls.info(static_id)?.parent_repeat.clone();
        while let Some(repeat_id) = repeat {
            let index = self.indexes.get(&repeat_id).unwrap_or(0);
            if index == 0 {
                return None;
            }
            iterations.push(index);
            repeat = self.controls.info(&repeat_id).and_then(|info| info.parent_repeat.clone());
        }
        iterations.reverse();
        Some(id::effective_id(static_id, &iterations))
    }

    /// Effective id of a model, instance or control.
    pub(crate) fn resolve_target(&self, static_id: &str) -> Option<String> {
        if self.model_position(static_id).is_some() {
            return Some(static_id.to_owned());
        }
        if let Some(instance) = self.models.iter().find_map(|model| model.instance_by_id(static_id)) {
            return Some(instance.effective_id().to_owned());
        }
        self.effective_id_for(static_id)
    }

    pub(crate) fn node_value(&self, node: NodeRef) -> Option<String> {
        self.models
            .get(node.instance.model as usize)
            .and_then(|model| model.instance(node.instance))
            .map(|instance| instance.value(node.node))
    }

    /// Set the value of a node, marking its model and dispatching
    /// `xxforms-value-changed` to the instance. Returns whether the value
    /// changed; an equal value is a no-op.
    pub(crate) fn set_node_value(&mut self, node: NodeRef, value: &str) -> anyhow::Result<bool> {
        let Some(model) = self.models.get_mut(node.instance.model as usize) else {
            return Ok(false);
        };
        let Some(instance) = model.instance_mut(node.instance) else {
            return Ok(false);
        };
        if !instance.set_value(node.node, value)? {
            trace!("value of node in `{}` unchanged", instance.effective_id());
            return Ok(false);
        }
        let instance_id = instance.effective_id().to_owned();
        model.mark_value_change(false);
        let model_id = model.id().to_owned();
        self.tracker.data_changed(&model_id);
        self.dispatch(PendingEvent::new(XFormsEvent::InstanceValueChanged, &instance_id))?;
        Ok(true)
    }

    /// Install a new tree for an instance, as `replace="instance"`
    /// submissions do. Every phase of the owning model becomes pending.
    pub fn replace_instance(&mut self, instance_id: &str, tree: XmlTree) -> anyhow::Result<()> {
        let position = self
            .models
            .iter()
            .position(|model| model.instance_by_id(instance_id).is_some())
            .ok_or_else(|| XFormsError::IllegalState(format!("no instance `{instance_id}`")))?;
        self.models[position].replace_instance(instance_id, tree, &mut self.tracker)?;
        info!("instance `{instance_id}` replaced");
        Ok(())
    }

    pub(crate) fn queue_load(&mut self, request: LoadRequest) {
        debug!("load `{}` queued", request.resource);
        self.loads.push(request);
    }

    /// Queued loads, in request order.
    pub fn loads(&self) -> &[LoadRequest] {
        &self.loads
    }

    /// Base context for actions run by a handler on `observer`: the
    /// binding of the observing control, or the root of the default
    /// instance.
    pub(crate) fn observer_context(&self, observer: &str) -> BindingContext {
        let scope = self.scope();
        let mut base = scope.base_context();
        if let Some(model) = self.model(observer) {
            return BindingContext::for_model(model.id(), scope.model_root(model.id()));
        }
        if let Some(control) = self.tree.find(observer)
            && let Some(node) = control.binding
        {
            base.node_set = vec![node];
            base.position = 1;
        }
        base
    }
}
