//! A model: its instances, binds and variables, and the deferred
//! rebuild / recalculate / revalidate phases that keep their computed state
//! up to date.

use crate::bind::Bind;
use crate::deferred::DeferredActionContext;
use crate::dependencies::{DependencyTracker, Phase};
use crate::error::{Location, XFormsError};
use crate::event::{PendingEvent, XFormsEvent};
use crate::schema::{ResourceResolver, SchemaValidator};
use crate::types::DataType;
use crate::variable::VariableDescriptor;
use core::slice;
use core::time::Duration;
use log::{debug, trace};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use xforms_dom::{
    CacheKey, CachePolicy, Instance, InstanceCache, InstanceKey, MipView, NodeRef, ValidationMode, XmlTree,
};
use xforms_xpath::{DocumentView, EvalContext, Value, Variables, XPathError, XPathEvaluator, evaluate};

/// Declaration of an instance inside a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceDescriptor {
    pub id: String,
    /// Inline XML content.
    pub inline: Option<String>,
    /// External source.
    pub src: Option<String>,
    /// `xxforms:cache`: share the loaded tree between documents.
    pub cache: bool,
    pub ttl: Option<Duration>,
    pub validation: ValidationMode,
    pub readonly: bool,
    pub location: Location,
}

impl InstanceDescriptor {
    pub fn inline(id: &str, xml: &str) -> Self {
        Self {
            id: id.to_owned(),
            inline: Some(xml.to_owned()),
            ..Self::default()
        }
    }

    pub fn external(id: &str, src: &str) -> Self {
        Self {
            id: id.to_owned(),
            src: Some(src.to_owned()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn shared(mut self, ttl: Option<Duration>) -> Self {
        self.cache = true;
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }
}

/// Static description of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: String,
    pub instances: Vec<InstanceDescriptor>,
    pub binds: Vec<Bind>,
    pub variables: Vec<VariableDescriptor>,
    /// Space-separated schema URIs.
    pub schema: Option<String>,
    pub location: Location,
}

impl ModelDescriptor {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn instance(mut self, instance: InstanceDescriptor) -> Self {
        self.instances.push(instance);
        self
    }

    #[must_use]
    pub fn bind(mut self, bind: Bind) -> Self {
        self.binds.push(bind);
        self
    }

    #[must_use]
    pub fn variable(mut self, variable: VariableDescriptor) -> Self {
        self.variables.push(variable);
        self
    }

    #[must_use]
    pub fn schema(mut self, uris: &str) -> Self {
        self.schema = Some(uris.to_owned());
        self
    }
}

/// What phases need to evaluate expressions.
#[derive(Clone, Copy)]
pub struct Evaluation<'env> {
    pub evaluator: &'env dyn XPathEvaluator,
    /// Whether dynamic XPath errors are ignorable.
    pub lenient: bool,
    /// Current repeat indexes, for `index()`.
    pub repeat_indexes: &'env FxHashMap<String, usize>,
}

/// Where shared external instances come from.
#[derive(Clone, Copy)]
pub struct Loading<'env> {
    pub resolver: &'env dyn ResourceResolver,
    pub cache: &'env InstanceCache,
    /// TTL for shared instances that do not declare one.
    pub default_ttl: Option<Duration>,
}

/// Read-only view of one model's instances for XPath evaluation.
pub struct ModelView<'view> {
    model: &'view Model,
    repeat_indexes: &'view FxHashMap<String, usize>,
}

impl DocumentView for ModelView<'_> {
    fn tree(&self, instance: InstanceKey) -> Option<&XmlTree> {
        self.model.instance(instance).map(Instance::tree)
    }

    fn instance_root(&self, _model: Option<&str>, id: Option<&str>) -> Option<NodeRef> {
        match id {
            Some(id) => self.model.instance_by_id(id),
            None => self.model.default_instance(),
        }
        .and_then(Instance::document_element)
    }

    fn repeat_index(&self, repeat_id: &str) -> Option<usize> {
        self.repeat_indexes.get(repeat_id).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindPass {
    Defaults,
    Calculate,
    Computed,
    Validation,
}

/// A model of a containing document.
pub struct Model {
    descriptor: Arc<ModelDescriptor>,
    position: u32,
    instances: Vec<Instance>,
    deferred: DeferredActionContext,
    variables: Vec<(String, Value)>,
    schema: Option<Arc<dyn SchemaValidator>>,
    bind_validation: bool,
    rebuilt: bool,
    reset_state: Vec<Arc<XmlTree>>,
}

impl Model {
    /// A model at `position` in document order, not yet constructed.
    pub fn new(descriptor: Arc<ModelDescriptor>, position: u32) -> Self {
        Self {
            descriptor,
            position,
            instances: Vec::new(),
            deferred: DeferredActionContext::default(),
            variables: Vec::new(),
            schema: None,
            bind_validation: true,
            rebuilt: false,
            reset_state: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_bind_validation(mut self, enabled: bool) -> Self {
        self.bind_validation = enabled;
        self
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub const fn position(&self) -> u32 {
        self.position
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance(&self, key: InstanceKey) -> Option<&Instance> {
        if key.model != self.position {
            return None;
        }
        self.instances.get(key.slot as usize)
    }

    pub fn instance_mut(&mut self, key: InstanceKey) -> Option<&mut Instance> {
        if key.model != self.position {
            return None;
        }
        self.instances.get_mut(key.slot as usize)
    }

    pub fn instance_by_id(&self, id: &str) -> Option<&Instance> {
        self.instances.iter().find(|instance| instance.static_id() == id)
    }

    /// The first instance.
    pub fn default_instance(&self) -> Option<&Instance> {
        self.instances.first()
    }

    pub const fn deferred(&self) -> &DeferredActionContext {
        &self.deferred
    }

    pub fn mark_structural_change(&mut self) {
        self.deferred.mark_structural_change();
    }

    pub fn mark_value_change(&mut self, is_calculate: bool) {
        self.deferred.mark_value_change(is_calculate);
    }

    /// Set every pending flag.
    pub fn mark_all(&mut self) {
        self.deferred.set_all();
    }

    /// Set the flag of a single phase, as the explicit phase actions do.
    pub fn request_phase(&mut self, phase: Phase) {
        match phase {
            Phase::Rebuild => self.deferred.rebuild = true,
            Phase::Recalculate => self.deferred.recalculate = true,
            Phase::Revalidate => self.deferred.revalidate = true,
            Phase::Refresh => self.deferred.refresh = true,
        }
    }

    /// Evaluated top-level variables, in declaration order.
    pub fn variables(&self) -> &[(String, Value)] {
        &self.variables
    }

    pub const fn is_rebuilt(&self) -> bool {
        self.rebuilt
    }

    pub fn view<'view>(&'view self, repeat_indexes: &'view FxHashMap<String, usize>) -> ModelView<'view> {
        ModelView {
            model: self,
            repeat_indexes,
        }
    }

    /// Effective model item properties of a node.
    ///
    /// # Errors
    /// [`XFormsError::MipsNotReady`] before the first rebuild.
    pub fn mip_view(&self, node: NodeRef) -> Result<MipView, XFormsError> {
        if !self.rebuilt {
            return Err(XFormsError::MipsNotReady {
                model: self.id().to_owned(),
            });
        }
        self.instance(node.instance)
            .map(|instance| instance.mip_view(node.node))
            .ok_or_else(|| XFormsError::IllegalState(format!("node does not belong to model `{}`", self.id())))
    }

    /// Handle `xforms-model-construct`: load schemas, build the instances and
    /// run rebuild, recalculate with initial values, and revalidate.
    ///
    /// # Errors
    /// Link errors for schemas and external instances, which the caller turns
    /// into `xforms-link-exception`, and any phase failure.
    pub fn construct(
        &mut self,
        evaluation: Evaluation<'_>,
        loading: Loading<'_>,
        tracker: &mut DependencyTracker,
    ) -> Result<Vec<PendingEvent>, XFormsError> {
        debug!("model `{}`: construct", self.id());
        if let Some(uris) = &self.descriptor.schema
            && self.schema.is_none()
        {
            let schema = loading
                .resolver
                .schema(uris)
                .map_err(|error| XFormsError::link(uris, format!("{error:#}")))?;
            self.schema = Some(schema);
        }

        let descriptor = Arc::clone(&self.descriptor);
        let mut instances = Vec::with_capacity(descriptor.instances.len());
        for (slot, declared) in descriptor.instances.iter().enumerate() {
            let key = InstanceKey::new(self.position, slot as u32);
            instances.push(build_instance(key, &descriptor.id, declared, loading)?);
        }
        self.instances = instances;
        for instance in &self.instances {
            tracker.data_changed(instance.model_id());
        }

        self.deferred.set_all();
        self.do_rebuild(evaluation, tracker)?;
        self.do_recalculate(evaluation, tracker, true)?;
        self.do_revalidate(evaluation, tracker)
    }

    /// Rebuild: re-evaluate variables and check the bind tree against the
    /// current instances. A no-op unless `rebuild` is pending.
    ///
    /// # Errors
    /// XPath errors in variables and binds naming unknown types.
    pub fn do_rebuild(&mut self, evaluation: Evaluation<'_>, tracker: &mut DependencyTracker) -> Result<bool, XFormsError> {
        let performed = self.deferred.rebuild;
        if performed {
            trace!("model `{}`: rebuild", self.id());
            self.evaluate_variables(evaluation)?;
            if !self.instances.is_empty() && !self.descriptor.binds.is_empty() {
                check_bind_types(&self.descriptor.binds)?;
            }
            for instance in &mut self.instances {
                let tree = instance.shared_tree();
                instance.mips_mut().prune(&tree);
            }
            self.rebuilt = true;
            self.deferred.rebuild = false;
        }
        tracker.phase_completed(self.id(), Phase::Rebuild, performed);
        Ok(performed)
    }

    /// Recalculate: apply `calculate` binds, then the computed properties.
    /// With `apply_initial_values`, `xxforms:default` values are written
    /// first.
    ///
    /// # Errors
    /// [`XFormsError::Compute`] when a bind expression fails.
    pub fn do_recalculate(
        &mut self,
        evaluation: Evaluation<'_>,
        tracker: &mut DependencyTracker,
        apply_initial_values: bool,
    ) -> Result<bool, XFormsError> {
        let performed = self.deferred.recalculate;
        if performed {
            trace!("model `{}`: recalculate (initial values: {apply_initial_values})", self.id());
            if !self.descriptor.binds.is_empty() || !self.descriptor.variables.is_empty() {
                self.evaluate_variables(evaluation)?;
            }
            if !self.instances.is_empty() {
                for instance in &mut self.instances {
                    instance.mips_mut().clear_computed();
                }
                let descriptor = Arc::clone(&self.descriptor);
                let roots = self.bind_roots();
                if apply_initial_values {
                    self.run_binds(evaluation, tracker, &descriptor.binds, &roots, BindPass::Defaults)?;
                }
                self.run_binds(evaluation, tracker, &descriptor.binds, &roots, BindPass::Calculate)?;
                let roots = self.bind_roots();
                self.run_binds(evaluation, tracker, &descriptor.binds, &roots, BindPass::Computed)?;
            }
            self.deferred.recalculate = false;
        }
        tracker.phase_completed(self.id(), Phase::Recalculate, performed);
        Ok(performed)
    }

    /// Revalidate: schema validation per instance, then `constraint` and
    /// `type` binds. Produces one pass/fail event per instance.
    ///
    /// # Errors
    /// [`XFormsError::Compute`] when a bind expression fails, and a
    /// validation error for unknown types.
    pub fn do_revalidate(
        &mut self,
        evaluation: Evaluation<'_>,
        tracker: &mut DependencyTracker,
    ) -> Result<Vec<PendingEvent>, XFormsError> {
        let performed = self.deferred.revalidate;
        let mut events = Vec::new();
        if performed {
            trace!("model `{}`: revalidate", self.id());
            if self.bind_validation || self.schema.is_some() {
                for instance in &mut self.instances {
                    instance.mips_mut().clear_validation();
                    instance.mips_mut().clear_schema_validation();
                }
                if let Some(schema) = &self.schema {
                    for instance in &mut self.instances {
                        if instance.validation() == ValidationMode::Skip {
                            continue;
                        }
                        for node in schema.validate(instance) {
                            instance.mips_mut().entry(node).schema_valid = false;
                        }
                    }
                }
                if self.bind_validation {
                    let descriptor = Arc::clone(&self.descriptor);
                    let roots = self.bind_roots();
                    self.run_binds(evaluation, tracker, &descriptor.binds, &roots, BindPass::Validation)?;
                }
                for instance in &self.instances {
                    let event = if instance.mips().has_invalid(instance.tree()) {
                        XFormsEvent::InstanceInvalid
                    } else {
                        XFormsEvent::InstanceValid
                    };
                    events.push(PendingEvent::new(event, instance.effective_id()));
                }
            }
            self.deferred.revalidate = false;
        }
        tracker.phase_completed(self.id(), Phase::Revalidate, performed);
        Ok(events)
    }

    /// Record that the document refreshed its controls for this model.
    pub fn complete_refresh(&mut self, tracker: &mut DependencyTracker) -> bool {
        let performed = self.deferred.refresh;
        self.deferred.refresh = false;
        tracker.phase_completed(self.id(), Phase::Refresh, performed);
        performed
    }

    /// Remember the current trees as the state `xforms-reset` returns to.
    pub fn capture_reset_state(&mut self) {
        self.reset_state = self.instances.iter().map(Instance::shared_tree).collect();
    }

    /// Restore the trees captured by [`Self::capture_reset_state`] and set
    /// every pending flag. Returns whether anything was restored.
    pub fn restore_reset_state(&mut self, tracker: &mut DependencyTracker) -> bool {
        if self.reset_state.len() != self.instances.len() {
            return false;
        }
        for (instance, tree) in self.instances.iter_mut().zip(&self.reset_state) {
            instance.restore_tree(Arc::clone(tree));
        }
        tracker.data_changed(&self.descriptor.id);
        self.deferred.set_all();
        true
    }

    /// Install a new tree for an instance, as a submission with
    /// `replace="instance"` does, and set every pending flag.
    ///
    /// # Errors
    /// [`XFormsError::IllegalState`] for an unknown instance.
    pub fn replace_instance(
        &mut self,
        instance_id: &str,
        tree: XmlTree,
        tracker: &mut DependencyTracker,
    ) -> Result<InstanceKey, XFormsError> {
        let model_id = self.descriptor.id.clone();
        let instance = self
            .instances
            .iter_mut()
            .find(|instance| instance.static_id() == instance_id)
            .ok_or_else(|| XFormsError::IllegalState(format!("no instance `{instance_id}` in model `{model_id}`")))?;
        instance.replace_tree(Arc::new(tree));
        let key = instance.key();
        tracker.data_changed(&model_id);
        self.deferred.set_all();
        Ok(key)
    }

    /// Node-set of the bind with id `bind_id`, evaluated through its
    /// ancestors from the default instance. `None` if no such bind exists.
    ///
    /// # Errors
    /// XPath errors in any bind of the chain.
    pub fn bind_nodeset(&self, evaluation: Evaluation<'_>, bind_id: &str) -> Result<Option<Vec<NodeRef>>, XFormsError> {
        let mut path = Vec::new();
        if !self.descriptor.binds.iter().any(|bind| bind.find_path(bind_id, &mut path)) {
            return Ok(None);
        }
        let mut nodes = self.bind_roots();
        for bind in path {
            nodes = self.select(evaluation, bind, &nodes)?;
        }
        Ok(Some(nodes))
    }

    fn bind_roots(&self) -> Vec<NodeRef> {
        self.default_instance()
            .and_then(Instance::document_element)
            .into_iter()
            .collect()
    }

    fn variable_map(&self) -> Variables {
        self.variables.iter().cloned().collect()
    }

    fn evaluate_variables(&mut self, evaluation: Evaluation<'_>) -> Result<(), XFormsError> {
        let descriptor = Arc::clone(&self.descriptor);
        let roots = self.bind_roots();
        let mut values: Vec<(String, Value)> = Vec::with_capacity(descriptor.variables.len());
        for variable in &descriptor.variables {
            let value = match &variable.select {
                None => Value::String(variable.text.clone()),
                Some(_) if roots.is_empty() => Value::empty(),
                Some(select) => {
                    let in_scope: Variables = values.iter().cloned().collect();
                    let view = self.view(evaluation.repeat_indexes);
                    let context = EvalContext::new(&roots, 1, &in_scope)
                        .with_model(Some(&descriptor.id))
                        .with_lenient(evaluation.lenient);
                    evaluate(evaluation.evaluator, &view, &context, select)
                        .map_err(|error| XFormsError::xpath(&variable.location, error))?
                }
            };
            trace!("model `{}`: ${} evaluated", descriptor.id, variable.name);
            values.push((variable.name.clone(), value));
        }
        self.variables = values;
        Ok(())
    }

    fn evaluate_at(
        &self,
        evaluation: Evaluation<'_>,
        nodes: &[NodeRef],
        expression: &str,
    ) -> Result<Value, XPathError> {
        let variables = self.variable_map();
        let view = self.view(evaluation.repeat_indexes);
        let context = EvalContext::new(nodes, 1, &variables)
            .with_model(Some(&self.descriptor.id))
            .with_lenient(evaluation.lenient);
        evaluate(evaluation.evaluator, &view, &context, expression)
    }

    /// Nodes selected by `bind` for each of `contexts`, concatenated.
    fn select(&self, evaluation: Evaluation<'_>, bind: &Bind, contexts: &[NodeRef]) -> Result<Vec<NodeRef>, XFormsError> {
        let mut selected = Vec::new();
        for context in contexts {
            let value = self
                .evaluate_at(evaluation, slice::from_ref(context), &bind.nodeset)
                .map_err(|error| XFormsError::xpath(&bind.location, error))?;
            match value {
                Value::Nodes(nodes) => selected.extend(nodes),
                Value::String(_) | Value::Number(_) | Value::Boolean(_) => {
                    return Err(XFormsError::validation(
                        &bind.location,
                        format!("bind `{}` does not select nodes", bind.label()),
                    ));
                }
            }
        }
        Ok(selected)
    }

    fn run_binds(
        &mut self,
        evaluation: Evaluation<'_>,
        tracker: &mut DependencyTracker,
        binds: &[Bind],
        contexts: &[NodeRef],
        pass: BindPass,
    ) -> Result<(), XFormsError> {
        for bind in binds {
            let nodes = self.select(evaluation, bind, contexts)?;
            for node in &nodes {
                self.apply_bind(evaluation, tracker, bind, *node, pass)?;
            }
            if !bind.children.is_empty() {
                self.run_binds(evaluation, tracker, &bind.children, &nodes, pass)?;
            }
        }
        Ok(())
    }

    fn compute(&self, evaluation: Evaluation<'_>, bind: &Bind, node: NodeRef, expression: &str) -> Result<Value, XFormsError> {
        self.evaluate_at(evaluation, &[node], expression)
            .map_err(|error| XFormsError::Compute {
                bind: bind.label().to_owned(),
                message: error.to_string(),
            })
    }

    fn compute_boolean(
        &self,
        evaluation: Evaluation<'_>,
        bind: &Bind,
        node: NodeRef,
        expression: Option<&str>,
    ) -> Result<Option<bool>, XFormsError> {
        expression
            .map(|expression| self.compute(evaluation, bind, node, expression).map(|value| value.to_boolean()))
            .transpose()
    }

    fn compute_string(
        &self,
        evaluation: Evaluation<'_>,
        bind: &Bind,
        node: NodeRef,
        expression: Option<&str>,
    ) -> Result<Option<String>, XFormsError> {
        let view = self.view(evaluation.repeat_indexes);
        expression
            .map(|expression| {
                self.compute(evaluation, bind, node, expression)
                    .map(|value| value.to_string_value(&view))
            })
            .transpose()
    }

    fn write_value(
        &mut self,
        tracker: &mut DependencyTracker,
        bind: &Bind,
        node: NodeRef,
        value: &str,
    ) -> Result<(), XFormsError> {
        let model_id = self.descriptor.id.clone();
        let Some(instance) = self.instance_mut(node.instance) else {
            return Ok(());
        };
        if instance.set_value(node.node, value)? {
            trace!("bind `{}` set a value", bind.label());
            tracker.data_changed(&model_id);
            self.deferred.mark_value_change(true);
        }
        Ok(())
    }

    fn apply_bind(
        &mut self,
        evaluation: Evaluation<'_>,
        tracker: &mut DependencyTracker,
        bind: &Bind,
        node: NodeRef,
        pass: BindPass,
    ) -> Result<(), XFormsError> {
        match pass {
            BindPass::Defaults => {
                if let Some(value) = self.compute_string(evaluation, bind, node, bind.default_value.as_deref())? {
                    self.write_value(tracker, bind, node, &value)?;
                }
            }
            BindPass::Calculate => {
                if let Some(value) = self.compute_string(evaluation, bind, node, bind.calculate.as_deref())? {
                    self.write_value(tracker, bind, node, &value)?;
                }
            }
            BindPass::Computed => {
                let relevant = self.compute_boolean(evaluation, bind, node, bind.relevant.as_deref())?;
                let readonly = self.compute_boolean(evaluation, bind, node, bind.readonly.as_deref())?;
                let required = self.compute_boolean(evaluation, bind, node, bind.required.as_deref())?;
                let mut custom = Vec::with_capacity(bind.custom.len());
                for (name, expression) in &bind.custom {
                    if let Some(value) = self.compute_string(evaluation, bind, node, Some(expression))? {
                        custom.push((name.clone(), value));
                    }
                }
                let Some(instance) = self.instance_mut(node.instance) else {
                    return Ok(());
                };
                let mips = instance.mips_mut().entry(node.node);
                if let Some(relevant) = relevant {
                    mips.relevant = relevant;
                }
                if let Some(readonly) = readonly {
                    mips.readonly = readonly;
                } else if bind.calculate.is_some() {
                    mips.readonly = true;
                }
                if let Some(required) = required {
                    mips.required = required;
                }
                if let Some(type_name) = &bind.type_name {
                    mips.type_name = Some(type_name.clone());
                }
                mips.custom.extend(custom);
            }
            BindPass::Validation => {
                let constraint = self.compute_boolean(evaluation, bind, node, bind.constraint.as_deref())?;
                let Some(instance) = self.instance(node.instance) else {
                    return Ok(());
                };
                let value = instance.value(node.node);
                let required = instance.mips().get(node.node).is_some_and(|mips| mips.required);
                let type_valid = match &bind.type_name {
                    Some(type_name) => {
                        let data_type = DataType::from_qname(type_name).ok_or_else(|| {
                            XFormsError::validation(&bind.location, format!("invalid type `{type_name}`"))
                        })?;
                        Some(data_type.accepts(&value, required))
                    }
                    None => None,
                };
                let missing = required && value.trim().is_empty();
                let Some(instance) = self.instance_mut(node.instance) else {
                    return Ok(());
                };
                let mips = instance.mips_mut().entry(node.node);
                if let Some(constraint) = constraint {
                    mips.constraint = mips.constraint && constraint;
                }
                if missing {
                    mips.constraint = false;
                }
                if let Some(type_valid) = type_valid {
                    mips.type_valid = mips.type_valid && type_valid;
                }
            }
        }
        Ok(())
    }
}

fn check_bind_types(binds: &[Bind]) -> Result<(), XFormsError> {
    for bind in binds {
        if let Some(type_name) = &bind.type_name
            && DataType::from_qname(type_name).is_none()
        {
            return Err(XFormsError::validation(&bind.location, format!("invalid type `{type_name}`")));
        }
        check_bind_types(&bind.children)?;
    }
    Ok(())
}

fn fetch_tree(resolver: &dyn ResourceResolver, uri: &str) -> Result<XmlTree, XFormsError> {
    let result = resolver
        .fetch(uri)
        .map_err(|error| XFormsError::link(uri, format!("{error:#}")))?;
    result.into_tree().map_err(|error| XFormsError::link(uri, error.to_string()))
}

fn build_instance(
    key: InstanceKey,
    model_id: &str,
    declared: &InstanceDescriptor,
    loading: Loading<'_>,
) -> Result<Instance, XFormsError> {
    let (tree, source) = match (&declared.inline, &declared.src) {
        (_, Some(src)) if declared.cache => {
            let ttl = declared.ttl.or(loading.default_ttl);
            let tree = loading
                .cache
                .get_or_load(&CacheKey::new(&declared.id, src), ttl, || fetch_tree(loading.resolver, src))?;
            (tree, Some(src))
        }
        (_, Some(src)) => (Arc::new(fetch_tree(loading.resolver, src)?), Some(src)),
        (Some(xml), None) => {
            let tree = XmlTree::parse(xml).map_err(|error| {
                XFormsError::validation(&declared.location, format!("instance `{}`: {error}", declared.id))
            })?;
            (Arc::new(tree), None)
        }
        (None, None) => {
            return Err(XFormsError::validation(
                &declared.location,
                format!("instance `{}` has neither content nor `src`", declared.id),
            ));
        }
    };
    let mut instance = Instance::new(key, &declared.id, model_id, tree)
        .with_cache(CachePolicy {
            shared: declared.cache,
            ttl: declared.ttl,
        })
        .with_validation(declared.validation)
        .with_readonly(declared.readonly);
    if let Some(src) = source {
        instance = instance.with_source(src);
    }
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xforms_xpath::SimpleEvaluator;

    fn order_model() -> Model {
        let descriptor = ModelDescriptor::new("order")
            .instance(InstanceDescriptor::inline(
                "main",
                "<order><line><qty>2</qty><price>5</price><total/></line><line><qty>1</qty><price>7</price><total/></line><grand/></order>",
            ))
            .bind(
                Bind::new("line")
                    .child(Bind::new("total").calculate("../qty * ../price"))
                    .child(Bind::new("qty").with_type("xs:integer").constraint(". > 0")),
            )
            .bind(Bind::new("grand").calculate("sum(../line/total)"));
        Model::new(Arc::new(descriptor), 0)
    }

    fn construct(model: &mut Model, evaluator: &SimpleEvaluator, tracker: &mut DependencyTracker) -> Vec<PendingEvent> {
        let indexes = FxHashMap::default();
        let cache = InstanceCache::default();
        let evaluation = Evaluation {
            evaluator,
            lenient: false,
            repeat_indexes: &indexes,
        };
        let loading = Loading {
            resolver: &crate::schema::NoResources,
            cache: &cache,
            default_ttl: None,
        };
        model.construct(evaluation, loading, tracker).unwrap()
    }

    /// # Panics
    /// Panics if calculate binds do not run in document order.
    #[test]
    fn construct_runs_calculations() {
        let mut model = order_model();
        let evaluator = SimpleEvaluator::new();
        let mut tracker = DependencyTracker::new();
        let events = construct(&mut model, &evaluator, &mut tracker);
        let instance = model.default_instance().unwrap();
        let tree = instance.tree();
        let root = tree.document_element().unwrap();
        let grand = tree.element_children(root)[2];
        assert_eq!(tree.string_value(grand), "17");
        assert_eq!(events, vec![PendingEvent::new(XFormsEvent::InstanceValid, "main")]);
        assert_eq!(
            tracker.performed("order"),
            vec![Phase::Rebuild, Phase::Recalculate, Phase::Revalidate]
        );
    }

    /// # Panics
    /// Panics if reading properties before the first rebuild succeeds.
    #[test]
    fn mips_unavailable_before_rebuild() {
        let model = order_model();
        let node = NodeRef::new(InstanceKey::new(0, 0), XmlTree::new().root());
        assert!(matches!(model.mip_view(node), Err(XFormsError::MipsNotReady { .. })));
    }

    /// # Panics
    /// Panics if phases run without their flag.
    #[test]
    fn phases_are_noops_when_clean() {
        let mut model = order_model();
        let evaluator = SimpleEvaluator::new();
        let mut tracker = DependencyTracker::new();
        construct(&mut model, &evaluator, &mut tracker);
        tracker.clear_history();
        let indexes = FxHashMap::default();
        let evaluation = Evaluation {
            evaluator: &evaluator,
            lenient: false,
            repeat_indexes: &indexes,
        };
        assert!(!model.do_rebuild(evaluation, &mut tracker).unwrap());
        assert!(!model.do_recalculate(evaluation, &mut tracker, false).unwrap());
        assert!(model.do_revalidate(evaluation, &mut tracker).unwrap().is_empty());
        assert!(tracker.performed("order").is_empty());
        assert_eq!(tracker.history().len(), 3);
    }
}
