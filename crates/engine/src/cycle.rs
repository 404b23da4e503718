//! One client request: apply the incoming event, let the models settle,
//! refresh the controls and compute what the client must change.

use crate::document::ContainingDocument;
use core::mem;
use log::debug;
use serde::{Deserialize, Serialize};
use tracing::info_span;
use xforms_controls::{ClientUpdate, ControlsDiffer};
use xforms_model::{PendingEvent, XFormsError, XFormsEvent};

/// A navigation requested by `xforms:load`, performed by the caller after
/// the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub resource: String,
    pub target: Option<String>,
    /// `show="replace"`, as opposed to a new window.
    pub replace: bool,
}

/// An event coming from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The user changed the value of a control.
    ValueChange { control: String, value: String },
    /// The user activated a trigger.
    Activate { control: String },
    /// Any other event, dispatched as is.
    Named { event: XFormsEvent, target: String },
}

/// What a cycle produced for the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub updates: Vec<ClientUpdate>,
    pub loads: Vec<LoadRequest>,
    /// Controls whose value the client set in this cycle.
    pub value_changed: Vec<String>,
}

impl ContainingDocument {
    /// Run one request cycle for a client event.
    pub fn handle_client_event(&mut self, event: ClientEvent) -> anyhow::Result<CycleOutcome> {
        let _span = info_span!("xforms.cycle").entered();
        anyhow::ensure!(
            self.is_ready(),
            XFormsError::IllegalState("client event before initialization".to_owned())
        );
        let before = self.tree.clone();
        let indexes_before = self.indexes.clone();
        self.value_changed.clear();
        self.loads.clear();

        self.apply_client_event(event)?;
        self.run_pending_phases()?;

        let mut updates = Vec::new();
        {
            let _span = info_span!("xforms.diff").entered();
            let mut differ = ControlsDiffer::new(&mut updates, &self.value_changed);
            differ.diff_trees(Some(&before), &self.tree)?;
            differ.diff_indexes(&indexes_before, &self.indexes)?;
        }
        let mut value_changed: Vec<String> = self.value_changed.iter().cloned().collect();
        if self.config().test_mode {
            value_changed.sort_unstable();
        }
        debug!("cycle done: {} update(s), {} load(s)", updates.len(), self.loads.len());
        Ok(CycleOutcome {
            updates,
            loads: mem::take(&mut self.loads),
            value_changed,
        })
    }

    /// Updates describing the whole current tree, for a client that has
    /// nothing yet.
    pub fn full_update(&self) -> anyhow::Result<Vec<ClientUpdate>> {
        let mut updates = Vec::new();
        ControlsDiffer::new(&mut updates, &self.value_changed).diff_trees(None, &self.tree)?;
        Ok(updates)
    }

    fn apply_client_event(&mut self, event: ClientEvent) -> anyhow::Result<()> {
        match event {
            ClientEvent::ValueChange { control, value } => self.client_value_change(&control, &value),
            ClientEvent::Activate { control } => {
                self.dispatch(PendingEvent::new(XFormsEvent::DomActivate, &control))?;
                Ok(())
            }
            ClientEvent::Named { event, target } => {
                self.dispatch(PendingEvent::new(event, &target))?;
                Ok(())
            }
        }
    }

    /// Store a value typed by the user. Values for read-only, non-relevant
    /// or value-less controls are dropped.
    fn client_value_change(&mut self, control_id: &str, value: &str) -> anyhow::Result<()> {
        let Some(control) = self.tree.find(control_id) else {
            debug!("value change for unknown control `{control_id}`, ignoring");
            return Ok(());
        };
        if !control.relevant || control.readonly || !control.kind.capabilities().has_value {
            debug!("value change for `{control_id}` not accepted, ignoring");
            return Ok(());
        }
        let Some(node) = control.binding else {
            return Ok(());
        };
        self.value_changed.insert(control_id.to_owned());
        self.set_node_value(node, value)?;
        Ok(())
    }
}
