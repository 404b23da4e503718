use log::trace;

/// Pending update phases of one model.
///
/// Notifications only ever set flags; each flag is cleared by the phase that
/// performs the corresponding work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools, reason = "One flag per deferred phase")]
pub struct DeferredActionContext {
    pub rebuild: bool,
    pub recalculate: bool,
    pub revalidate: bool,
    pub refresh: bool,
}

impl DeferredActionContext {
    /// Nodes were inserted, deleted or replaced.
    pub fn mark_structural_change(&mut self) {
        trace!("structural change: all phases pending");
        self.rebuild = true;
        self.recalculate = true;
        self.revalidate = true;
        self.refresh = true;
    }

    /// A node value changed. Changes made by `calculate` binds while
    /// recalculating do not request another recalculation.
    pub fn mark_value_change(&mut self, is_calculate: bool) {
        trace!("value change (calculate: {is_calculate})");
        if !is_calculate {
            self.recalculate = true;
        }
        self.revalidate = true;
        self.refresh = true;
    }

    /// Set every flag, as on construction and reset.
    pub fn set_all(&mut self) {
        self.mark_structural_change();
    }

    pub const fn is_pending(&self) -> bool {
        self.rebuild || self.recalculate || self.revalidate || self.refresh
    }
}
