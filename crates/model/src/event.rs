//! The closed set of events the engine dispatches and handles.

/// An event kind. [`XFormsEvent::name`] is the name used in markup and on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XFormsEvent {
    ModelConstruct,
    ModelConstructDone,
    Ready,
    Rebuild,
    Recalculate,
    Revalidate,
    Refresh,
    Reset,
    ComputeException,
    LinkException,
    ValueChanged,
    InstanceValueChanged,
    Valid,
    Invalid,
    InstanceValid,
    InstanceInvalid,
    Enabled,
    Disabled,
    Readonly,
    Readwrite,
    Required,
    Optional,
    ScrollFirst,
    ScrollLast,
    Select,
    Deselect,
    Insert,
    Delete,
    DomActivate,
    DialogOpen,
    DialogClose,
}

const NAMES: &[(XFormsEvent, &str)] = &[
    (XFormsEvent::ModelConstruct, "xforms-model-construct"),
    (XFormsEvent::ModelConstructDone, "xforms-model-construct-done"),
    (XFormsEvent::Ready, "xforms-ready"),
    (XFormsEvent::Rebuild, "xforms-rebuild"),
    (XFormsEvent::Recalculate, "xforms-recalculate"),
    (XFormsEvent::Revalidate, "xforms-revalidate"),
    (XFormsEvent::Refresh, "xforms-refresh"),
    (XFormsEvent::Reset, "xforms-reset"),
    (XFormsEvent::ComputeException, "xforms-compute-exception"),
    (XFormsEvent::LinkException, "xforms-link-exception"),
    (XFormsEvent::ValueChanged, "xforms-value-changed"),
    (XFormsEvent::InstanceValueChanged, "xxforms-value-changed"),
    (XFormsEvent::Valid, "xforms-valid"),
    (XFormsEvent::Invalid, "xforms-invalid"),
    (XFormsEvent::InstanceValid, "xxforms-valid"),
    (XFormsEvent::InstanceInvalid, "xxforms-invalid"),
    (XFormsEvent::Enabled, "xforms-enabled"),
    (XFormsEvent::Disabled, "xforms-disabled"),
    (XFormsEvent::Readonly, "xforms-readonly"),
    (XFormsEvent::Readwrite, "xforms-readwrite"),
    (XFormsEvent::Required, "xforms-required"),
    (XFormsEvent::Optional, "xforms-optional"),
    (XFormsEvent::ScrollFirst, "xforms-scroll-first"),
    (XFormsEvent::ScrollLast, "xforms-scroll-last"),
    (XFormsEvent::Select, "xforms-select"),
    (XFormsEvent::Deselect, "xforms-deselect"),
    (XFormsEvent::Insert, "xforms-insert"),
    (XFormsEvent::Delete, "xforms-delete"),
    (XFormsEvent::DomActivate, "DOMActivate"),
    (XFormsEvent::DialogOpen, "xxforms-dialog-open"),
    (XFormsEvent::DialogClose, "xxforms-dialog-close"),
];

impl XFormsEvent {
    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(event, _)| *event == self)
            .map_or("", |(_, name)| name)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(_, candidate)| *candidate == name)
            .map(|(event, _)| *event)
    }

    /// Exceptions that end the cycle when nobody handles them.
    pub const fn is_fatal_when_unhandled(self) -> bool {
        matches!(self, Self::ComputeException | Self::LinkException)
    }
}

/// An event produced by a model phase, to be dispatched by the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub event: XFormsEvent,
    /// Effective id of the target.
    pub target: String,
    /// Context information, such as an error message.
    pub detail: Option<String>,
}

impl PendingEvent {
    pub fn new(event: XFormsEvent, target: &str) -> Self {
        Self {
            event,
            target: target.to_owned(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if a name does not map back to its event.
    #[test]
    fn names_round_trip() {
        for (event, name) in NAMES {
            assert_eq!(event.name(), *name);
            assert_eq!(XFormsEvent::from_name(name), Some(*event));
        }
        assert_eq!(XFormsEvent::from_name("xforms-nonsense"), None);
    }
}
