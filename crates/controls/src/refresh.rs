//! Notification events raised by a refresh for controls whose state moved.

use crate::control::{Control, ControlTree};
use crate::descriptor::ControlKind;
use rustc_hash::FxHashMap;
use xforms_model::{PendingEvent, XFormsEvent};

/// Compare the controls present in both snapshots and produce their
/// notification events, in document order of `after`.
pub fn refresh_events(before: &ControlTree, after: &ControlTree) -> Vec<PendingEvent> {
    let previous: FxHashMap<&str, &Control> = before
        .flatten()
        .into_iter()
        .map(|control| (control.effective_id.as_str(), control))
        .collect();

    let mut events = Vec::new();
    for control in after.flatten() {
        if control.kind == ControlKind::RepeatIteration || !control.kind.is_single_node() {
            continue;
        }
        let Some(old) = previous.get(control.effective_id.as_str()) else {
            continue;
        };
        events.extend(control_events(old, control));
    }
    events
}

fn control_events(old: &Control, new: &Control) -> Vec<PendingEvent> {
    let target = new.effective_id.as_str();
    let mut events = Vec::new();
    if new.kind.capabilities().has_value && new.relevant && old.value != new.value {
        events.push(PendingEvent::new(XFormsEvent::ValueChanged, target));
    }
    let toggles = [
        (old.valid, new.valid, XFormsEvent::Valid, XFormsEvent::Invalid),
        (old.relevant, new.relevant, XFormsEvent::Enabled, XFormsEvent::Disabled),
        (old.readonly, new.readonly, XFormsEvent::Readonly, XFormsEvent::Readwrite),
        (old.required, new.required, XFormsEvent::Required, XFormsEvent::Optional),
    ];
    for (was, is, on, off) in toggles {
        if was != is {
            events.push(PendingEvent::new(if is { on } else { off }, target));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if refresh notifications are missing or out of order.
    #[test]
    fn changed_properties_raise_events_in_order() {
        let mut name = Control::new(ControlKind::Input, "name", "name");
        name.value = Some("Ada".to_owned());
        let before = ControlTree::new(vec![name.clone(), Control::new(ControlKind::Output, "total", "total")]);

        name.value = Some("Grace".to_owned());
        name.valid = false;
        name.required = true;
        let mut total = Control::new(ControlKind::Output, "total", "total");
        total.relevant = false;
        let after = ControlTree::new(vec![name, total, Control::new(ControlKind::Input, "new", "new")]);

        let events: Vec<(XFormsEvent, String)> = refresh_events(&before, &after)
            .into_iter()
            .map(|event| (event.event, event.target))
            .collect();
        assert_eq!(
            events,
            vec![
                (XFormsEvent::ValueChanged, "name".to_owned()),
                (XFormsEvent::Invalid, "name".to_owned()),
                (XFormsEvent::Required, "name".to_owned()),
                (XFormsEvent::Disabled, "total".to_owned()),
            ]
        );
    }
}
