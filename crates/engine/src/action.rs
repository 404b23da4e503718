//! Action elements as the static analysis hands them to the interpreter.

use xforms_model::{Location, XFormsEvent};
use xforms_xpath::BindingSpec;

/// Where `insert` places its copies relative to the `at` node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertPlace {
    Before,
    #[default]
    After,
}

/// `show` of a `load`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadShow {
    #[default]
    Replace,
    New,
}

/// The primitive or container action an element stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// `xforms:action`: runs its children in order.
    Block,
    SetValue {
        /// `value` expression; without it the element content is used.
        value: Option<String>,
        content: String,
    },
    Insert {
        at: Option<String>,
        position: InsertPlace,
        /// Nodes to copy; defaults to the last node of the node-set.
        origin: Option<String>,
    },
    Delete {
        at: Option<String>,
    },
    SetIndex {
        repeat: String,
        index: String,
    },
    Toggle {
        /// Case static id, possibly an attribute value template.
        case: String,
    },
    Load {
        resource: Option<String>,
        show: LoadShow,
        target: Option<String>,
    },
    Dispatch {
        name: String,
        target: String,
    },
    Rebuild {
        model: Option<String>,
    },
    Recalculate {
        model: Option<String>,
    },
    Revalidate {
        model: Option<String>,
    },
    Refresh {
        model: Option<String>,
    },
    Reset {
        model: Option<String>,
    },
    /// `xxforms:show`.
    Show {
        dialog: String,
        neighbor: Option<String>,
        constrain: bool,
    },
    /// `xxforms:hide`.
    Hide {
        dialog: String,
    },
}

/// An action element with its binding, guards and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionElement {
    pub kind: ActionKind,
    pub binding: BindingSpec,
    /// `if`: the action is skipped when false.
    pub condition: Option<String>,
    /// `while`: the action repeats while true.
    pub while_condition: Option<String>,
    /// `xxforms:iterate`: the action runs once per node.
    pub iterate: Option<String>,
    pub location: Location,
    pub children: Vec<ActionElement>,
}

impl ActionElement {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            binding: BindingSpec::default(),
            condition: None,
            while_condition: None,
            iterate: None,
            location: Location::default(),
            children: Vec::new(),
        }
    }

    pub fn block(children: Vec<Self>) -> Self {
        Self {
            children,
            ..Self::new(ActionKind::Block)
        }
    }

    pub fn set_value(reference: &str, value: &str) -> Self {
        Self::new(ActionKind::SetValue {
            value: Some(value.to_owned()),
            content: String::new(),
        })
        .bound(reference)
    }

    pub fn set_literal(reference: &str, content: &str) -> Self {
        Self::new(ActionKind::SetValue {
            value: None,
            content: content.to_owned(),
        })
        .bound(reference)
    }

    pub fn insert(nodeset: &str, at: Option<&str>, position: InsertPlace) -> Self {
        Self::new(ActionKind::Insert {
            at: at.map(str::to_owned),
            position,
            origin: None,
        })
        .bound(nodeset)
    }

    pub fn delete(nodeset: &str, at: Option<&str>) -> Self {
        Self::new(ActionKind::Delete { at: at.map(str::to_owned) }).bound(nodeset)
    }

    pub fn set_index(repeat: &str, index: &str) -> Self {
        Self::new(ActionKind::SetIndex {
            repeat: repeat.to_owned(),
            index: index.to_owned(),
        })
    }

    pub fn toggle(case: &str) -> Self {
        Self::new(ActionKind::Toggle { case: case.to_owned() })
    }

    pub fn load(resource: &str) -> Self {
        Self::new(ActionKind::Load {
            resource: Some(resource.to_owned()),
            show: LoadShow::Replace,
            target: None,
        })
    }

    pub fn dispatch(event: XFormsEvent, target: &str) -> Self {
        Self::new(ActionKind::Dispatch {
            name: event.name().to_owned(),
            target: target.to_owned(),
        })
    }

    #[must_use]
    pub fn bound(mut self, reference: &str) -> Self {
        self.binding.reference = Some(reference.to_owned());
        self
    }

    #[must_use]
    pub fn with_binding(mut self, binding: BindingSpec) -> Self {
        self.binding = binding;
        self
    }

    #[must_use]
    pub fn with_origin(mut self, expression: &str) -> Self {
        if let ActionKind::Insert { origin, .. } = &mut self.kind {
            *origin = Some(expression.to_owned());
        }
        self
    }

    #[must_use]
    pub fn when(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_owned());
        self
    }

    #[must_use]
    pub fn repeat_while(mut self, condition: &str) -> Self {
        self.while_condition = Some(condition.to_owned());
        self
    }

    #[must_use]
    pub fn iterate(mut self, expression: &str) -> Self {
        self.iterate = Some(expression.to_owned());
        self
    }

    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Qualified element name, as used in error contexts.
    pub fn name(&self) -> &'static str {
        match self.kind {
            ActionKind::Block => "xforms:action",
            ActionKind::SetValue { .. } => "xforms:setvalue",
            ActionKind::Insert { .. } => "xforms:insert",
            ActionKind::Delete { .. } => "xforms:delete",
            ActionKind::SetIndex { .. } => "xforms:setindex",
            ActionKind::Toggle { .. } => "xforms:toggle",
            ActionKind::Load { .. } => "xforms:load",
            ActionKind::Dispatch { .. } => "xforms:dispatch",
            ActionKind::Rebuild { .. } => "xforms:rebuild",
            ActionKind::Recalculate { .. } => "xforms:recalculate",
            ActionKind::Revalidate { .. } => "xforms:revalidate",
            ActionKind::Refresh { .. } => "xforms:refresh",
            ActionKind::Reset { .. } => "xforms:reset",
            ActionKind::Show { .. } => "xxforms:show",
            ActionKind::Hide { .. } => "xxforms:hide",
        }
    }
}

/// An action attached to an observer for a set of events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHandler {
    pub events: Vec<XFormsEvent>,
    /// Static id of the observing control, model or instance.
    pub observer: String,
    pub action: ActionElement,
}

impl EventHandler {
    pub fn new(event: XFormsEvent, observer: &str, action: ActionElement) -> Self {
        Self {
            events: vec![event],
            observer: observer.to_owned(),
            action,
        }
    }

    pub fn observes(&self, event: XFormsEvent) -> bool {
        self.events.contains(&event)
    }
}
