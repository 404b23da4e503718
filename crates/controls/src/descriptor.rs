//! Static, page-independent description of the controls of a form.

use rustc_hash::FxHashMap;
use xforms_model::Location;
use xforms_xpath::BindingSpec;

/// The closed set of control kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Input,
    Secret,
    Textarea,
    Output,
    Select,
    Select1,
    Range,
    Upload,
    Trigger,
    Submit,
    Group,
    Switch,
    Case,
    Repeat,
    /// Produced for each item of a repeat's node-set; never declared.
    RepeatIteration,
    Dialog,
}

/// What the engine may do with a control of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools, reason = "Independent capability flags")]
pub struct Capabilities {
    /// Holds a value taken from its bound node.
    pub has_value: bool,
    pub has_children: bool,
    pub is_repeat: bool,
    pub is_switch: bool,
    /// Differences are reported outside the regular control updates.
    pub out_of_band: bool,
}

impl ControlKind {
    pub const fn capabilities(self) -> Capabilities {
        let (has_value, has_children) = match self {
            Self::Input
            | Self::Secret
            | Self::Textarea
            | Self::Output
            | Self::Select
            | Self::Select1
            | Self::Range
            | Self::Upload => (true, false),
            Self::Trigger | Self::Submit => (false, false),
            Self::Group | Self::Switch | Self::Case | Self::Repeat | Self::RepeatIteration | Self::Dialog => {
                (false, true)
            }
        };
        Capabilities {
            has_value,
            has_children,
            is_repeat: matches!(self, Self::Repeat),
            is_switch: matches!(self, Self::Switch),
            out_of_band: matches!(self, Self::Dialog),
        }
    }

    /// Whether the control reports its own model item properties to the
    /// client.
    pub const fn is_single_node(self) -> bool {
        !matches!(self, Self::Repeat | Self::Case | Self::Dialog)
    }

    /// Whether its value is sent to the client. Uploads never are.
    pub const fn sends_value(self) -> bool {
        self.capabilities().has_value && !matches!(self, Self::Upload)
    }

    pub fn element_name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Secret => "secret",
            Self::Textarea => "textarea",
            Self::Output => "output",
            Self::Select => "select",
            Self::Select1 => "select1",
            Self::Range => "range",
            Self::Upload => "upload",
            Self::Trigger => "trigger",
            Self::Submit => "submit",
            Self::Group => "group",
            Self::Switch => "switch",
            Self::Case => "case",
            Self::Repeat => "repeat",
            Self::RepeatIteration => "repeat-iteration",
            Self::Dialog => "dialog",
        }
    }
}

/// Where a label, help, hint or alert takes its text from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    Literal(String),
    /// Expression evaluated in the control's binding context.
    Expression(String),
}

/// The label, help, hint and alert of a control.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlTexts {
    pub label: Option<TextSource>,
    pub help: Option<TextSource>,
    pub hint: Option<TextSource>,
    pub alert: Option<TextSource>,
}

/// Read-only descriptor of one control element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDescriptor {
    pub static_id: String,
    /// Id qualified by the enclosing components; unique in the document.
    pub prefixed_id: String,
    pub kind: ControlKind,
    pub binding: BindingSpec,
    /// `value` of an output.
    pub value: Option<String>,
    pub texts: ControlTexts,
    pub appearance: Option<String>,
    /// `startindex` of a repeat.
    pub start_index: usize,
    /// `selected` of a case.
    pub selected: bool,
    pub location: Location,
    pub children: Vec<ControlDescriptor>,
}

impl ControlDescriptor {
    pub fn new(kind: ControlKind, static_id: &str) -> Self {
        Self {
            static_id: static_id.to_owned(),
            prefixed_id: static_id.to_owned(),
            kind,
            binding: BindingSpec {
                element_id: Some(static_id.to_owned()),
                ..BindingSpec::default()
            },
            value: None,
            texts: ControlTexts::default(),
            appearance: None,
            start_index: 1,
            selected: false,
            location: Location::default(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn bound(mut self, reference: &str) -> Self {
        self.binding.reference = Some(reference.to_owned());
        self
    }

    #[must_use]
    pub fn with_binding(mut self, binding: BindingSpec) -> Self {
        let element_id = self.binding.element_id.take();
        self.binding = binding;
        self.binding.element_id = self.binding.element_id.take().or(element_id);
        self
    }

    #[must_use]
    pub fn with_value(mut self, expression: &str) -> Self {
        self.value = Some(expression.to_owned());
        self
    }

    #[must_use]
    pub fn label(mut self, text: TextSource) -> Self {
        self.texts.label = Some(text);
        self
    }

    #[must_use]
    pub fn help(mut self, text: TextSource) -> Self {
        self.texts.help = Some(text);
        self
    }

    #[must_use]
    pub fn hint(mut self, text: TextSource) -> Self {
        self.texts.hint = Some(text);
        self
    }

    #[must_use]
    pub fn alert(mut self, text: TextSource) -> Self {
        self.texts.alert = Some(text);
        self
    }

    #[must_use]
    pub fn appearance(mut self, appearance: &str) -> Self {
        self.appearance = Some(appearance.to_owned());
        self
    }

    #[must_use]
    pub fn start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    #[must_use]
    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    #[must_use]
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.prefixed_id = format!("{prefix}${}", self.static_id);
        self
    }

    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Whether this group only structures the form and is never reported.
    pub fn is_internal_group(&self) -> bool {
        self.kind == ControlKind::Group && self.appearance.as_deref() == Some("xxforms:internal")
    }
}

/// Per-control facts derived from the descriptor tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticInfo {
    pub kind: ControlKind,
    /// Closest enclosing repeat.
    pub parent_repeat: Option<String>,
    /// Enclosing switch of a case.
    pub switch: Option<String>,
    pub start_index: usize,
}

/// Immutable analysis of a form's controls, keyed by static id.
#[derive(Debug, Clone, Default)]
pub struct StaticState {
    roots: Vec<ControlDescriptor>,
    info: FxHashMap<String, StaticInfo>,
    /// Repeats in document order.
    repeats: Vec<String>,
}

impl StaticState {
    pub fn new(roots: Vec<ControlDescriptor>) -> Self {
        let mut state = Self {
            roots: Vec::new(),
            info: FxHashMap::default(),
            repeats: Vec::new(),
        };
        for root in &roots {
            state.analyze(root, None, None);
        }
        state.roots = roots;
        state
    }

    fn analyze(&mut self, descriptor: &ControlDescriptor, parent_repeat: Option<&str>, parent_switch: Option<&str>) {
        let enclosing_switch = if descriptor.kind == ControlKind::Case {
            parent_switch.map(str::to_owned)
        } else {
            None
        };
        self.info.insert(
            descriptor.static_id.clone(),
            StaticInfo {
                kind: descriptor.kind,
                parent_repeat: parent_repeat.map(str::to_owned),
                switch: enclosing_switch,
                start_index: descriptor.start_index,
            },
        );
        let is_repeat = descriptor.kind == ControlKind::Repeat;
        if is_repeat {
            self.repeats.push(descriptor.static_id.clone());
        }
        let repeat = if is_repeat { Some(descriptor.static_id.as_str()) } else { parent_repeat };
        let switch = (descriptor.kind == ControlKind::Switch).then_some(descriptor.static_id.as_str());
        for child in &descriptor.children {
            self.analyze(child, repeat, switch);
        }
    }

    pub fn roots(&self) -> &[ControlDescriptor] {
        &self.roots
    }

    pub fn info(&self, static_id: &str) -> Option<&StaticInfo> {
        self.info.get(static_id)
    }

    pub fn kind(&self, static_id: &str) -> Option<ControlKind> {
        self.info.get(static_id).map(|info| info.kind)
    }

    /// Repeat static ids in document order.
    pub fn repeat_ids(&self) -> &[String] {
        &self.repeats
    }

    pub fn start_index(&self, repeat_id: &str) -> usize {
        self.info.get(repeat_id).map_or(1, |info| info.start_index)
    }

    /// Repeats nested at any depth inside `repeat_id`, in document order.
    pub fn nested_repeat_ids(&self, repeat_id: &str) -> Vec<&str> {
        self.repeats
            .iter()
            .filter(|candidate| self.is_nested_in(candidate, repeat_id))
            .map(String::as_str)
            .collect()
    }

    fn is_nested_in(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = self.info.get(candidate).and_then(|info| info.parent_repeat.as_deref());
        while let Some(repeat) = current {
            if repeat == ancestor {
                return true;
            }
            current = self.info.get(repeat).and_then(|info| info.parent_repeat.as_deref());
        }
        false
    }

    /// Static id of the switch containing a case.
    pub fn switch_of_case(&self, case_id: &str) -> Option<&str> {
        self.info.get(case_id).and_then(|info| info.switch.as_deref())
    }

    pub fn descriptor(&self, static_id: &str) -> Option<&ControlDescriptor> {
        fn find<'desc>(descriptors: &'desc [ControlDescriptor], static_id: &str) -> Option<&'desc ControlDescriptor> {
            descriptors.iter().find_map(|descriptor| {
                if descriptor.static_id == static_id {
                    Some(descriptor)
                } else {
                    find(&descriptor.children, static_id)
                }
            })
        }
        find(&self.roots, static_id)
    }
}
