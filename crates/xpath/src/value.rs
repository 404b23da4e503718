//! XPath 1.0 values and their conversions.

use crate::view::DocumentView;
use rustc_hash::FxHashMap;
use xforms_dom::NodeRef;

/// In-scope variables by name.
pub type Variables = FxHashMap<String, Value>;

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nodes(Vec<NodeRef>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Default for Value {
    fn default() -> Self {
        Self::Nodes(Vec::new())
    }
}

impl Value {
    /// The empty node-set.
    #[inline]
    pub const fn empty() -> Self {
        Self::Nodes(Vec::new())
    }

    pub fn as_nodes(&self) -> Option<&[NodeRef]> {
        match self {
            Self::Nodes(nodes) => Some(nodes),
            Self::String(_) | Self::Number(_) | Self::Boolean(_) => None,
        }
    }

    pub fn into_nodes(self) -> Option<Vec<NodeRef>> {
        match self {
            Self::Nodes(nodes) => Some(nodes),
            Self::String(_) | Self::Number(_) | Self::Boolean(_) => None,
        }
    }

    /// `string()` conversion.
    pub fn to_string_value(&self, view: &dyn DocumentView) -> String {
        match self {
            Self::Nodes(nodes) => nodes.first().map(|node| node_string(view, *node)).unwrap_or_default(),
            Self::String(value) => value.clone(),
            Self::Number(number) => format_number(*number),
            Self::Boolean(flag) => flag.to_string(),
        }
    }

    /// `boolean()` conversion.
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Nodes(nodes) => !nodes.is_empty(),
            Self::String(value) => !value.is_empty(),
            Self::Number(number) => *number != 0.0 && !number.is_nan(),
            Self::Boolean(flag) => *flag,
        }
    }

    /// `number()` conversion.
    pub fn to_number(&self, view: &dyn DocumentView) -> f64 {
        match self {
            Self::Nodes(_) | Self::String(_) => parse_number(&self.to_string_value(view)),
            Self::Number(number) => *number,
            Self::Boolean(flag) => {
                if *flag {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// String value of a node, empty for nodes the view no longer knows.
pub fn node_string(view: &dyn DocumentView, node: NodeRef) -> String {
    view.tree(node.instance)
        .map(|tree| tree.string_value(node.node))
        .unwrap_or_default()
}

/// Parse a string the way `number()` does: optional sign, digits and an
/// optional fraction, surrounding whitespace ignored. Anything else is NaN.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let well_formed = !digits.is_empty()
        && digits != "."
        && digits.chars().all(|character| character.is_ascii_digit() || character == '.')
        && digits.chars().filter(|character| *character == '.').count() <= 1;
    if well_formed {
        trimmed.parse::<f64>().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Format a number the way `string()` does.
pub fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_owned()
    } else if number.is_infinite() {
        if number > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if number == 0.0 {
        "0".to_owned()
    } else if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{number}")
    }
}
