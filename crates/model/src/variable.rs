use crate::error::Location;

/// An `xxforms:variable` declared at the top level of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableDescriptor {
    pub name: String,
    /// Expression computing the value; without it the value is `text`.
    pub select: Option<String>,
    pub text: String,
    pub location: Location,
}

impl VariableDescriptor {
    pub fn select(name: &str, expression: &str) -> Self {
        Self {
            name: name.to_owned(),
            select: Some(expression.to_owned()),
            ..Self::default()
        }
    }

    pub fn text(name: &str, text: &str) -> Self {
        Self {
            name: name.to_owned(),
            text: text.to_owned(),
            ..Self::default()
        }
    }
}
