use core::fmt;
use thiserror::Error;
use xforms_dom::DomError;
use xforms_xpath::XPathError;

/// Where a construct was declared in its source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub system_id: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(system_id: &str, line: u32, column: u32) -> Self {
        Self {
            system_id: system_id.to_owned(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}:{}", self.system_id, self.line, self.column)
    }
}

/// Root causes raised by models and, through the engine, by actions.
#[derive(Debug, Error)]
pub enum XFormsError {
    /// Malformed or unusable markup found while running.
    #[error("{message} at {location}")]
    Validation { location: Location, message: String },

    /// A schema or instance document could not be loaded.
    #[error("cannot load `{uri}`: {message}")]
    Link { uri: String, message: String },

    /// A bind expression failed while computing model item properties.
    #[error("error computing bind `{bind}`: {message}")]
    Compute { bind: String, message: String },

    /// A non-ignorable XPath error.
    #[error("XPath error at {location}")]
    XPath {
        location: Location,
        #[source]
        source: XPathError,
    },

    /// Model item properties read before the model was first rebuilt.
    #[error("model item properties of model `{model}` read before its first rebuild")]
    MipsNotReady { model: String },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error(transparent)]
    Dom(#[from] DomError),
}

impl XFormsError {
    pub fn validation(location: &Location, message: impl Into<String>) -> Self {
        Self::Validation {
            location: location.clone(),
            message: message.into(),
        }
    }

    pub fn xpath(location: &Location, source: XPathError) -> Self {
        Self::XPath {
            location: location.clone(),
            source,
        }
    }

    pub fn link(uri: &str, message: impl Into<String>) -> Self {
        Self::Link {
            uri: uri.to_owned(),
            message: message.into(),
        }
    }

    pub const fn is_link(&self) -> bool {
        matches!(self, Self::Link { .. })
    }

    pub const fn is_compute(&self) -> bool {
        matches!(self, Self::Compute { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if locations do not render as `system:line:column`.
    #[test]
    fn location_renders_compactly() {
        let location = Location::new("form.xhtml", 12, 7);
        assert_eq!(location.to_string(), "form.xhtml:12:7");
        let error = XFormsError::validation(&location, "missing `case` attribute");
        assert_eq!(error.to_string(), "missing `case` attribute at form.xhtml:12:7");
    }
}
