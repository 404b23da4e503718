use core::fmt;
use thiserror::Error;

/// Whether an error was detected before or during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XPathErrorKind {
    /// Syntax errors and unknown functions.
    Static,
    /// Failures that depend on the data, such as a missing repeat or an
    /// operand of the wrong type.
    Dynamic,
}

impl fmt::Display for XPathErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => formatter.write_str("static"),
            Self::Dynamic => formatter.write_str("dynamic"),
        }
    }
}

/// Error raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} XPath error in `{expression}`: {message}")]
pub struct XPathError {
    pub kind: XPathErrorKind,
    pub expression: String,
    pub message: String,
}

impl XPathError {
    pub fn static_error(expression: &str, message: impl Into<String>) -> Self {
        Self {
            kind: XPathErrorKind::Static,
            expression: expression.to_owned(),
            message: message.into(),
        }
    }

    pub fn dynamic(expression: &str, message: impl Into<String>) -> Self {
        Self {
            kind: XPathErrorKind::Dynamic,
            expression: expression.to_owned(),
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.kind == XPathErrorKind::Dynamic
    }
}
