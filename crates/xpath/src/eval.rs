//! Typed evaluation helpers applying the dynamic-error leniency policy.

use crate::error::XPathError;
use crate::value::Value;
use crate::view::{DocumentView, EvalContext, XPathEvaluator};
use log::warn;
use xforms_dom::NodeRef;

/// Evaluate an expression.
///
/// When the context is lenient, dynamic errors are logged and yield the
/// empty node-set; static errors always propagate.
///
/// # Errors
/// Static errors, and dynamic errors when the context is strict.
pub fn evaluate(
    evaluator: &dyn XPathEvaluator,
    view: &dyn DocumentView,
    context: &EvalContext<'_>,
    expression: &str,
) -> Result<Value, XPathError> {
    match evaluator.evaluate(view, context, expression) {
        Err(error) if context.lenient && error.is_dynamic() => {
            warn!("ignoring {error}");
            Ok(Value::empty())
        }
        other => other,
    }
}

/// Evaluate an expression that must produce a node-set.
///
/// # Errors
/// As [`evaluate`], plus a dynamic error when the result is atomic.
pub fn evaluate_nodes(
    evaluator: &dyn XPathEvaluator,
    view: &dyn DocumentView,
    context: &EvalContext<'_>,
    expression: &str,
) -> Result<Vec<NodeRef>, XPathError> {
    match evaluate(evaluator, view, context, expression)? {
        Value::Nodes(nodes) => Ok(nodes),
        Value::String(_) | Value::Number(_) | Value::Boolean(_) => {
            let error = XPathError::dynamic(expression, "expression does not return a node-set");
            if context.lenient {
                warn!("ignoring {error}");
                Ok(Vec::new())
            } else {
                Err(error)
            }
        }
    }
}

/// # Errors
/// As [`evaluate`].
pub fn evaluate_string(
    evaluator: &dyn XPathEvaluator,
    view: &dyn DocumentView,
    context: &EvalContext<'_>,
    expression: &str,
) -> Result<String, XPathError> {
    Ok(evaluate(evaluator, view, context, expression)?.to_string_value(view))
}

/// # Errors
/// As [`evaluate`].
pub fn evaluate_boolean(
    evaluator: &dyn XPathEvaluator,
    view: &dyn DocumentView,
    context: &EvalContext<'_>,
    expression: &str,
) -> Result<bool, XPathError> {
    Ok(evaluate(evaluator, view, context, expression)?.to_boolean())
}

/// # Errors
/// As [`evaluate`].
pub fn evaluate_number(
    evaluator: &dyn XPathEvaluator,
    view: &dyn DocumentView,
    context: &EvalContext<'_>,
    expression: &str,
) -> Result<f64, XPathError> {
    Ok(evaluate(evaluator, view, context, expression)?.to_number(view))
}

/// Whether a string contains attribute value template expressions.
pub fn is_avt(template: &str) -> bool {
    template.contains('{')
}

/// Expand an attribute value template: `{expr}` parts are evaluated as
/// strings, `{{` and `}}` stand for literal braces.
///
/// # Errors
/// Evaluation errors, and a static error for an unterminated expression.
pub fn expand_avt(
    evaluator: &dyn XPathEvaluator,
    view: &dyn DocumentView,
    context: &EvalContext<'_>,
    template: &str,
) -> Result<String, XPathError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(character) = chars.next() {
        match character {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut expression = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    expression.push(inner);
                }
                if !closed {
                    return Err(XPathError::static_error(template, "unterminated attribute value template"));
                }
                out.push_str(&evaluate_string(evaluator, view, context, &expression)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
