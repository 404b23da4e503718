//! Built-in evaluator for the XPath 1.0 subset used by forms: location paths
//! over the child, attribute, self, parent, ancestor, descendant and sibling
//! axes, predicates, unions, arithmetic, comparisons and the core function
//! library plus `instance()` and `index()`.

mod lexer;
mod parser;

use crate::error::XPathError;
use crate::value::{Value, Variables, format_number, node_string, parse_number};
use crate::view::{DocumentView, EvalContext, XPathEvaluator};
use core::cmp::Ordering;
use dashmap::DashMap;
use log::trace;
use parser::{Axis, BinaryOp, Expr, NodeTest, PathStart, Step, parse};
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use xforms_dom::{NodeId, NodeKind, NodeRef, XmlTree};

/// Evaluator with a cache of parsed expressions shared across evaluations.
#[derive(Default)]
pub struct SimpleEvaluator {
    parsed: DashMap<String, Arc<Expr>, FxBuildHasher>,
}

impl SimpleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct expressions parsed so far.
    pub fn cached_expressions(&self) -> usize {
        self.parsed.len()
    }

    fn compile(&self, expression: &str) -> Result<Arc<Expr>, XPathError> {
        if let Some(cached) = self.parsed.get(expression) {
            return Ok(Arc::clone(cached.value()));
        }
        let compiled = Arc::new(parse(expression)?);
        trace!("parsed `{expression}`");
        self.parsed.insert(expression.to_owned(), Arc::clone(&compiled));
        Ok(compiled)
    }
}

impl XPathEvaluator for SimpleEvaluator {
    fn evaluate(&self, view: &dyn DocumentView, context: &EvalContext<'_>, expression: &str) -> Result<Value, XPathError> {
        let compiled = self.compile(expression)?;
        let interpreter = Interpreter {
            view,
            expression,
            variables: context.variables,
            model: context.model,
        };
        let focus = Focus {
            item: context.item(),
            position: context.position,
            size: context.size(),
        };
        interpreter.eval(&compiled, &focus)
    }
}

#[derive(Debug, Clone, Copy)]
struct Focus {
    item: Option<NodeRef>,
    position: usize,
    size: usize,
}

struct Interpreter<'eval> {
    view: &'eval dyn DocumentView,
    expression: &'eval str,
    variables: &'eval Variables,
    model: Option<&'eval str>,
}

impl Interpreter<'_> {
    fn dynamic(&self, message: impl Into<String>) -> XPathError {
        XPathError::dynamic(self.expression, message)
    }

    fn eval(&self, expr: &Expr, focus: &Focus) -> Result<Value, XPathError> {
        match expr {
            Expr::Literal(text) => Ok(Value::String(text.clone())),
            Expr::Number(number) => Ok(Value::Number(*number)),
            Expr::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| self.dynamic(format!("unbound variable `${name}`"))),
            Expr::Function(name, arguments) => self.call(name, arguments, focus),
            Expr::Binary(BinaryOp::Or, left, right) => {
                Ok(Value::Boolean(self.eval(left, focus)?.to_boolean() || self.eval(right, focus)?.to_boolean()))
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                Ok(Value::Boolean(self.eval(left, focus)?.to_boolean() && self.eval(right, focus)?.to_boolean()))
            }
            Expr::Binary(operator, left, right) => {
                let left_value = self.eval(left, focus)?;
                let right_value = self.eval(right, focus)?;
                Ok(self.binary(*operator, &left_value, &right_value))
            }
            Expr::Negate(operand) => Ok(Value::Number(-self.eval(operand, focus)?.to_number(self.view))),
            Expr::Union(left, right) => {
                let mut nodes = self.nodes_of(left, focus)?;
                nodes.extend(self.nodes_of(right, focus)?);
                self.sort_document_order(&mut nodes);
                Ok(Value::Nodes(nodes))
            }
            Expr::Filter(primary, predicates) => {
                let mut nodes = self.nodes_of(primary, focus)?;
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(Value::Nodes(nodes))
            }
            Expr::Path(start, steps) => self.path(start, steps, focus).map(Value::Nodes),
        }
    }

    fn nodes_of(&self, expr: &Expr, focus: &Focus) -> Result<Vec<NodeRef>, XPathError> {
        self.eval(expr, focus)?
            .into_nodes()
            .ok_or_else(|| self.dynamic("operand is not a node-set"))
    }

    fn binary(&self, operator: BinaryOp, left: &Value, right: &Value) -> Value {
        match operator {
            BinaryOp::Add => Value::Number(left.to_number(self.view) + right.to_number(self.view)),
            BinaryOp::Sub => Value::Number(left.to_number(self.view) - right.to_number(self.view)),
            BinaryOp::Mul => Value::Number(left.to_number(self.view) * right.to_number(self.view)),
            BinaryOp::Div => Value::Number(left.to_number(self.view) / right.to_number(self.view)),
            BinaryOp::Mod => Value::Number(left.to_number(self.view) % right.to_number(self.view)),
            BinaryOp::Or | BinaryOp::And | BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq
            | BinaryOp::Gt | BinaryOp::GtEq => Value::Boolean(self.compare(operator, left, right)),
        }
    }

    /// Comparison with XPath 1.0 node-set semantics: a node-set compares
    /// true when any of its members does.
    fn compare(&self, operator: BinaryOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(left_nodes), Value::Nodes(right_nodes)) => {
                let right_strings: Vec<String> = right_nodes.iter().map(|node| node_string(self.view, *node)).collect();
                left_nodes.iter().any(|node| {
                    let left_string = Value::String(node_string(self.view, *node));
                    right_strings
                        .iter()
                        .any(|candidate| compare_atomic(operator, &left_string, &Value::String(candidate.clone())))
                })
            }
            (Value::Nodes(nodes), Value::Boolean(_)) => {
                compare_atomic(operator, &Value::Boolean(!nodes.is_empty()), right)
            }
            (Value::Boolean(_), Value::Nodes(nodes)) => {
                compare_atomic(operator, left, &Value::Boolean(!nodes.is_empty()))
            }
            (Value::Nodes(nodes), atomic) => nodes
                .iter()
                .any(|node| compare_atomic(operator, &Value::String(node_string(self.view, *node)), atomic)),
            (atomic, Value::Nodes(nodes)) => nodes
                .iter()
                .any(|node| compare_atomic(operator, atomic, &Value::String(node_string(self.view, *node)))),
            _ => compare_atomic(operator, left, right),
        }
    }

    fn path(&self, start: &PathStart, steps: &[Step], focus: &Focus) -> Result<Vec<NodeRef>, XPathError> {
        let mut current = match start {
            PathStart::Root => {
                let anchor = focus.item.or_else(|| self.view.instance_root(self.model, None));
                anchor
                    .and_then(|node| {
                        self.view
                            .tree(node.instance)
                            .map(|tree| NodeRef::new(node.instance, tree.root()))
                    })
                    .into_iter()
                    .collect()
            }
            PathStart::Context => focus.item.into_iter().collect(),
            PathStart::Filter(primary) => self.nodes_of(primary, focus)?,
        };
        for step in steps {
            let mut next = Vec::new();
            for node in current {
                next.extend(self.step(node, step)?);
            }
            self.sort_document_order(&mut next);
            current = next;
        }
        Ok(current)
    }

    fn step(&self, node: NodeRef, step: &Step) -> Result<Vec<NodeRef>, XPathError> {
        let Some(tree) = self.view.tree(node.instance) else {
            return Ok(Vec::new());
        };
        let mut selected: Vec<NodeRef> = axis_nodes(tree, node.node, step.axis)
            .into_iter()
            .filter(|candidate| matches_test(tree, *candidate, step.axis, &step.test))
            .map(|candidate| NodeRef::new(node.instance, candidate))
            .collect();
        for predicate in &step.predicates {
            selected = self.filter(selected, predicate)?;
        }
        Ok(selected)
    }

    /// Keep the nodes for which `predicate` holds; a numeric predicate
    /// selects by position.
    fn filter(&self, nodes: Vec<NodeRef>, predicate: &Expr) -> Result<Vec<NodeRef>, XPathError> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (index, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                item: Some(node),
                position: index + 1,
                size,
            };
            let keep = match self.eval(predicate, &focus)? {
                Value::Number(number) => (number - (index + 1) as f64).abs() < f64::EPSILON,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn sort_document_order(&self, nodes: &mut Vec<NodeRef>) {
        nodes.sort_by(|first, second| {
            first.instance.cmp(&second.instance).then_with(|| {
                self.view
                    .tree(first.instance)
                    .map_or(Ordering::Equal, |tree| tree.compare_order(first.node, second.node))
            })
        });
        nodes.dedup();
    }

    fn string_argument(&self, arguments: &[Expr], focus: &Focus) -> Result<String, XPathError> {
        match arguments.first() {
            Some(argument) => Ok(self.eval(argument, focus)?.to_string_value(self.view)),
            None => Ok(focus.item.map(|node| node_string(self.view, node)).unwrap_or_default()),
        }
    }

    fn number_argument(&self, arguments: &[Expr], focus: &Focus) -> Result<f64, XPathError> {
        match arguments.first() {
            Some(argument) => Ok(self.eval(argument, focus)?.to_number(self.view)),
            None => Ok(focus
                .item
                .map_or(f64::NAN, |node| parse_number(&node_string(self.view, node)))),
        }
    }

    fn check_arity(&self, name: &str, arguments: &[Expr], min: usize, max: usize) -> Result<(), XPathError> {
        if (min..=max).contains(&arguments.len()) {
            Ok(())
        } else {
            Err(XPathError::static_error(
                self.expression,
                format!("wrong number of arguments to {name}()"),
            ))
        }
    }

    fn call(&self, name: &str, arguments: &[Expr], focus: &Focus) -> Result<Value, XPathError> {
        match name {
            "instance" => {
                self.check_arity(name, arguments, 0, 1)?;
                let id = match arguments.first() {
                    Some(argument) => self.eval(argument, focus)?.to_string_value(self.view),
                    None => String::new(),
                };
                let id = (!id.is_empty()).then_some(id.as_str());
                Ok(Value::Nodes(self.view.instance_root(self.model, id).into_iter().collect()))
            }
            "index" => {
                self.check_arity(name, arguments, 1, 1)?;
                let repeat_id = self.string_argument(arguments, focus)?;
                self.view
                    .repeat_index(&repeat_id)
                    .map(|index| Value::Number(index as f64))
                    .ok_or_else(|| self.dynamic(format!("index() of unknown repeat `{repeat_id}`")))
            }
            "count" => {
                self.check_arity(name, arguments, 1, 1)?;
                let counted = arguments.first().map_or(Ok(Vec::new()), |argument| self.nodes_of(argument, focus))?;
                Ok(Value::Number(counted.len() as f64))
            }
            "sum" => {
                self.check_arity(name, arguments, 1, 1)?;
                let summed = arguments.first().map_or(Ok(Vec::new()), |argument| self.nodes_of(argument, focus))?;
                Ok(Value::Number(
                    summed
                        .iter()
                        .map(|node| parse_number(&node_string(self.view, *node)))
                        .sum(),
                ))
            }
            "last" => {
                self.check_arity(name, arguments, 0, 0)?;
                Ok(Value::Number(focus.size as f64))
            }
            "position" => {
                self.check_arity(name, arguments, 0, 0)?;
                Ok(Value::Number(focus.position as f64))
            }
            "string" => {
                self.check_arity(name, arguments, 0, 1)?;
                self.string_argument(arguments, focus).map(Value::String)
            }
            "number" => {
                self.check_arity(name, arguments, 0, 1)?;
                self.number_argument(arguments, focus).map(Value::Number)
            }
            "boolean" | "not" => {
                self.check_arity(name, arguments, 1, 1)?;
                let truth = arguments
                    .first()
                    .map_or(Ok(false), |argument| self.eval(argument, focus).map(|value| value.to_boolean()))?;
                Ok(Value::Boolean(if name == "not" { !truth } else { truth }))
            }
            "true" | "false" => {
                self.check_arity(name, arguments, 0, 0)?;
                Ok(Value::Boolean(name == "true"))
            }
            "concat" => {
                self.check_arity(name, arguments, 2, usize::MAX)?;
                let mut joined = String::new();
                for argument in arguments {
                    joined.push_str(&self.eval(argument, focus)?.to_string_value(self.view));
                }
                Ok(Value::String(joined))
            }
            "string-length" => {
                self.check_arity(name, arguments, 0, 1)?;
                Ok(Value::Number(self.string_argument(arguments, focus)?.chars().count() as f64))
            }
            "normalize-space" => {
                self.check_arity(name, arguments, 0, 1)?;
                let text = self.string_argument(arguments, focus)?;
                Ok(Value::String(text.split_whitespace().collect::<Vec<_>>().join(" ")))
            }
            "contains" | "starts-with" => {
                self.check_arity(name, arguments, 2, 2)?;
                let haystack = self.string_argument(arguments, focus)?;
                let needle = self.string_argument(&arguments[1..], focus)?;
                Ok(Value::Boolean(if name == "contains" {
                    haystack.contains(&needle)
                } else {
                    haystack.starts_with(&needle)
                }))
            }
            "floor" | "ceiling" | "round" => {
                self.check_arity(name, arguments, 1, 1)?;
                let number = self.number_argument(arguments, focus)?;
                Ok(Value::Number(match name {
                    "floor" => number.floor(),
                    "ceiling" => number.ceil(),
                    _ if number.is_finite() => (number + 0.5).floor(),
                    _ => number,
                }))
            }
            other => Err(XPathError::static_error(
                self.expression,
                format!("unknown function `{other}`"),
            )),
        }
    }
}

fn compare_atomic(operator: BinaryOp, left: &Value, right: &Value) -> bool {
    let numbers = |value: &Value| match value {
        Value::Number(number) => *number,
        Value::String(text) => parse_number(text),
        Value::Boolean(flag) => f64::from(u8::from(*flag)),
        Value::Nodes(_) => f64::NAN,
    };
    match operator {
        BinaryOp::Eq | BinaryOp::NotEq => {
            let equal = if matches!(left, Value::Boolean(_)) || matches!(right, Value::Boolean(_)) {
                left.to_boolean() == right.to_boolean()
            } else if matches!(left, Value::Number(_)) || matches!(right, Value::Number(_)) {
                (numbers(left) - numbers(right)).abs() < f64::EPSILON
            } else {
                atomic_string(left) == atomic_string(right)
            };
            equal == (operator == BinaryOp::Eq)
        }
        BinaryOp::Lt => numbers(left) < numbers(right),
        BinaryOp::LtEq => numbers(left) <= numbers(right),
        BinaryOp::Gt => numbers(left) > numbers(right),
        BinaryOp::GtEq => numbers(left) >= numbers(right),
        BinaryOp::Or | BinaryOp::And | BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            false
        }
    }
}

fn atomic_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => format_number(*number),
        Value::Boolean(flag) => flag.to_string(),
        Value::Nodes(_) => String::new(),
    }
}

fn axis_nodes(tree: &XmlTree, node: NodeId, axis: Axis) -> Vec<NodeId> {
    let not_attribute = |candidate: &NodeId| !tree.kind(*candidate).is_some_and(NodeKind::is_attribute);
    match axis {
        Axis::Child => tree.children(node),
        Axis::Attribute => tree.attributes(node),
        Axis::SelfAxis => vec![node],
        Axis::Parent => tree.parent(node).into_iter().collect(),
        Axis::Descendant => tree.descendants(node).into_iter().filter(not_attribute).collect(),
        Axis::DescendantOrSelf => {
            let mut nodes = vec![node];
            nodes.extend(tree.descendants(node).into_iter().filter(not_attribute));
            nodes
        }
        Axis::Ancestor => {
            let mut nodes = Vec::new();
            let mut cursor = tree.parent(node);
            while let Some(ancestor) = cursor {
                nodes.push(ancestor);
                cursor = tree.parent(ancestor);
            }
            nodes
        }
        Axis::FollowingSibling | Axis::PrecedingSibling => {
            if !not_attribute(&node) {
                return Vec::new();
            }
            let siblings = tree.parent(node).map(|parent| tree.children(parent)).unwrap_or_default();
            let Some(at) = siblings.iter().position(|sibling| *sibling == node) else {
                return Vec::new();
            };
            if axis == Axis::FollowingSibling {
                siblings[at + 1..].to_vec()
            } else {
                siblings[..at].iter().rev().copied().collect()
            }
        }
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn matches_test(tree: &XmlTree, node: NodeId, axis: Axis, test: &NodeTest) -> bool {
    let Some(kind) = tree.kind(node) else {
        return false;
    };
    let principal = if axis == Axis::Attribute {
        kind.is_attribute()
    } else {
        kind.is_element()
    };
    match test {
        NodeTest::Node => true,
        NodeTest::Text => kind.is_text(),
        NodeTest::Any => principal,
        NodeTest::Name(name) => {
            principal
                && kind
                    .name()
                    .is_some_and(|actual| actual == name || local_name(actual) == local_name(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xforms_dom::InstanceKey;

    struct OneInstance {
        tree: XmlTree,
    }

    const KEY: InstanceKey = InstanceKey::new(0, 0);

    impl DocumentView for OneInstance {
        fn tree(&self, instance: InstanceKey) -> Option<&XmlTree> {
            (instance == KEY).then_some(&self.tree)
        }

        fn instance_root(&self, _model: Option<&str>, id: Option<&str>) -> Option<NodeRef> {
            match id {
                None | Some("main") => self.tree.document_element().map(|node| NodeRef::new(KEY, node)),
                Some(_) => None,
            }
        }

        fn repeat_index(&self, repeat_id: &str) -> Option<usize> {
            (repeat_id == "lines").then_some(2)
        }
    }

    fn view() -> OneInstance {
        OneInstance {
            tree: XmlTree::parse(
                "<order><line qty='2' price='5'/><line qty='1' price='7'/><line qty='3' price='1'/><note>hi there</note></order>",
            )
            .unwrap(),
        }
    }

    fn run(view: &OneInstance, expression: &str) -> Result<Value, XPathError> {
        let variables = Variables::default();
        let root: Vec<NodeRef> = view.instance_root(None, None).into_iter().collect();
        let context = EvalContext::new(&root, 1, &variables);
        SimpleEvaluator::new().evaluate(view, &context, expression)
    }

    /// # Panics
    /// Panics if predicates or functions evaluate incorrectly.
    #[test]
    fn paths_predicates_and_functions() {
        let view = view();
        assert_eq!(run(&view, "count(line)").unwrap(), Value::Number(3.0));
        assert_eq!(run(&view, "sum(line/@qty)").unwrap(), Value::Number(6.0));
        assert_eq!(run(&view, "string(line[2]/@price)").unwrap(), Value::String("7".into()));
        assert_eq!(run(&view, "count(line[@qty > 1])").unwrap(), Value::Number(2.0));
        assert_eq!(run(&view, "count(//line)").unwrap(), Value::Number(3.0));
        assert_eq!(run(&view, "normalize-space(note)").unwrap(), Value::String("hi there".into()));
        assert_eq!(run(&view, "string(line[last()]/@qty)").unwrap(), Value::String("3".into()));
        assert_eq!(run(&view, "count(instance('main')/line)").unwrap(), Value::Number(3.0));
        assert_eq!(run(&view, "index('lines') * 10").unwrap(), Value::Number(20.0));
    }

    /// # Panics
    /// Panics if positions on a reverse axis do not count back from the context node.
    #[test]
    fn reverse_axis_positions_count_backwards() {
        let view = view();
        assert_eq!(run(&view, "count(note/preceding-sibling::line)").unwrap(), Value::Number(3.0));
        assert_eq!(
            run(&view, "string(note/preceding-sibling::line[1]/@qty)").unwrap(),
            Value::String("3".into())
        );
        assert_eq!(
            run(&view, "string(note/preceding-sibling::line[last()]/@qty)").unwrap(),
            Value::String("2".into())
        );
    }

    /// # Panics
    /// Panics if node-set comparison is not existential.
    #[test]
    fn node_set_comparison_is_existential() {
        let view = view();
        assert_eq!(run(&view, "line/@qty = 3").unwrap(), Value::Boolean(true));
        assert_eq!(run(&view, "line/@qty = 4").unwrap(), Value::Boolean(false));
        assert_eq!(run(&view, "line/@qty != 2").unwrap(), Value::Boolean(true));
        assert_eq!(run(&view, "missing = ''").unwrap(), Value::Boolean(false));
    }

    /// # Panics
    /// Panics if missing repeats are not reported as dynamic errors.
    #[test]
    fn unknown_repeat_is_dynamic_error() {
        let view = view();
        assert!(run(&view, "index('nope')").unwrap_err().is_dynamic());
        assert!(!run(&view, "line[").unwrap_err().is_dynamic());
    }

    /// # Panics
    /// Panics if parsed expressions are not reused.
    #[test]
    fn parsed_expressions_are_cached() {
        let view = view();
        let evaluator = SimpleEvaluator::new();
        let variables = Variables::default();
        let root: Vec<NodeRef> = view.instance_root(None, None).into_iter().collect();
        let context = EvalContext::new(&root, 1, &variables);
        for _ in 0..3 {
            evaluator.evaluate(&view, &context, "count(line)").unwrap();
        }
        assert_eq!(evaluator.cached_expressions(), 1);
    }
}
